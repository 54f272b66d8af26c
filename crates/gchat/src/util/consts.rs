pub const CHAT_BINARY_NAME: &str = "gchat";

/// Model used when neither `--model` nor `chat.defaultModel` is set.
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash";

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub mod env_var {
    /// Sets the current log level
    pub const GCHAT_LOG_LEVEL: &str = "GCHAT_LOG_LEVEL";

    /// API key for the Gemini API
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

    /// Fallback API key, used when [`GEMINI_API_KEY`] is unset
    pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
}
