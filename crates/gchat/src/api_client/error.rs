use thiserror::Error;

use crate::util::env_var::{
    GEMINI_API_KEY,
    GOOGLE_API_KEY,
};

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("no API key found, set {GEMINI_API_KEY} or {GOOGLE_API_KEY}")]
    MissingApiKey,

    /// The provider rejected the request or failed mid-stream.
    #[error("{message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// A chunk could not be decoded as a response.
    #[error("malformed response chunk: {source}")]
    MalformedChunk {
        #[source]
        source: serde_json::Error,
        data: String,
    },

    #[error("failed to call tool {name}: {message}")]
    ToolHost { name: String, message: String },
}

impl ApiClientError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiClientError::Api { status_code, .. } => Some(*status_code),
            ApiClientError::Request(err) => err.status().map(|status| status.as_u16()),
            ApiClientError::MissingApiKey | ApiClientError::MalformedChunk { .. } | ApiClientError::ToolHost { .. } => {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    fn all_errors() -> Vec<ApiClientError> {
        vec![
            ApiClientError::MissingApiKey,
            ApiClientError::Api {
                status_code: 429,
                message: "Resource has been exhausted".to_owned(),
            },
            ApiClientError::MalformedChunk {
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
                data: "{".to_owned(),
            },
            ApiClientError::ToolHost {
                name: "lookup".to_owned(),
                message: "server exited".to_owned(),
            },
        ]
    }

    #[test]
    fn test_errors() {
        for error in all_errors() {
            let _ = error.source();
            println!("{error} {error:?}");
        }
    }

    #[test]
    fn test_status_code() {
        let errors = all_errors();
        assert_eq!(errors[0].status_code(), None);
        assert_eq!(errors[1].status_code(), Some(429));
        assert_eq!(errors[1].to_string(), "Resource has been exhausted (status: 429)");
        assert!(errors[2].source().is_some());
    }
}
