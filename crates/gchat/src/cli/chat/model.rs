use serde::Serialize;

/// Bumped whenever an entry of [MODEL_CAPABILITIES] changes.
pub const CATALOG_VERSION: u32 = 3;

/// A tool offered directly by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinTool {
    CodeExecution,
    GoogleSearch,
}

/// What a model allows to be attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapability {
    pub model_id: &'static str,
    pub supports_code_execution: bool,
    pub supports_search: bool,
    pub supports_multiple_builtin_tools: bool,
    /// Tried in order when only one built-in tool may be attached.
    pub default_tools: &'static [BuiltinTool],
}

impl ModelCapability {
    pub fn supports(&self, tool: BuiltinTool) -> bool {
        match tool {
            BuiltinTool::CodeExecution => self.supports_code_execution,
            BuiltinTool::GoogleSearch => self.supports_search,
        }
    }

    /// Every built-in tool the model supports, code execution first.
    pub fn builtin_tools(&self) -> Vec<BuiltinTool> {
        [BuiltinTool::CodeExecution, BuiltinTool::GoogleSearch]
            .into_iter()
            .filter(|tool| self.supports(*tool))
            .collect()
    }
}

pub const MODEL_CAPABILITIES: [ModelCapability; 6] = [
    ModelCapability {
        model_id: "gemini-2.5-pro",
        supports_code_execution: true,
        supports_search: true,
        supports_multiple_builtin_tools: true,
        default_tools: &[],
    },
    ModelCapability {
        model_id: "gemini-2.5-flash",
        supports_code_execution: true,
        supports_search: true,
        supports_multiple_builtin_tools: true,
        default_tools: &[],
    },
    ModelCapability {
        model_id: "gemini-2.5-flash-lite",
        supports_code_execution: true,
        supports_search: true,
        supports_multiple_builtin_tools: false,
        default_tools: &[BuiltinTool::CodeExecution],
    },
    ModelCapability {
        model_id: "gemini-2.0-flash",
        supports_code_execution: true,
        supports_search: true,
        supports_multiple_builtin_tools: false,
        default_tools: &[BuiltinTool::GoogleSearch],
    },
    ModelCapability {
        model_id: "gemini-2.0-flash-lite",
        supports_code_execution: false,
        supports_search: false,
        supports_multiple_builtin_tools: false,
        default_tools: &[],
    },
    ModelCapability {
        model_id: "gemini-1.5-pro",
        supports_code_execution: true,
        supports_search: true,
        supports_multiple_builtin_tools: false,
        default_tools: &[BuiltinTool::CodeExecution],
    },
];

/// Looks up a model by id. Returns `None` for models missing from the catalog.
pub fn capability(model_id: &str) -> Option<&'static ModelCapability> {
    MODEL_CAPABILITIES.iter().find(|model| model.model_id == model_id)
}
