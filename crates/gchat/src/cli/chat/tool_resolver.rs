//! Decides which tool declarations may be attached to a request for a given model.
//!
//! Some models reject a request that combines two built-in tools, so the rules live in one
//! place driven by the capability table in [crate::cli::chat::model] rather than at each call
//! site.

use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::api_client::model::Tool;
use crate::cli::chat::model::{
    BuiltinTool,
    capability,
};
use crate::cli::chat::tool_host::ExternalTool;

/// Which category of tools the user wants attached to requests.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ToolCategoryPreference {
    /// Tools from the external tool host only. Needs an embedder-supplied host
    External,
    /// The provider's own tools, combined when the model allows it
    #[default]
    Builtin,
    /// Only the provider's code execution tool
    CodeExecutionOnly,
    /// Only the provider's search tool
    SearchOnly,
}

/// One tool or tool group submitted with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolDeclaration {
    /// All external tools, declared together as functions.
    External(Vec<ExternalTool>),
    /// Built-in tools bundled into one declaration.
    Builtin(Vec<BuiltinTool>),
}

impl ToolDeclaration {
    /// Converts the declaration into request `tools` entries, one entry per built-in tool.
    pub fn to_api_tools(&self) -> Vec<Tool> {
        match self {
            ToolDeclaration::External(tools) if tools.is_empty() => Vec::new(),
            ToolDeclaration::External(tools) => vec![Tool::functions(
                tools.iter().map(ExternalTool::to_function_declaration).collect(),
            )],
            ToolDeclaration::Builtin(tools) => tools
                .iter()
                .map(|tool| match tool {
                    BuiltinTool::CodeExecution => Tool::code_execution(),
                    BuiltinTool::GoogleSearch => Tool::google_search(),
                })
                .collect(),
        }
    }

    /// Tool names, for display.
    pub fn names(&self) -> Vec<String> {
        match self {
            ToolDeclaration::External(tools) => tools.iter().map(|tool| tool.name.clone()).collect(),
            ToolDeclaration::Builtin(tools) => tools.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Resolves the tool declarations to submit with a request.
///
/// Never fails: unknown models and unsupported preferences degrade to fewer tools.
pub fn resolve_tools(
    model_id: &str,
    external_tools: &[ExternalTool],
    preference: ToolCategoryPreference,
) -> Vec<ToolDeclaration> {
    let external = || {
        if external_tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclaration::External(external_tools.to_vec())]
        }
    };

    let Some(model) = capability(model_id) else {
        debug!(model_id, "model missing from the capability table, using external tools only");
        return external();
    };

    let single = |tool: BuiltinTool| match model.supports(tool) {
        true => vec![ToolDeclaration::Builtin(vec![tool])],
        false => Vec::new(),
    };

    let declarations = match preference {
        ToolCategoryPreference::External => external(),
        ToolCategoryPreference::CodeExecutionOnly => single(BuiltinTool::CodeExecution),
        ToolCategoryPreference::SearchOnly => single(BuiltinTool::GoogleSearch),
        ToolCategoryPreference::Builtin => {
            let supported = model.builtin_tools();
            if supported.is_empty() {
                Vec::new()
            } else if model.supports_multiple_builtin_tools {
                vec![ToolDeclaration::Builtin(supported)]
            } else {
                let tool = model
                    .default_tools
                    .iter()
                    .copied()
                    .find(|tool| model.supports(*tool))
                    .unwrap_or(supported[0]);
                vec![ToolDeclaration::Builtin(vec![tool])]
            }
        },
    };

    debug!(model_id, %preference, ?declarations, "resolved tools");
    declarations
}

/// Flattens declarations into the request's `tools` array.
pub fn to_api_tools(declarations: &[ToolDeclaration]) -> Vec<Tool> {
    declarations.iter().flat_map(ToolDeclaration::to_api_tools).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cli::chat::model::MODEL_CAPABILITIES;

    const ALL_PREFERENCES: [ToolCategoryPreference; 4] = [
        ToolCategoryPreference::External,
        ToolCategoryPreference::Builtin,
        ToolCategoryPreference::CodeExecutionOnly,
        ToolCategoryPreference::SearchOnly,
    ];

    fn weather_tool() -> ExternalTool {
        ExternalTool::new("get_weather", "Weather lookup", json!({"type": "object"}))
    }

    fn builtin_count(declarations: &[ToolDeclaration]) -> usize {
        declarations
            .iter()
            .filter(|declaration| matches!(declaration, ToolDeclaration::Builtin(_)))
            .count()
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let tools = [weather_tool()];
        for model in MODEL_CAPABILITIES.iter().map(|m| m.model_id).chain(["not-a-real-model"]) {
            for preference in ALL_PREFERENCES {
                assert_eq!(
                    resolve_tools(model, &tools, preference),
                    resolve_tools(model, &tools, preference)
                );
            }
        }
    }

    #[test]
    fn test_single_builtin_tool_models() {
        for model in MODEL_CAPABILITIES.iter().filter(|m| !m.supports_multiple_builtin_tools) {
            for preference in ALL_PREFERENCES {
                let declarations = resolve_tools(model.model_id, &[], preference);
                assert!(declarations.len() <= 1, "{}: {declarations:?}", model.model_id);
                let tools: usize = declarations
                    .iter()
                    .map(|declaration| match declaration {
                        ToolDeclaration::Builtin(tools) => tools.len(),
                        ToolDeclaration::External(_) => 0,
                    })
                    .sum();
                assert!(tools <= 1, "{}: {declarations:?}", model.model_id);
            }
        }
    }

    #[test]
    fn test_builtin_uses_default_tool() {
        assert_eq!(
            resolve_tools("gemini-2.5-flash-lite", &[], ToolCategoryPreference::Builtin),
            vec![ToolDeclaration::Builtin(vec![BuiltinTool::CodeExecution])]
        );
        assert_eq!(
            resolve_tools("gemini-2.0-flash", &[], ToolCategoryPreference::Builtin),
            vec![ToolDeclaration::Builtin(vec![BuiltinTool::GoogleSearch])]
        );
    }

    #[test]
    fn test_builtin_bundles_when_allowed() {
        let declarations = resolve_tools("gemini-2.5-pro", &[weather_tool()], ToolCategoryPreference::Builtin);
        assert_eq!(declarations, vec![ToolDeclaration::Builtin(vec![
            BuiltinTool::CodeExecution,
            BuiltinTool::GoogleSearch
        ])]);
        assert_eq!(to_api_tools(&declarations), vec![Tool::code_execution(), Tool::google_search()]);
    }

    #[test]
    fn test_model_without_builtin_tools() {
        for preference in [
            ToolCategoryPreference::Builtin,
            ToolCategoryPreference::CodeExecutionOnly,
            ToolCategoryPreference::SearchOnly,
        ] {
            assert!(resolve_tools("gemini-2.0-flash-lite", &[weather_tool()], preference).is_empty());
        }
    }

    #[test]
    fn test_external_never_attaches_builtin_tools() {
        for model in &MODEL_CAPABILITIES {
            let declarations = resolve_tools(model.model_id, &[weather_tool()], ToolCategoryPreference::External);
            assert_eq!(builtin_count(&declarations), 0);
            assert_eq!(declarations, vec![ToolDeclaration::External(vec![weather_tool()])]);
            assert!(resolve_tools(model.model_id, &[], ToolCategoryPreference::External).is_empty());
        }
    }

    #[test]
    fn test_unknown_model_degrades_to_external() {
        let tools = [weather_tool()];
        for preference in ALL_PREFERENCES {
            assert_eq!(
                resolve_tools("not-a-real-model", &tools, preference),
                resolve_tools("not-a-real-model", &tools, ToolCategoryPreference::External)
            );
        }
    }

    #[test]
    fn test_external_api_tools() {
        let declarations = resolve_tools("gemini-2.5-flash", &[weather_tool()], ToolCategoryPreference::External);
        let tools = to_api_tools(&declarations);
        assert_eq!(tools.len(), 1);
        let functions = tools[0].function_declarations.as_ref().unwrap();
        assert_eq!(functions[0].name, "get_weather");
        assert_eq!(declarations[0].names(), vec!["get_weather".to_owned()]);
    }

    #[test]
    fn test_preference_names() {
        assert_eq!(ToolCategoryPreference::CodeExecutionOnly.to_string(), "code-execution-only");
        assert_eq!(
            "search-only".parse::<ToolCategoryPreference>().unwrap(),
            ToolCategoryPreference::SearchOnly
        );
        assert_eq!(
            serde_json::from_value::<ToolCategoryPreference>(json!("external")).unwrap(),
            ToolCategoryPreference::External
        );
    }
}
