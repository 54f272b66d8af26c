//! The boundary to processes hosting external tools.
//!
//! Launching and supervising tool servers is owned by whoever implements [ToolHost]; the chat
//! core only needs to list the tools and forward calls to them.

use async_trait::async_trait;
use serde_json::Value;

use crate::api_client::model::FunctionDeclaration;

/// A tool exposed by an external tool host, declared to the provider as a callable function.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTool {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema of the tool's input object.
    pub input_schema: Value,
}

impl ExternalTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }

    pub fn to_function_declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters_json_schema: Some(self.input_schema.clone()),
        }
    }
}

#[async_trait]
pub trait ToolHost: std::fmt::Debug + Send + Sync {
    /// The tools currently offered by this host.
    fn tools(&self) -> Vec<ExternalTool>;

    /// Invokes a tool. Failures are reported back to the model, never retried.
    async fn call_tool(&self, name: &str, args: Value) -> eyre::Result<Value>;
}

/// Host used when no tool servers are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToolHost;

#[async_trait]
impl ToolHost for NoToolHost {
    fn tools(&self) -> Vec<ExternalTool> {
        Vec::new()
    }

    async fn call_tool(&self, name: &str, _args: Value) -> eyre::Result<Value> {
        eyre::bail!("no tool named {name} is available")
    }
}
