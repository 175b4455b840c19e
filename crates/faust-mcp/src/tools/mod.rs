//! Faust tool definitions
//!
//! Every tool has the same shape: a name, a schema for its input, and one
//! async `call` that always answers with exactly one content item. The
//! registry holds the fixed set exposed over MCP.

mod compile;
mod context;
mod error;
mod info;
mod spectrogram;
mod svg;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::protocol::{InputSchema, Tool, ToolResult};

pub use compile::CompileTool;
pub use context::ToolContext;
pub use error::ToolError;
pub use info::InfoTool;
pub use spectrogram::SpectrogramTool;
pub use svg::SvgTool;

/// Uniform contract for the tools exposed over MCP
#[async_trait]
pub trait McpTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Name, description and input schema
    fn describe(&self) -> Tool;

    /// Run the tool. Failures come back as an error result, never a panic.
    async fn call(&self, arguments: Value) -> ToolResult;
}

/// Create a tool definition with the given name, description, and schema properties
fn tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let props = properties.as_object().cloned().unwrap_or_default();
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: InputSchema {
            schema_type: "object".to_string(),
            properties: props,
            required: required.into_iter().map(|s| s.to_string()).collect(),
        },
    }
}

/// Deserialize tool arguments; a missing payload counts as `{}`
fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => json!({}),
        Value::Object(map) => Value::Object(map),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "expected an object, got {}",
                other
            )))
        }
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Collapse a pipeline outcome into the single item a tool returns
fn respond(tool: &str, outcome: Result<ToolResult, ToolError>) -> ToolResult {
    match outcome {
        Ok(result) => result,
        Err(e) => {
            warn!("{}: {}", tool, e);
            ToolResult::error(format!("Error: {}", e))
        }
    }
}

/// The fixed set of tools served by this process
pub struct ToolRegistry {
    tools: Vec<Box<dyn McpTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// All Faust tools sharing one context
    pub fn with_defaults(ctx: Arc<ToolContext>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(InfoTool::version(ctx.clone())));
        registry.register(Box::new(CompileTool::new(ctx.clone())));
        registry.register(Box::new(SvgTool::new(ctx.clone())));
        registry.register(Box::new(InfoTool::help(ctx.clone())));
        registry.register(Box::new(SpectrogramTool::new(ctx)));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn McpTool>) {
        info!("Registered tool {}", tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn McpTool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.describe()).collect()
    }

    /// Dispatch a call by tool name
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => tool.call(arguments).await,
            None => ToolResult::error(format!("Error: Unknown tool: {}", name)),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use faust_core::container::Runtime;
    use faust_core::{Config, Isolation, ProcessRunner};
    use tempfile::TempDir;

    /// A context over a temp workspace root with the container backend
    pub fn context(temp: &TempDir, runner: Arc<dyn ProcessRunner>) -> Arc<ToolContext> {
        context_with(temp, runner, Isolation::PerInvocation)
    }

    pub fn context_with(
        temp: &TempDir,
        runner: Arc<dyn ProcessRunner>,
        isolation: Isolation,
    ) -> Arc<ToolContext> {
        let config = Config {
            work_dir: temp.path().join("work"),
            host_shared_dir: temp.path().join("host"),
            spectrogram_architecture: temp.path().join("spectrogram.cpp"),
            isolation,
            ..Config::default()
        };
        Arc::new(ToolContext::with_runtime(config, runner, Some(Runtime::Docker)))
    }

    /// The only content item of a result
    pub fn single(result: &ToolResult) -> &crate::protocol::Content {
        assert_eq!(result.content.len(), 1, "expected exactly one item");
        &result.content[0]
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::protocol::Content;
    use faust_core::testing::ScriptedRunner;
    use tempfile::TempDir;

    #[test]
    fn test_parse_args_rejects_non_objects() {
        #[derive(serde::Deserialize)]
        struct Args {
            #[allow(dead_code)]
            value: Option<String>,
        }

        assert!(parse_args::<Args>(json!([1, 2])).is_err());
        assert!(parse_args::<Args>(json!("x")).is_err());
        assert!(parse_args::<Args>(Value::Null).is_ok());
    }

    #[test]
    fn test_registry_lists_all_tools() {
        let temp = TempDir::new().unwrap();
        let registry =
            ToolRegistry::with_defaults(context(&temp, Arc::new(ScriptedRunner::succeeding())));

        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "FaustVersionTool",
                "FaustCompileTool",
                "FaustSVGTool",
                "FaustHelpTool",
                "FaustSpectrogramTool",
            ]
        );
    }

    #[test]
    fn test_schemas_are_objects() {
        let temp = TempDir::new().unwrap();
        let registry =
            ToolRegistry::with_defaults(context(&temp, Arc::new(ScriptedRunner::succeeding())));

        for tool in registry.list() {
            assert_eq!(tool.input_schema.schema_type, "object", "{}", tool.name);
            for required in &tool.input_schema.required {
                assert!(tool.input_schema.properties.contains_key(required));
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let temp = TempDir::new().unwrap();
        let registry =
            ToolRegistry::with_defaults(context(&temp, Arc::new(ScriptedRunner::succeeding())));

        let result = registry.call("NoSuchTool", json!({})).await;
        assert!(result.is_error);
        assert_eq!(single(&result), &Content::text("Error: Unknown tool: NoSuchTool"));
    }

    #[tokio::test]
    async fn test_missing_required_arguments_never_panic() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::succeeding());
        let registry = ToolRegistry::with_defaults(context(&temp, runner.clone()));

        for tool in registry.list() {
            if tool.input_schema.required.is_empty() {
                continue;
            }
            let result = registry.call(&tool.name, json!({})).await;
            assert!(result.is_error, "{}", tool.name);
            match single(&result) {
                Content::Text { text } => {
                    assert!(text.starts_with("Error: Invalid arguments"), "{}", text)
                }
                other => panic!("{}: unexpected {:?}", tool.name, other),
            }
        }
        assert!(runner.invocations().is_empty());
    }
}
