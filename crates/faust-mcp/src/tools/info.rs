//! Compiler information tools (`faust -v`, `faust -h`)

use std::sync::Arc;

use async_trait::async_trait;
use faust_core::{encode_file, ExitPolicy, Pipeline, Stage};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_args, respond, tool, McpTool, ToolContext, ToolError};
use crate::protocol::{Tool, ToolResult};

/// Runs the compiler with one informational flag and returns what it printed
pub struct InfoTool {
    ctx: Arc<ToolContext>,
    name: &'static str,
    description: &'static str,
    flag: &'static str,
    output: &'static str,
}

/// Info tools take no arguments; unknown ones are ignored
#[derive(Debug, Deserialize)]
struct NoArgs {}

impl InfoTool {
    pub fn version(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            name: "FaustVersionTool",
            description: "Executes 'faust -v' to retrieve Faust compiler version and build information",
            flag: "-v",
            output: "version.txt",
        }
    }

    pub fn help(ctx: Arc<ToolContext>) -> Self {
        Self {
            ctx,
            name: "FaustHelpTool",
            description: "Executes 'faust -h' to retrieve all Faust compiler options and usage information",
            flag: "-h",
            output: "help.txt",
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let _: NoArgs = parse_args(arguments)?;
        let ws = self.ctx.workspaces.allocate().await?;

        // `faust -h` exits non-zero on success, so the status says nothing here
        let command = self.ctx.faust_command(&ws)?.arg(self.flag);
        let pipeline = Pipeline::new()
            .stage(Stage::new("faust", command).exit_policy(ExitPolicy::Ignore));

        let mut results = pipeline
            .run(self.ctx.runner.as_ref(), &ws, self.ctx.timeout())
            .await
            .map_err(|e| ToolError::from_stage("faust command", &e))?;
        let result = results
            .pop()
            .ok_or_else(|| ToolError::stage("faust command", "no result"))?;
        info!("faust {} exited with {}", self.flag, result.exit_code);

        let path = ws
            .write(self.output, result.combined())
            .map_err(|e| ToolError::io(self.output, e))?;

        let artifact =
            encode_file(&path).ok_or_else(|| ToolError::ArtifactMissing(self.output.to_string()))?;
        Ok(ToolResult::resource(artifact))
    }
}

#[async_trait]
impl McpTool for InfoTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn describe(&self) -> Tool {
        tool(self.name, self.description, json!({}), vec![])
    }

    async fn call(&self, arguments: Value) -> ToolResult {
        respond(self.name, self.execute(arguments).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Content, ResourceContents};
    use crate::tools::test_support::{context, single};
    use faust_core::testing::ScriptedRunner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_version_returns_text_resource() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| {
            ScriptedRunner::exit(0, "FAUST Version 2.70.3\n", "")
        }));
        let tool = InfoTool::version(context(&temp, runner.clone()));

        let result = tool.call(json!({})).await;
        assert!(!result.is_error);
        assert_eq!(
            single(&result),
            &Content::Resource {
                resource: ResourceContents {
                    mime_type: "text/plain".to_string(),
                    text: Some("FAUST Version 2.70.3\n".to_string()),
                    data: None,
                }
            }
        );

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, vec!["-v"]);
    }

    #[tokio::test]
    async fn test_help_accepts_non_zero_exit_and_keeps_both_streams() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| {
            ScriptedRunner::exit(1, "Usage: faust [options]\n", "-h  print help\n")
        }));
        let tool = InfoTool::help(context(&temp, runner));

        let result = tool.call(Value::Null).await;
        match single(&result) {
            Content::Resource { resource } => {
                assert_eq!(
                    resource.text.as_deref(),
                    Some("Usage: faust [options]\n-h  print help\n")
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        let temp = TempDir::new().unwrap();
        let tool = InfoTool::version(context(&temp, Arc::new(ScriptedRunner::succeeding())));

        let result = tool.call(json!({})).await;
        assert!(result.is_error);
        assert_eq!(single(&result), &Content::text("Error: Could not read version.txt"));
    }

    #[tokio::test]
    async fn test_runner_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::timing_out());
        let tool = InfoTool::help(context(&temp, runner.clone()));

        let result = tool.call(json!({})).await;
        assert!(result.is_error);
        // The runaway container is killed by name after the timeout
        let calls = runner.invocations();
        assert_eq!(runner.programs(), vec!["faust", "docker"]);
        assert_eq!(calls[1].args[0], "kill");
        assert!(calls[1].args[1].starts_with("faust-mcp-"));
        match single(&result) {
            Content::Text { text } => {
                assert!(text.starts_with("Error: faust command failed"), "{}", text);
                assert!(text.contains("timed out"), "{}", text);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
