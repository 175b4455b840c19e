//! Block diagram generation (`faust -svg`)

use std::sync::Arc;

use async_trait::async_trait;
use faust_core::{encode_file, Pipeline, Stage, StageError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_args, respond, tool, McpTool, ToolContext, ToolError};
use crate::protocol::{Tool, ToolResult};

const NAME: &str = "FaustSVGTool";

const SOURCE: &str = "source.dsp";
const ERRORS: &str = "source.txt";
/// faust writes diagrams to `<stem>-svg/`, one file per block, top level first
const DIAGRAM_DIR: &str = "source-svg";
const DIAGRAM: &str = "source-svg/process.svg";

#[derive(Debug, Deserialize)]
struct SvgArgs {
    value: String,
}

/// Renders the top-level block diagram of a DSP program
pub struct SvgTool {
    ctx: Arc<ToolContext>,
}

impl SvgTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let args: SvgArgs = parse_args(arguments)?;
        let ws = self.ctx.workspaces.allocate().await?;

        ws.write(SOURCE, &args.value)
            .map_err(|e| ToolError::io(SOURCE, e))?;
        for stale in [DIAGRAM_DIR, ERRORS] {
            ws.remove(stale).map_err(|e| ToolError::io(stale, e))?;
        }

        let command = self
            .ctx
            .faust_command(&ws)?
            .args(["-o", "/dev/null", "-svg", SOURCE]);
        let pipeline = Pipeline::new().stage(Stage::new("faust", command).requires(SOURCE));

        match pipeline
            .run(self.ctx.runner.as_ref(), &ws, self.ctx.timeout())
            .await
        {
            Ok(_) => {
                info!("Generated {}", DIAGRAM);
                let artifact = encode_file(&ws.resolve(DIAGRAM))
                    .ok_or_else(|| ToolError::ArtifactMissing("SVG file".to_string()))?;
                Ok(ToolResult::resource(artifact))
            }
            Err(StageError::Failed {
                result: Some(result),
                ..
            }) => {
                let path = ws
                    .write(ERRORS, &result.stderr)
                    .map_err(|e| ToolError::io(ERRORS, e))?;
                match encode_file(&path) {
                    Some(artifact) => Ok(ToolResult::diagnostics(artifact)),
                    None => Err(ToolError::stage(
                        "SVG generation",
                        format!("faust exited with {}", result.exit_code),
                    )),
                }
            }
            Err(e) => Err(ToolError::from_stage("SVG generation", &e)),
        }
    }
}

#[async_trait]
impl McpTool for SvgTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self) -> Tool {
        tool(
            NAME,
            "Compiles Faust DSP code and generates SVG block diagram visualization using 'faust -svg'",
            json!({
                "value": {
                    "type": "string",
                    "description": "Faust DSP source code to compile and visualize as SVG diagram"
                }
            }),
            vec!["value"],
        )
    }

    async fn call(&self, arguments: Value) -> ToolResult {
        respond(NAME, self.execute(arguments).await)
    }
}
