//! DSP to C++ compilation

use std::sync::Arc;

use async_trait::async_trait;
use faust_core::{encode_file, sanitize_filename, Pipeline, Stage, StageError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{parse_args, respond, tool, McpTool, ToolContext, ToolError};
use crate::protocol::{Tool, ToolResult};

const NAME: &str = "FaustCompileTool";

#[derive(Debug, Deserialize)]
struct CompileArgs {
    value: String,
    #[serde(default = "default_filename")]
    filename: String,
    #[serde(default)]
    options: String,
}

fn default_filename() -> String {
    "source.dsp".to_string()
}

/// Names of the files one compilation touches
#[derive(Debug, PartialEq, Eq)]
struct CompileFiles {
    source: String,
    generated: String,
    errors: String,
}

impl CompileFiles {
    fn for_source(filename: &str) -> Result<Self, ToolError> {
        let source = sanitize_filename(filename)?;
        let stem = source
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(source);
        if stem.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "filename '{}' has no base name",
                source
            )));
        }

        let files = Self {
            source: source.to_string(),
            generated: format!("{}.cpp", stem),
            errors: format!("{}.txt", stem),
        };
        if files.source == files.generated || files.source == files.errors {
            return Err(ToolError::InvalidArguments(format!(
                "filename '{}' would be overwritten by the compiler output",
                source
            )));
        }
        Ok(files)
    }
}

/// Compiles Faust source to C++
pub struct CompileTool {
    ctx: Arc<ToolContext>,
}

impl CompileTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let args: CompileArgs = parse_args(arguments)?;
        let files = CompileFiles::for_source(&args.filename)?;
        let ws = self.ctx.workspaces.allocate().await?;

        ws.write(&files.source, &args.value)
            .map_err(|e| ToolError::io(&files.source, e))?;
        for stale in [&files.generated, &files.errors] {
            ws.remove(stale).map_err(|e| ToolError::io(stale, e))?;
        }

        let command = self
            .ctx
            .faust_command(&ws)?
            .args(["-o", files.generated.as_str(), files.source.as_str()])
            .args(args.options.split_whitespace());
        let pipeline = Pipeline::new().stage(Stage::new("faust", command).requires(&files.source));

        match pipeline
            .run(self.ctx.runner.as_ref(), &ws, self.ctx.timeout())
            .await
        {
            Ok(_) => {
                info!("Compiled {} to {}", files.source, files.generated);
                let artifact = encode_file(&ws.resolve(&files.generated))
                    .ok_or_else(|| ToolError::ArtifactMissing("generated file".to_string()))?;
                Ok(ToolResult::resource(artifact))
            }
            Err(StageError::Failed {
                result: Some(result),
                ..
            }) => {
                debug!("faust exited with {}", result.exit_code);
                let path = ws
                    .write(&files.errors, &result.stderr)
                    .map_err(|e| ToolError::io(&files.errors, e))?;
                match encode_file(&path) {
                    Some(artifact) => Ok(ToolResult::diagnostics(artifact)),
                    None => Err(ToolError::stage(
                        "Faust compilation",
                        format!("exit code {} with no diagnostics", result.exit_code),
                    )),
                }
            }
            Err(e) => Err(ToolError::from_stage("Faust compilation", &e)),
        }
    }
}

#[async_trait]
impl McpTool for CompileTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self) -> Tool {
        tool(
            NAME,
            "A tool to compile Faust programs",
            json!({
                "value": {
                    "type": "string",
                    "description": "Faust source code to compile"
                },
                "filename": {
                    "type": "string",
                    "description": "The filename of the Faust source code",
                    "default": "source.dsp"
                },
                "options": {
                    "type": "string",
                    "description": "Optional compilation options"
                }
            }),
            vec!["value"],
        )
    }

    async fn call(&self, arguments: Value) -> ToolResult {
        respond(NAME, self.execute(arguments).await)
    }
}
