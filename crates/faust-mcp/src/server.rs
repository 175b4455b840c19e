//! MCP Server
//!
//! Handles the MCP protocol over stdio, processing JSON-RPC 2.0 messages.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolsCapability, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::tools::ToolRegistry;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP Server that communicates over stdio
pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Run the server, reading from stdin and writing to stdout
    pub async fn run(&self) -> anyhow::Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.run_with(reader, writer).await
    }

    /// Serve newline-delimited requests from `reader` until EOF
    pub async fn run_with<R, W>(&self, mut reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF - client disconnected
                info!("Client disconnected");
                break;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            if let Some(resp) = self.handle_message(line).await {
                let resp_str = serde_json::to_string(&resp)?;
                debug!("Sending: {}", resp_str);
                writer.write_all(resp_str.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC message
    pub async fn handle_message(&self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = request.id.clone();

        if request.jsonrpc != "2.0" {
            warn!("Unsupported jsonrpc version: {}", request.jsonrpc);
            return id.map(|id| {
                JsonRpcResponse::error(
                    Some(id),
                    INVALID_REQUEST,
                    format!("Unsupported jsonrpc version: {}", request.jsonrpc),
                )
            });
        }

        // No id means no response expected
        if id.is_none() {
            handle_notification(&request.method);
            return None;
        }

        match self.handle_request(&request.method, request.params).await {
            Ok(value) => Some(JsonRpcResponse::success(id, value)),
            Err((code, message)) => Some(JsonRpcResponse::error(id, code, message)),
        }
    }

    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, (i32, String)> {
        match method {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(params).await,
            "ping" => Ok(json!({})),
            _ => {
                warn!("Unknown method: {}", method);
                Err((METHOD_NOT_FOUND, format!("Method not found: {}", method)))
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, (i32, String)> {
        info!("Initializing MCP server");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {}),
            },
            server_info: ServerInfo {
                name: "faust-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        to_value(result)
    }

    fn handle_list_tools(&self) -> Result<Value, (i32, String)> {
        to_value(ListToolsResult {
            tools: self.registry.list(),
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, (i32, String)> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {}", e)))?,
            None => return Err((INVALID_PARAMS, "Missing params".to_string())),
        };

        info!("Calling tool: {}", params.name);
        let result = self.registry.call(&params.name, params.arguments).await;

        to_value(result)
    }
}

fn handle_notification(method: &str) {
    match method {
        "notifications/initialized" => info!("Client initialized"),
        "notifications/cancelled" => debug!("Request cancelled"),
        _ => debug!("Unknown notification: {}", method),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, (i32, String)> {
    serde_json::to_value(value).map_err(|e| (INTERNAL_ERROR, format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolContext;
    use faust_core::container::Runtime;
    use faust_core::testing::ScriptedRunner;
    use faust_core::Config;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn server(temp: &TempDir, runner: Arc<ScriptedRunner>) -> McpServer {
        let config = Config {
            work_dir: temp.path().join("work"),
            host_shared_dir: temp.path().join("host"),
            ..Config::default()
        };
        let ctx = ToolContext::with_runtime(config, runner, Some(Runtime::Docker));
        McpServer::new(ToolRegistry::with_defaults(Arc::new(ctx)))
    }

    async fn request(server: &McpServer, message: Value) -> Value {
        let resp = server
            .handle_message(&message.to_string())
            .await
            .expect("a response");
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp, Arc::new(ScriptedRunner::succeeding()));

        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], "faust-mcp");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp, Arc::new(ScriptedRunner::succeeding()));

        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp, Arc::new(ScriptedRunner::succeeding()));

        let resp = request(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 5);
        assert_eq!(tools[1]["name"], "FaustCompileTool");
        assert_eq!(tools[1]["inputSchema"]["required"], json!(["value"]));
    }

    #[tokio::test]
    async fn test_tools_call_dispatches_to_registry() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| {
            ScriptedRunner::exit(0, "FAUST Version 2.70.3\n", "")
        }));
        let server = server(&temp, runner);

        let resp = request(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": "v",
                "method": "tools/call",
                "params": {"name": "FaustVersionTool", "arguments": {}}
            }),
        )
        .await;
        assert_eq!(resp["id"], "v");
        let content = &resp["result"]["content"];
        assert_eq!(content[0]["type"], "resource");
        assert_eq!(content[0]["resource"]["text"], "FAUST Version 2.70.3\n");
        assert!(resp["result"].get("isError").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_result_not_an_rpc_error() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp, Arc::new(ScriptedRunner::succeeding()));

        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "Nope"}}),
        )
        .await;
        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(resp["result"]["content"][0]["text"], "Error: Unknown tool: Nope");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp, Arc::new(ScriptedRunner::succeeding()));

        let resp = request(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"})).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);

        let resp = request(&server, json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call"})).await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);

        let resp = server.handle_message("{not json").await.unwrap();
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);

        let resp = request(&server, json!({"jsonrpc": "1.0", "id": 6, "method": "ping"})).await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert!(server
            .handle_message(r#"{"jsonrpc":"1.0","method":"ping"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_run_with_serves_lines_in_order() {
        let temp = TempDir::new().unwrap();
        let server = server(&temp, Arc::new(ScriptedRunner::succeeding()));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let mut output = Vec::new();
        server
            .run_with(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], 2);
        assert_eq!(lines[1]["result"], json!({}));
    }
}
