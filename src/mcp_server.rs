//! MCP Server Module
//!
//! JSON-RPC 2.0 over stdin/stdout exposing the tool registry to MCP clients.
//!
//! # Protocol
//!
//! - `initialize`: protocol version and server info
//! - `tools/list`: every registered tool with its input schema
//! - `tools/call`: run a tool synchronously through the gateway
//!
//! Notifications (requests without an `id`) are accepted and never answered.
//!
//! # Usage
//!
//! ```bash
//! netkit mcp
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::gateway::{Dispatch, Gateway};
use crate::tools::{ExecRequest, ExecutionResult, ToolDescriptor};

/// MCP protocol revision spoken by this server
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Standard and tool-specific JSON-RPC error codes
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const TOOL_NOT_FOUND: i32 = -32001;
    pub const TOOL_UNAVAILABLE: i32 = -32002;
    pub const PERMISSION_ERROR: i32 = -32004;
}

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRequest {
    /// JSON-RPC version (must be "2.0")
    jsonrpc: Option<String>,
    /// Method name
    method: Option<String>,
    /// Method parameters (optional)
    #[serde(default)]
    params: Option<Value>,
    /// Request ID; absent for notifications
    id: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

impl JsonResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, msg)
    }

    fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }
}

impl From<GatewayError> for JsonRpcError {
    fn from(err: GatewayError) -> Self {
        let code = match err {
            GatewayError::Validation(_) => codes::INVALID_PARAMS,
            GatewayError::Permission(_) => codes::PERMISSION_ERROR,
            GatewayError::NotFound(_) => codes::TOOL_NOT_FOUND,
            GatewayError::Unavailable(_) => codes::TOOL_UNAVAILABLE,
            GatewayError::Unauthorized(_)
            | GatewayError::RateLimited { .. }
            | GatewayError::Internal(_) => codes::INTERNAL_ERROR,
        };
        if let GatewayError::Internal(ref detail) = err {
            error!("tool call failed: {}", detail);
        }
        Self::new(code, err.public_message())
    }
}

/// MCP server state
#[derive(Debug, Clone)]
pub struct McpServer {
    gateway: Gateway,
}

impl McpServer {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Handle one line of input; `None` means nothing is written back
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(line) {
            Ok(value) => self.handle(value).await?,
            Err(e) => {
                warn!("Failed to parse JSON: {}", e);
                JsonResponse::failure(
                    Value::Null,
                    JsonRpcError::new(codes::PARSE_ERROR, "Parse error: Invalid JSON"),
                )
            }
        };

        Some(serde_json::to_string(&response).unwrap_or_else(|e| {
            error!("Failed to serialize response: {}", e);
            r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Failed to serialize response"},"id":null}"#.to_string()
        }))
    }

    async fn handle(&self, value: Value) -> Option<JsonResponse> {
        let request: JsonRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(_) => {
                return Some(JsonResponse::failure(
                    Value::Null,
                    JsonRpcError::new(codes::INVALID_REQUEST, "Invalid Request"),
                ))
            }
        };

        let is_notification = request.id.is_none();
        let id = request.id.unwrap_or(Value::Null);

        let method = match (request.jsonrpc.as_deref(), request.method) {
            (Some("2.0"), Some(method)) => method,
            _ => {
                return Some(JsonResponse::failure(
                    id,
                    JsonRpcError::new(codes::INVALID_REQUEST, "Invalid Request"),
                ))
            }
        };

        if is_notification {
            debug!(method = %method, "notification received");
            return None;
        }

        let params = request.params.unwrap_or_else(|| json!({}));
        let result = match method.as_str() {
            "initialize" => Ok(self.initialize()),
            "tools/list" => Ok(self.tools_list()),
            "tools/call" => self.tools_call(params).await,
            other => {
                warn!("Unknown method: {}", other);
                Err(JsonRpcError::method_not_found(other))
            }
        };

        Some(match result {
            Ok(value) => JsonResponse::success(id, value),
            Err(e) => JsonResponse::failure(id, e),
        })
    }

    fn initialize(&self) -> Value {
        info!("Handling initialize request");
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": "netkit-api-mcp",
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    fn tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .gateway
            .registry()
            .descriptors()
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "inputSchema": input_schema(d),
                })
            })
            .collect();

        json!({ "tools": tools })
    }

    async fn tools_call(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("Missing or invalid 'name' parameter"))?
            .to_string();

        if !self.gateway.registry().contains(&name) {
            return Err(JsonRpcError::new(
                codes::TOOL_NOT_FOUND,
                format!("Unknown tool: {}", name),
            ));
        }

        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(arguments) => arguments.clone(),
        };
        let mut request: ExecRequest = serde_json::from_value(arguments)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid arguments: {}", e)))?;
        request.tool = Some(name.clone());
        request.run_async = false;

        info!(tool = %name, "Handling tools/call request");

        match self.gateway.run(request).await? {
            Dispatch::Completed(result) => Ok(call_result(&name, &result)),
            Dispatch::Accepted(_) => Err(JsonRpcError::new(
                codes::INTERNAL_ERROR,
                "Unexpected background job for a synchronous call",
            )),
        }
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("Received: {}", line);

            if let Some(response) = self.handle_line(line).await {
                writer
                    .write_all(response.as_bytes())
                    .await
                    .context("Failed to write response")?;
                writer.write_all(b"\n").await.context("Failed to write response")?;
                writer.flush().await.context("Failed to flush output")?;
                debug!("Sent: {}", response);
            }
        }

        info!("EOF received, shutting down");
        Ok(())
    }
}

/// Run the MCP server on the process's stdin and stdout
pub async fn run_stdio(gateway: Gateway) -> Result<()> {
    info!(
        "netkit MCP server ready ({} tools)",
        gateway.registry().len()
    );
    McpServer::new(gateway)
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

fn input_schema(descriptor: &ToolDescriptor) -> Value {
    let mut properties = json!({
        "command": {
            "type": "string",
            "description": format!(
                "Command arguments as string (e.g., '{} arg1 arg2'). Either 'command' or 'args' must be provided.",
                descriptor.name
            ),
        },
        "args": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Command arguments as array. Either 'command' or 'args' must be provided.",
        },
        "timeout": {
            "type": "integer",
            "description": format!(
                "Timeout in seconds (default: {}, max: {})",
                descriptor.timeouts.default_secs, descriptor.timeouts.max_secs
            ),
            "default": descriptor.timeouts.default_secs,
        },
    });

    if descriptor.name == "ssh" {
        if let Some(map) = properties.as_object_mut() {
            let ssh = json!({
                "host": { "type": "string", "description": "SSH host or alias" },
                "user": { "type": "string", "description": "SSH user (optional)" },
                "port": { "type": "integer", "description": "SSH port (optional)" },
                "ssh_dir": { "type": "string", "description": "Path to .ssh directory (optional)" },
                "strict_host_key_checking": {
                    "type": "string",
                    "enum": ["yes", "no", "accept-new"],
                    "description": "StrictHostKeyChecking option",
                },
                "proxy_jump": { "type": "string", "description": "ProxyJump host" },
                "allocate_tty": { "type": "boolean", "description": "Allocate TTY" },
                "extra_opts": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Additional ssh options",
                },
            });
            if let Value::Object(extra) = ssh {
                map.extend(extra);
            }
        }
    }

    json!({ "type": "object", "properties": properties })
}

fn call_result(name: &str, result: &ExecutionResult) -> Value {
    let mut text = format!(
        "{} execution completed\n\nExit code: {}\nDuration: {}s\n\n",
        name, result.exit_code, result.duration_seconds
    );
    if !result.stdout.is_empty() {
        text.push_str(&format!("=== Output ===\n{}\n", result.stdout));
    }
    if !result.stderr.is_empty() {
        text.push_str(&format!("\n=== Errors ===\n{}\n", result.stderr));
    }

    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": result.exit_code != 0,
    })
}
