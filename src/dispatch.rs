//! Server-side JSON-RPC routing for MCP handlers.
//!
//! [`McpHandler`] is what a test server implements. [`Dispatcher`] turns raw
//! JSON-RPC messages into handler calls, and is shared by the in-process
//! transport and by [`serve_stdio`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::protocol::{
    CallToolResult, Implementation, JsonRpcResponse, ReadResourceResult, Resource, Tool,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION,
};

/// An MCP server implementation that can be driven without a network.
#[async_trait]
pub trait McpHandler: Send + Sync {
    fn server_info(&self) -> Implementation;

    async fn list_tools(&self) -> Result<Vec<Tool>>;

    /// Errors are reported to the client as a tool result with `isError: true`.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult>;

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(Vec::new())
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        Err(anyhow::anyhow!("Unknown resource: {uri}"))
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn McpHandler>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn McpHandler>) -> Self {
        Self { handler }
    }

    /// Handle one line of input. Returns the serialized reply, if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let reply = match serde_json::from_str::<Value>(line) {
            Ok(message) => self.handle_message(&message).await?,
            Err(e) => {
                warn!("Failed to parse JSON-RPC message: {e}");
                to_value(JsonRpcResponse::failure(Value::Null, PARSE_ERROR, "Parse error"))
            }
        };
        serde_json::to_string(&reply).ok()
    }

    /// Route a parsed message. Notifications (no `id`) never produce a reply.
    pub async fn handle_message(&self, message: &Value) -> Option<Value> {
        let id = message.get("id").cloned();
        let Some(method) = message.get("method").and_then(|m| m.as_str()) else {
            return id.map(|id| {
                to_value(JsonRpcResponse::failure(
                    id,
                    INVALID_REQUEST,
                    "Invalid request: missing method",
                ))
            });
        };

        let Some(id) = id else {
            debug!("Received notification: {method}");
            return None;
        };

        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let response = match self.route(method, &params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, reason)) => JsonRpcResponse::failure(id, code, reason),
        };
        Some(to_value(response))
    }

    async fn route(&self, method: &str, params: &Value) -> Result<Value, (i64, String)> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {
                        "listChanged": false
                    },
                    "resources": {}
                },
                "serverInfo": self.handler.server_info()
            })),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools = self.handler.list_tools().await.map_err(internal)?;
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| (INVALID_PARAMS, "Missing tool name".to_string()))?;
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

                let result = match self.handler.call_tool(name, arguments).await {
                    Ok(result) => result,
                    Err(e) => {
                        debug!("Tool '{name}' failed: {e}");
                        CallToolResult::error(e.to_string())
                    }
                };
                serde_json::to_value(result).map_err(internal)
            }
            "resources/list" => {
                let resources = self.handler.list_resources().await.map_err(internal)?;
                Ok(json!({ "resources": resources }))
            }
            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(|u| u.as_str())
                    .ok_or_else(|| (INVALID_PARAMS, "Missing resource uri".to_string()))?;
                let result = self.handler.read_resource(uri).await.map_err(internal)?;
                serde_json::to_value(result).map_err(internal)
            }
            _ => Err((METHOD_NOT_FOUND, "Method not found".to_string())),
        }
    }
}

fn internal(e: impl std::fmt::Display) -> (i64, String) {
    (INTERNAL_ERROR, e.to_string())
}

fn to_value(response: JsonRpcResponse) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

/// Serve a handler over line-delimited JSON-RPC on stdin/stdout until stdin closes.
pub async fn serve_stdio(handler: Arc<dyn McpHandler>) -> Result<()> {
    let dispatcher = Dispatcher::new(handler);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(reply) = dispatcher.handle_line(&line).await {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    debug!("stdin closed, stopping stdio server");
    Ok(())
}
