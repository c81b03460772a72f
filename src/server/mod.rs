//! MCP server: JSON-RPC dispatch over stdio or HTTP

pub mod http;
mod oauth;
pub mod stdio;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::rpc_codes;
use crate::protocol::{
    Info, InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    ServerCapabilities, ToolsCallParams, ToolsCapability, ToolsListResult, negotiate_version,
};
use crate::tools::ToolsManager;

/// Protocol front end shared by every transport
pub struct McpServer {
    info: Info,
    tools: ToolsManager,
}

impl McpServer {
    /// Create a server announcing `config.name` / `config.version`
    #[must_use]
    pub fn new(config: &ServerConfig, tools: ToolsManager) -> Self {
        Self {
            info: Info {
                name: config.name.clone(),
                version: config.version.clone(),
                title: None,
            },
            tools,
        }
    }

    /// Server info sent in `initialize`
    #[must_use]
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Handle one raw message; `None` means nothing should be sent back
    pub async fn handle_text(&self, text: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => {
                debug!(error = %e, "Unparseable message");
                Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ))
            }
        }
    }

    /// Handle one parsed message
    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Some(JsonRpcResponse::error(
                value
                    .get("id")
                    .and_then(|id| serde_json::from_value(id.clone()).ok()),
                rpc_codes::INVALID_REQUEST,
                "Invalid Request: expected jsonrpc \"2.0\"",
            ));
        }

        match JsonRpcMessage::from_value(value) {
            Ok(JsonRpcMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(JsonRpcMessage::Notification(notification)) => {
                debug!(notification = %notification.method, "Handling notification");
                None
            }
            Err(e) => Some(JsonRpcResponse::error(
                None,
                rpc_codes::INVALID_REQUEST,
                format!("Invalid Request: {e}"),
            )),
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        debug!(method = %method, id = %id, "Request");

        match method.as_str() {
            "initialize" => {
                let params: InitializeParams = params
                    .and_then(|p| serde_json::from_value(p).ok())
                    .unwrap_or_default();
                let client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str());
                info!(client = %client, protocol_version = %params.protocol_version, "Client initialized");

                let result = InitializeResult {
                    protocol_version: negotiate_version(&params.protocol_version).to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: false,
                        }),
                    },
                    server_info: self.info.clone(),
                    instructions: None,
                };
                to_response(id, &result)
            }
            "tools/list" => to_response(
                id,
                &ToolsListResult {
                    tools: self.tools.tools().to_vec(),
                    next_cursor: None,
                },
            ),
            "tools/call" => {
                let params: ToolsCallParams = match params.map(serde_json::from_value) {
                    Some(Ok(params)) => params,
                    Some(Err(e)) => {
                        return JsonRpcResponse::error(
                            Some(id),
                            rpc_codes::INVALID_PARAMS,
                            format!("Invalid params: {e}"),
                        );
                    }
                    None => {
                        return JsonRpcResponse::error(
                            Some(id),
                            rpc_codes::INVALID_PARAMS,
                            "Invalid params: missing tool name",
                        );
                    }
                };

                match self.tools.call(&params.name, params.arguments).await {
                    Ok(result) => to_response(id, &result),
                    Err(e) => {
                        warn!(tool = %params.name, error = %e, "Tool call rejected");
                        JsonRpcResponse::error(Some(id), e.to_rpc_code(), e.to_string())
                    }
                }
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            _ => JsonRpcResponse::error(
                Some(id),
                rpc_codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
        }
    }
}

fn to_response<T: serde::Serialize>(id: crate::protocol::RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string()),
    }
}
