//! MCP request handling shared by every transport

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::dispatch::Gateway;
use crate::Error;
use crate::error::rpc_codes;
use crate::protocol::{
    Info, InitializeResult, JsonRpcRequest, JsonRpcResponse, RequestId, ServerCapabilities,
    ToolsCallParams, ToolsCapability, ToolsListResult, negotiate_version,
};

/// Version assumed when a client omits `protocolVersion`
const FALLBACK_CLIENT_VERSION: &str = "2024-11-05";

/// Transport-independent MCP server
#[derive(Debug, Clone)]
pub struct McpServer {
    gateway: Arc<Gateway>,
}

impl McpServer {
    /// Wrap a gateway
    #[must_use]
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// The gateway behind this server
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Handle one raw line of input. Parse failures answer with a null id.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(line) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                debug!(error = %e, "Unparseable message");
                Some(error_response(None, &Error::Json(e)))
            }
        }
    }

    /// Handle one decoded message. Returns `None` for notifications.
    pub async fn handle_message(&self, message: Value) -> Option<JsonRpcResponse> {
        if message.is_array() {
            return Some(error_response(
                None,
                &Error::Protocol("Batch requests are not supported".to_string()),
            ));
        }

        let request = match parse_request(message) {
            Ok(request) => request,
            Err(response) => return Some(response),
        };
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        let Some(id) = id else {
            debug!(notification = %method, "Handling notification");
            return None;
        };

        debug!(method = %method, id = %id, "MCP request");
        let response = match method.as_str() {
            "initialize" => self.handle_initialize(id, params.as_ref()),
            "ping" => JsonRpcResponse::success(id, Value::Object(serde_json::Map::new())),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, params).await,
            other => JsonRpcResponse::error(
                Some(id),
                rpc_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        };
        Some(response)
    }

    /// Handle initialize request
    pub fn handle_initialize(&self, id: RequestId, params: Option<&Value>) -> JsonRpcResponse {
        let client_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_CLIENT_VERSION);
        let negotiated = negotiate_version(client_version);
        debug!(
            client = client_version,
            negotiated = negotiated,
            "Protocol version negotiation"
        );

        let result = InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: Info {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("MCP Database Gateway".to_string()),
            },
            instructions: Some(self.instructions()),
        };
        to_response(id, &result)
    }

    /// Handle tools/list request
    pub fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: self.gateway.tools(),
            next_cursor: None,
        };
        to_response(id, &result)
    }

    /// Handle tools/call request.
    ///
    /// Invocation failures come back as an error envelope inside a normal
    /// result; only a malformed call is a JSON-RPC error.
    pub async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolsCallParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return error_response(
                    Some(id),
                    &Error::Validation(format!("Invalid tools/call params: {e}")),
                );
            }
            None => {
                return error_response(
                    Some(id),
                    &Error::Validation("Missing tools/call params".to_string()),
                );
            }
        };

        let deadline = requested_timeout(params.meta.as_ref());
        let envelope = self
            .gateway
            .call_with_deadline(&params.name, params.arguments, deadline)
            .await;
        to_response(id, &envelope.into_tool_result())
    }

    fn instructions(&self) -> String {
        let registry = self.gateway.registry();
        format!(
            "Database gateway exposing {} operations across {} databases ({}). \
             Call db_list to see them, db_help with a database name for parameters, \
             and db_status to check connectivity.",
            registry.operation_count(),
            registry.len(),
            registry.names().join(", "),
        )
    }
}

fn to_response<T: serde::Serialize>(id: RequestId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string()),
    }
}

fn error_response(id: Option<RequestId>, error: &Error) -> JsonRpcResponse {
    JsonRpcResponse::error(id, error.to_rpc_code(), error.to_string())
}

/// Caller-supplied deadline from `_meta.timeoutMs`, ignored when not positive
fn requested_timeout(meta: Option<&Value>) -> Option<Duration> {
    meta.and_then(|m| m.get("timeoutMs"))
        .and_then(Value::as_u64)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn extract_request_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(s) => Some(RequestId::String(s.clone())),
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        _ => None,
    }
}

/// Validate the envelope of a request or notification.
///
/// A member `id` that is not a string or an integer makes the message an
/// invalid request, answered with a null id; only an absent `id` marks a
/// notification.
#[allow(clippy::result_large_err)]
fn parse_request(value: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let id = match value.get("id") {
        None => None,
        Some(raw) => match extract_request_id(raw) {
            Some(id) => Some(id),
            None => {
                return Err(error_response(
                    None,
                    &Error::Protocol(format!("Request id must be a string or an integer, got {raw}")),
                ));
            }
        },
    };

    if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(error_response(
            id,
            &Error::Protocol("Invalid JSON-RPC version".to_string()),
        ));
    }
    if !value.get("method").is_some_and(Value::is_string) {
        return Err(error_response(id, &Error::Protocol("Missing method".to_string())));
    }

    serde_json::from_value(value)
        .map_err(|e| error_response(id, &Error::Protocol(format!("Malformed request: {e}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parse_request_notification_without_id() {
        let req = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let request = parse_request(req).unwrap();
        assert!(request.id.is_none());
        assert_eq!(request.method, "notifications/initialized");
        assert!(request.params.is_none());
    }

    #[test]
    fn parse_request_keeps_id_and_params() {
        let req = json!({"jsonrpc": "2.0", "id": "a", "method": "tools/call", "params": {"name": "db_list"}});
        let request = parse_request(req).unwrap();
        assert_eq!(request.id, Some(RequestId::String("a".into())));
        assert_eq!(request.params, Some(json!({"name": "db_list"})));
    }

    #[test]
    fn parse_request_wrong_version_keeps_id() {
        let req = json!({"jsonrpc": "1.0", "id": 3, "method": "ping"});
        let err = parse_request(req).unwrap_err();
        assert_eq!(err.id, Some(RequestId::Number(3)));
        assert_eq!(err.error.unwrap().code, rpc_codes::INVALID_REQUEST);
    }

    #[test]
    fn parse_request_missing_method() {
        let req = json!({"jsonrpc": "2.0", "id": "a"});
        let err = parse_request(req).unwrap_err();
        assert!(err.error.unwrap().message.contains("method"));
    }

    #[test]
    fn unusable_ids_are_invalid_requests() {
        for id in [json!(1.5), Value::Null, json!({"n": 1}), json!([1])] {
            let req = json!({"jsonrpc": "2.0", "id": id, "method": "ping"});
            let err = parse_request(req).unwrap_err();
            assert_eq!(err.id, None);
            assert_eq!(err.error.unwrap().code, rpc_codes::INVALID_REQUEST);
        }
    }

    #[test]
    fn requested_timeout_reads_meta() {
        assert_eq!(
            requested_timeout(Some(&json!({"timeoutMs": 250}))),
            Some(Duration::from_millis(250))
        );
        assert_eq!(requested_timeout(Some(&json!({"timeoutMs": 0}))), None);
        assert_eq!(requested_timeout(Some(&json!({"timeoutMs": "fast"}))), None);
        assert_eq!(requested_timeout(None), None);
    }

    #[test]
    fn extract_request_id_accepts_strings_and_integers() {
        assert_eq!(
            extract_request_id(&json!("x")),
            Some(RequestId::String("x".into()))
        );
        assert_eq!(extract_request_id(&json!(7)), Some(RequestId::Number(7)));
        assert_eq!(extract_request_id(&json!(1.5)), None);
        assert_eq!(extract_request_id(&Value::Null), None);
    }
}
