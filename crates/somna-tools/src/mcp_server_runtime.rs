//! JSON-RPC 2.0 (MCP) request handling on top of [`ToolDispatcher`].

use serde_json::{json, Value};

use crate::{tool_descriptors, ToolCall, ToolDispatcher, ToolError};

pub const MCP_JSONRPC_VERSION: &str = "2.0";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "somna";
pub const MCP_ERROR_PARSE: i64 = -32700;
pub const MCP_ERROR_INVALID_REQUEST: i64 = -32600;
pub const MCP_ERROR_METHOD_NOT_FOUND: i64 = -32601;
pub const MCP_ERROR_INVALID_PARAMS: i64 = -32602;
/// Server-defined code for a missing or wrong caller credential.
pub const MCP_ERROR_UNAUTHORIZED: i64 = -32001;
const MCP_CONTENT_TYPE_TEXT: &str = "text";
const MCP_NOTIFICATION_PREFIX: &str = "notifications/";

#[derive(Debug, Clone, PartialEq)]
pub struct McpJsonRpcRequest {
    pub id: Value,
    pub method: String,
    pub params: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct McpDispatchError {
    pub id: Value,
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl McpDispatchError {
    pub fn new(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            code,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == MCP_ERROR_UNAUTHORIZED
    }

    pub fn into_frame(self) -> Value {
        let mut frame = jsonrpc_error_frame(self.id, self.code, self.message);
        if let Some(data) = self.data {
            frame["error"]["data"] = data;
        }
        frame
    }
}

/// True for a frame that carries a method but no id; such frames get no reply.
pub fn is_jsonrpc_notification(value: &Value) -> bool {
    value.as_object().is_some_and(|object| {
        !object.contains_key("id")
            && object
                .get("method")
                .and_then(Value::as_str)
                .is_some_and(|method| method.starts_with(MCP_NOTIFICATION_PREFIX))
    })
}

pub fn parse_jsonrpc_request(value: &Value) -> Result<McpJsonRpcRequest, McpDispatchError> {
    let Some(object) = value.as_object() else {
        return Err(McpDispatchError::new(
            Value::Null,
            MCP_ERROR_INVALID_REQUEST,
            "jsonrpc request must be an object",
        ));
    };
    let id = object.get("id").cloned().ok_or_else(|| {
        McpDispatchError::new(
            Value::Null,
            MCP_ERROR_INVALID_REQUEST,
            "jsonrpc request must include id",
        )
    })?;
    let jsonrpc = object
        .get("jsonrpc")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if jsonrpc != MCP_JSONRPC_VERSION {
        return Err(McpDispatchError::new(
            id,
            MCP_ERROR_INVALID_REQUEST,
            format!("jsonrpc must be '{MCP_JSONRPC_VERSION}'"),
        ));
    }
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            McpDispatchError::new(
                id.clone(),
                MCP_ERROR_INVALID_REQUEST,
                "jsonrpc request must include non-empty method",
            )
        })?;
    let params = match object.get("params") {
        Some(Value::Object(params)) => params.clone(),
        Some(Value::Null) | None => serde_json::Map::new(),
        Some(_) => {
            return Err(McpDispatchError::new(
                id,
                MCP_ERROR_INVALID_PARAMS,
                "jsonrpc request params must be an object",
            ))
        }
    };
    Ok(McpJsonRpcRequest {
        id,
        method: method.to_string(),
        params,
    })
}

/// Routes one parsed request. The credential is checked before any method
/// routing; only `tools/call` reaches the audited dispatcher.
pub async fn dispatch_jsonrpc_request(
    dispatcher: &ToolDispatcher,
    request: &McpJsonRpcRequest,
    credential: Option<&str>,
) -> Result<Value, McpDispatchError> {
    if !dispatcher.verify_credential(credential) {
        if request.method == "tools/call" {
            // Rejected tool calls still leave an audit row.
            let call = ToolCall::new(
                requested_tool_name(request),
                requested_arguments(request),
                credential.map(str::to_string),
            );
            if let Err(error) = dispatcher.dispatch(call).await {
                tracing::debug!(error = %error, "rejected unauthenticated tool call");
            }
        }
        return Err(unauthorized(request.id.clone()));
    }

    match request.method.as_str() {
        "initialize" => Ok(handle_initialize()),
        "tools/list" => Ok(handle_tools_list()),
        "ping" => Ok(json!({})),
        "tools/call" => handle_tools_call(dispatcher, request, credential).await,
        other => Err(McpDispatchError::new(
            request.id.clone(),
            MCP_ERROR_METHOD_NOT_FOUND,
            format!("unsupported method '{other}'"),
        )),
    }
}

fn requested_tool_name(request: &McpJsonRpcRequest) -> &str {
    request
        .params
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
}

fn requested_arguments(request: &McpJsonRpcRequest) -> Value {
    request.params.get("arguments").cloned().unwrap_or(Value::Null)
}

/// Parses and dispatches a raw frame, always producing a response frame.
pub async fn handle_jsonrpc_frame(
    dispatcher: &ToolDispatcher,
    frame: &Value,
    credential: Option<&str>,
) -> Result<Value, McpDispatchError> {
    let request = parse_jsonrpc_request(frame)?;
    let result = dispatch_jsonrpc_request(dispatcher, &request, credential).await?;
    Ok(jsonrpc_result_frame(request.id, result))
}

fn handle_initialize() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        }
    })
}

fn handle_tools_list() -> Value {
    json!({ "tools": tool_descriptors() })
}

async fn handle_tools_call(
    dispatcher: &ToolDispatcher,
    request: &McpJsonRpcRequest,
    credential: Option<&str>,
) -> Result<Value, McpDispatchError> {
    let name = Some(requested_tool_name(request))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            McpDispatchError::new(
                request.id.clone(),
                MCP_ERROR_INVALID_PARAMS,
                "tools/call requires non-empty field 'name'",
            )
        })?;
    let call = ToolCall::new(
        name,
        requested_arguments(request),
        credential.map(str::to_string),
    );

    match dispatcher.dispatch(call).await {
        Ok(result) => Ok(mcp_tool_call_result(result, false)),
        Err(ToolError::Authentication) => Err(unauthorized(request.id.clone())),
        Err(error) if error.is_request_error() => Err(McpDispatchError::new(
            request.id.clone(),
            MCP_ERROR_INVALID_PARAMS,
            error.to_string(),
        )
        .with_data(error.to_payload())),
        Err(error) => Ok(mcp_tool_call_result(error.to_payload(), true)),
    }
}

fn unauthorized(id: Value) -> McpDispatchError {
    McpDispatchError::new(id, MCP_ERROR_UNAUTHORIZED, ToolError::Authentication.to_string())
}

pub fn mcp_tool_call_result(content: Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(&content)
        .unwrap_or_else(|_| "{\"error\":\"failed to serialize tool result\"}".to_string());
    json!({
        "content": [{
            "type": MCP_CONTENT_TYPE_TEXT,
            "text": text
        }],
        "isError": is_error,
        "structuredContent": content,
    })
}

pub fn jsonrpc_result_frame(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": MCP_JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

pub fn jsonrpc_error_frame(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": MCP_JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        }
    })
}
