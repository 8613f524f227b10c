//! `POST /api/mcp` JSON-RPC endpoint.
use super::*;
use somna_tools::mcp_server_runtime::{
    handle_jsonrpc_frame, is_jsonrpc_notification, jsonrpc_error_frame, MCP_ERROR_PARSE,
    MCP_ERROR_UNAUTHORIZED,
};

pub(super) async fn handle_mcp_request(
    State(state): State<GatewayServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let frame = match serde_json::from_slice::<Value>(&body) {
        Ok(frame) => frame,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(jsonrpc_error_frame(
                    Value::Null,
                    MCP_ERROR_PARSE,
                    format!("failed to parse jsonrpc body: {error}"),
                )),
            )
                .into_response();
        }
    };
    let credential = bearer_token_from_headers(&headers);

    if is_jsonrpc_notification(&frame) {
        if !state.dispatcher.verify_credential(credential.as_deref()) {
            return unauthorized_frame(Value::Null);
        }
        return StatusCode::ACCEPTED.into_response();
    }

    match handle_jsonrpc_frame(&state.dispatcher, &frame, credential.as_deref()).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) if error.is_unauthorized() => unauthorized_frame(error.id),
        Err(error) => (StatusCode::OK, Json(error.into_frame())).into_response(),
    }
}

fn unauthorized_frame(id: Value) -> Response {
    let api_error = GatewayApiError::unauthorized();
    (
        api_error.status,
        Json(jsonrpc_error_frame(
            id,
            MCP_ERROR_UNAUTHORIZED,
            api_error.message,
        )),
    )
        .into_response()
}
