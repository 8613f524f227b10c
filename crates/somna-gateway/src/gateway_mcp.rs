use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use somna_tools::ToolDispatcher;
use tokio::net::TcpListener;

mod auth_runtime;
mod mcp_handlers;
mod read_handlers;
mod server_bootstrap;
#[cfg(test)]
mod tests;
mod types;

use auth_runtime::{authorize_gateway_request, bearer_token_from_headers};
use mcp_handlers::handle_mcp_request;
use read_handlers::{handle_dashboard, handle_healthz, handle_recent_logs};
use types::GatewayApiError;

pub use server_bootstrap::{build_gateway_router, run_gateway_server};

const MCP_ENDPOINT: &str = "/api/mcp";
const DASHBOARD_ENDPOINT: &str = "/api/dashboard";
const LOGS_ENDPOINT: &str = "/api/logs";
const HEALTHZ_ENDPOINT: &str = "/healthz";
const DASHBOARD_MAX_DAYS: usize = 90;
const LOGS_MAX_LIMIT: usize = 200;
pub const DEFAULT_GATEWAY_BIND: &str = "127.0.0.1:8787";

/// Listener settings for [`run_gateway_server`].
#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    pub bind: String,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_GATEWAY_BIND.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct GatewayServerState {
    pub(crate) dispatcher: Arc<ToolDispatcher>,
}

impl GatewayServerState {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }
}
