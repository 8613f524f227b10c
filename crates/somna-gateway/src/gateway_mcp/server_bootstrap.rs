//! Gateway server bootstrap and router wiring.

use super::*;

/// Binds the listener and serves until ctrl-c.
pub async fn run_gateway_server(
    config: GatewayServerConfig,
    dispatcher: Arc<ToolDispatcher>,
) -> Result<()> {
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid gateway bind address '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway server address")?;
    tracing::info!(
        addr = %local_addr,
        endpoint = MCP_ENDPOINT,
        client_id = dispatcher.client_id(),
        "gateway server listening"
    );

    let app = build_gateway_router(GatewayServerState::new(dispatcher));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")?;
    tracing::info!("gateway server stopped");
    Ok(())
}

pub fn build_gateway_router(state: GatewayServerState) -> Router {
    Router::new()
        .route(MCP_ENDPOINT, post(handle_mcp_request))
        .route(DASHBOARD_ENDPOINT, get(handle_dashboard))
        .route(LOGS_ENDPOINT, get(handle_recent_logs))
        .route(HEALTHZ_ENDPOINT, get(handle_healthz))
        .with_state(state)
}
