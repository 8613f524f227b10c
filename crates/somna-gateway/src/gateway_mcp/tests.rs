//! Gateway route tests against an ephemeral listener.
use super::*;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use somna_partner::{MetricsQuery, MetricsSource, MetricsWindow, PartnerError};
use somna_store::InMemoryMetricStore;
use somna_tools::ToolDispatcherConfig;
use somna_types::{CanonicalMetric, MetricFields};
use std::time::Duration;

const SECRET: &str = "gateway-secret";

struct FixedSource;

#[async_trait]
impl MetricsSource for FixedSource {
    async fn fetch_daily_metrics(
        &self,
        query: &MetricsQuery,
    ) -> Result<Vec<CanonicalMetric>, PartnerError> {
        let MetricsWindow::Date(date) = query.window() else {
            return Ok(Vec::new());
        };
        Ok(vec![CanonicalMetric::new(
            "self",
            date,
            serde_json::json!({ "date": date.to_string() }),
        )
        .with_fields(MetricFields {
            total_sleep_minutes: Some(450),
            readiness_score: Some(80.0),
            ..MetricFields::default()
        })])
    }
}

fn test_state() -> GatewayServerState {
    let store = Arc::new(InMemoryMetricStore::new());
    let dispatcher = ToolDispatcher::new(
        ToolDispatcherConfig {
            shared_secret: Some(SECRET.to_string()),
            client_id: "gateway-test".to_string(),
        },
        Arc::new(FixedSource),
        store.clone(),
        store,
    )
    .expect("dispatcher");
    GatewayServerState::new(Arc::new(dispatcher))
}

async fn spawn_test_server(
    state: GatewayServerState,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let app = build_gateway_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((addr, handle))
}

fn rpc(id: i64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

#[tokio::test]
async fn healthz_is_public() {
    let (addr, handle) = spawn_test_server(test_state()).await.expect("spawn server");
    let response = Client::new()
        .get(format!("http://{addr}{HEALTHZ_ENDPOINT}"))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
    handle.abort();
}

#[tokio::test]
async fn mcp_endpoint_rejects_missing_bearer_with_401() {
    let (addr, handle) = spawn_test_server(test_state()).await.expect("spawn server");
    let response = Client::new()
        .post(format!("http://{addr}{MCP_ENDPOINT}"))
        .json(&rpc(
            1,
            "tools/call",
            json!({ "name": "list_cached_metrics", "arguments": {} }),
        ))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response.json::<Value>().await.expect("json body");
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["id"], 1);

    let logs = Client::new()
        .get(format!("http://{addr}{LOGS_ENDPOINT}"))
        .bearer_auth(SECRET)
        .send()
        .await
        .expect("send request")
        .json::<Value>()
        .await
        .expect("json body");
    assert_eq!(logs["count"], 1);
    assert_eq!(logs["entries"][0]["status_code"], 401);
    handle.abort();
}

#[tokio::test]
async fn mcp_endpoint_rejects_unauthenticated_requests_before_routing() {
    let (addr, handle) = spawn_test_server(test_state()).await.expect("spawn server");
    let client = Client::new();

    let response = client
        .post(format!("http://{addr}{MCP_ENDPOINT}"))
        .json(&rpc(3, "tools/call", json!({})))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response.json::<Value>().await.expect("json body");
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["id"], 3);

    let response = client
        .post(format!("http://{addr}{MCP_ENDPOINT}"))
        .bearer_auth("wrong")
        .json(&rpc(4, "resources/list", json!({})))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response.json::<Value>().await.expect("json body");
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["id"], 4);
    handle.abort();
}

#[tokio::test]
async fn mcp_tools_call_refreshes_and_dashboard_reads_cache() {
    let (addr, handle) = spawn_test_server(test_state()).await.expect("spawn server");
    let client = Client::new();

    let response = client
        .post(format!("http://{addr}{MCP_ENDPOINT}"))
        .bearer_auth(SECRET)
        .json(&rpc(
            7,
            "tools/call",
            json!({ "name": "refresh_recent_metrics", "arguments": { "days": 3 } }),
        ))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.json::<Value>().await.expect("json body");
    assert_eq!(body["result"]["isError"], false);
    assert_eq!(body["result"]["structuredContent"]["stored"], 3);

    let snapshot = client
        .get(format!("http://{addr}{DASHBOARD_ENDPOINT}?days=2"))
        .bearer_auth(SECRET)
        .send()
        .await
        .expect("send request")
        .json::<Value>()
        .await
        .expect("json body");
    let series = snapshot["series"].as_array().expect("series");
    assert_eq!(series.len(), 2);
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    assert_eq!(series[1]["date"], today);
    assert_eq!(snapshot["summary"]["avgSleepHours"], 7.5);
    assert_eq!(snapshot["summary"]["avgReadiness"], 80.0);
    handle.abort();
}

#[tokio::test]
async fn mcp_validation_failure_is_invalid_params() {
    let (addr, handle) = spawn_test_server(test_state()).await.expect("spawn server");
    let body = Client::new()
        .post(format!("http://{addr}{MCP_ENDPOINT}"))
        .bearer_auth(SECRET)
        .json(&rpc(
            2,
            "tools/call",
            json!({ "name": "list_cached_metrics", "arguments": { "limit": 91 } }),
        ))
        .send()
        .await
        .expect("send request")
        .json::<Value>()
        .await
        .expect("json body");
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(body["error"]["data"]["status"], 400);
    handle.abort();
}

#[tokio::test]
async fn mcp_endpoint_handles_parse_errors_and_notifications() {
    let (addr, handle) = spawn_test_server(test_state()).await.expect("spawn server");
    let client = Client::new();

    let response = client
        .post(format!("http://{addr}{MCP_ENDPOINT}"))
        .bearer_auth(SECRET)
        .body("{not json")
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>().await.expect("json body");
    assert_eq!(body["error"]["code"], -32700);

    let response = client
        .post(format!("http://{addr}{MCP_ENDPOINT}"))
        .bearer_auth(SECRET)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    handle.abort();
}

#[tokio::test]
async fn read_routes_validate_bounds_and_credentials() {
    let (addr, handle) = spawn_test_server(test_state()).await.expect("spawn server");
    let client = Client::new();

    let response = client
        .get(format!("http://{addr}{DASHBOARD_ENDPOINT}"))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for query in ["days=0", "days=91", "days=abc"] {
        let response = client
            .get(format!("http://{addr}{DASHBOARD_ENDPOINT}?{query}"))
            .bearer_auth(SECRET)
            .send()
            .await
            .expect("send request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{query}");
    }

    let response = client
        .get(format!("http://{addr}{LOGS_ENDPOINT}?limit=201"))
        .bearer_auth(SECRET)
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>().await.expect("json body");
    assert_eq!(body["error"]["code"], "invalid_logs_limit");
    handle.abort();
}
