use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::{json, Value};
use somna_partner::{PartnerClient, PartnerConfig};
use somna_store::{AuditLog, MetricFilter, MetricStore, SqliteMetricStore};
use somna_tools::{ToolCall, ToolDispatcher, ToolDispatcherConfig, ToolError};
use tempfile::tempdir;

const SECRET: &str = "integration-secret";

fn dispatcher_for(server: &MockServer, store: Arc<SqliteMetricStore>) -> ToolDispatcher {
    let client = PartnerClient::new(PartnerConfig {
        api_base: format!("{}/partner", server.base_url()),
        api_token: "token".to_string(),
        access_code: "code".to_string(),
        request_timeout_ms: 5_000,
    })
    .expect("partner client");
    ToolDispatcher::new(
        ToolDispatcherConfig {
            shared_secret: Some(SECRET.to_string()),
            client_id: "integration".to_string(),
        },
        Arc::new(client),
        store.clone(),
        store,
    )
    .expect("dispatcher")
}

fn call(name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(name, arguments, Some(SECRET.to_string()))
}

fn fragment_body(total_sleep: i64, hrv: f64) -> Value {
    json!({
        "data": { "metrics": { "2025-11-22": [
            { "type": "avg_sleep_hrv", "object": { "value": hrv } },
            { "type": "sleep", "object": {
                "sleep_score": { "score": 84 },
                "total_sleep": { "minutes": total_sleep },
                "deep_sleep": { "minutes": 95 },
                "bedtime_start": 1763763000
            } },
            { "type": "steps", "object": { "total": 9000 } }
        ] } }
    })
}

#[tokio::test]
async fn refresh_twice_then_read_back_through_every_tool() {
    let workspace = tempdir().expect("tempdir");
    let db_path = workspace.path().join("state").join("somna.sqlite");
    let server = MockServer::start();
    let store = Arc::new(SqliteMetricStore::new(&db_path).expect("store"));
    let dispatcher = dispatcher_for(&server, store.clone());

    let mut first = server.mock(|when, then| {
        when.method(GET)
            .path("/partner/daily_metrics")
            .query_param("date", "2025-11-22");
        then.status(200).json_body(fragment_body(410, 48.5));
    });
    let refreshed = dispatcher
        .dispatch(call(
            "refresh_and_store_metrics",
            json!({ "date": "2025-11-22" }),
        ))
        .await
        .expect("first refresh");
    assert_eq!(refreshed, json!({ "stored": 1 }));
    first.assert();
    first.delete();

    server.mock(|when, then| {
        when.method(GET)
            .path("/partner/daily_metrics")
            .query_param("date", "2025-11-22");
        then.status(200).json_body(fragment_body(432, 51.0));
    });
    dispatcher
        .dispatch(call(
            "refresh_and_store_metrics",
            json!({ "date": "2025-11-22" }),
        ))
        .await
        .expect("second refresh");

    // Reopen from disk to read what was persisted.
    let reopened = SqliteMetricStore::new(&db_path).expect("reopen store");
    let rows = reopened
        .list_cached(&MetricFilter::default())
        .await
        .expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields().total_sleep_minutes, Some(432));
    assert_eq!(rows[0].fields().avg_sleep_hrv, Some(51.0));

    let summary = dispatcher
        .dispatch(call("get_metric_summary", json!({ "date": "2025-11-22" })))
        .await
        .expect("summary");
    assert_eq!(summary["found"], true);
    assert_eq!(summary["summary"]["sleepScore"], 84);
    assert_eq!(summary["summary"]["totalSleepMinutes"], 432);
    assert_eq!(summary["summary"]["avgSleepHrv"], 51.0);
    assert_eq!(summary["metric"]["raw_payload"][2]["type"], "steps");

    let listed = dispatcher
        .dispatch(call(
            "list_cached_metrics",
            json!({ "startDate": "2025-11-01", "endDate": "2025-11-30" }),
        ))
        .await
        .expect("list tool");
    assert_eq!(listed["count"], 1);

    let audit = reopened.recent(10).await.expect("audit");
    let tools = audit
        .iter()
        .map(|row| (row.entry.tool_name.as_str(), row.entry.status_code))
        .collect::<Vec<_>>();
    assert_eq!(
        tools,
        vec![
            ("list_cached_metrics", 200),
            ("get_metric_summary", 200),
            ("refresh_and_store_metrics", 200),
            ("refresh_and_store_metrics", 200),
        ]
    );
    assert!(audit.iter().all(|row| row.entry.client_id == "integration"));
}

#[tokio::test]
async fn upstream_rejection_is_audited_and_leaves_cache_untouched() {
    let workspace = tempdir().expect("tempdir");
    let server = MockServer::start();
    let store =
        Arc::new(SqliteMetricStore::new(workspace.path().join("somna.sqlite")).expect("store"));
    let dispatcher = dispatcher_for(&server, store.clone());

    server.mock(|when, then| {
        when.method(GET).path("/partner/daily_metrics");
        then.status(401).json_body(json!({ "error": "invalid access code" }));
    });

    let error = dispatcher
        .dispatch(call(
            "refresh_and_store_metrics",
            json!({ "date": "2025-11-22" }),
        ))
        .await
        .expect_err("upstream rejection");
    assert!(matches!(error, ToolError::Upstream { status: 401, .. }));

    assert!(store
        .list_cached(&MetricFilter::default())
        .await
        .expect("list")
        .is_empty());
    let audit = store.recent(1).await.expect("audit");
    assert_eq!(audit[0].entry.status_code, 401);
    assert_eq!(
        audit[0].entry.response_payload["upstream_body"]["error"],
        "invalid access code"
    );
    assert_eq!(audit[0].entry.request_payload, json!({ "date": "2025-11-22" }));
}

#[tokio::test]
async fn malformed_upstream_body_maps_to_server_error() {
    let workspace = tempdir().expect("tempdir");
    let server = MockServer::start();
    let store =
        Arc::new(SqliteMetricStore::new(workspace.path().join("somna.sqlite")).expect("store"));
    let dispatcher = dispatcher_for(&server, store.clone());

    server.mock(|when, then| {
        when.method(GET).path("/partner/daily_metrics");
        then.status(200)
            .json_body(json!([{ "date": "2025-11-22", "total_sleep": "long" }]));
    });

    let error = dispatcher
        .dispatch(call("fetch_daily_metrics", json!({ "date": "2025-11-22" })))
        .await
        .expect_err("malformed body");
    assert_eq!(error.status_code(), 500);
    assert_eq!(error.kind(), "malformed_response");
    assert_eq!(store.recent(1).await.expect("audit")[0].entry.status_code, 500);
}
