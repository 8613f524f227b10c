//! Authenticated read-only call-throughs. These bypass the audit log.
use super::*;
use somna_tools::DEFAULT_AUDIT_LIMIT;
use somna_types::DEFAULT_LOOKBACK_DAYS;

#[derive(Debug, Default, Deserialize)]
pub(super) struct GatewayDashboardQuery {
    #[serde(default)]
    days: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct GatewayLogsQuery {
    #[serde(default)]
    limit: Option<String>,
}

pub(super) async fn handle_healthz() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub(super) async fn handle_dashboard(
    State(state): State<GatewayServerState>,
    headers: HeaderMap,
    Query(query): Query<GatewayDashboardQuery>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let days = match parse_bounded_usize(
        query.days.as_deref(),
        "invalid_dashboard_days",
        "days",
        DEFAULT_LOOKBACK_DAYS,
        DASHBOARD_MAX_DAYS,
    ) {
        Ok(days) => days,
        Err(error) => return error.into_response(),
    };
    let subject = query
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    match state.dispatcher.dashboard_snapshot(subject, days).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(error) => {
            tracing::error!(error = %error, "failed to build dashboard snapshot");
            GatewayApiError::internal(error.to_string()).into_response()
        }
    }
}

pub(super) async fn handle_recent_logs(
    State(state): State<GatewayServerState>,
    headers: HeaderMap,
    Query(query): Query<GatewayLogsQuery>,
) -> Response {
    if let Err(error) = authorize_gateway_request(&state, &headers) {
        return error.into_response();
    }
    let limit = match parse_bounded_usize(
        query.limit.as_deref(),
        "invalid_logs_limit",
        "limit",
        DEFAULT_AUDIT_LIMIT,
        LOGS_MAX_LIMIT,
    ) {
        Ok(limit) => limit,
        Err(error) => return error.into_response(),
    };

    match state.dispatcher.recent_audit_entries(limit).await {
        Ok(entries) => Json(json!({ "count": entries.len(), "entries": entries })).into_response(),
        Err(error) => {
            tracing::error!(error = %error, "failed to read audit log");
            GatewayApiError::internal(error.to_string()).into_response()
        }
    }
}

fn parse_bounded_usize(
    raw: Option<&str>,
    code: &'static str,
    field: &str,
    default: usize,
    max: usize,
) -> Result<usize, GatewayApiError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(default);
    };
    raw.parse::<usize>()
        .ok()
        .filter(|value| (1..=max).contains(value))
        .ok_or_else(|| {
            GatewayApiError::bad_request(code, format!("{field} must be between 1 and {max}"))
        })
}
