//! Authenticated, audited entry point for every externally triggered tool call.

use chrono::{Days, Utc};
use serde_json::{json, Value};
use somna_partner::{MetricsQuery, MetricsSource};
use somna_store::{AuditLog, MetricFilter, MetricStore};
use somna_types::{
    format_iso_date, recent_dates, AuditLogEntry, CanonicalMetric, DashboardSnapshot,
    SleepSummary, StoredAuditLogEntry,
};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::SharedSecret;
use crate::validation::{parse_tool_input, ToolInput};
use crate::{tool_endpoint, DispatcherConfigError, ToolError, ToolName};

/// Client id recorded in audit entries when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "mcp";

#[derive(Debug, Clone)]
pub struct ToolDispatcherConfig {
    pub shared_secret: Option<String>,
    pub client_id: String,
}

impl Default for ToolDispatcherConfig {
    fn default() -> Self {
        Self {
            shared_secret: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// One incoming tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub credential: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value, credential: Option<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            credential,
        }
    }
}

/// Result body returned to the caller plus the compact form kept in the audit log.
struct ToolSuccess {
    result: Value,
    audit_payload: Value,
}

/// Composes the partner source, cache and audit log behind one boundary.
///
/// Every call to [`ToolDispatcher::dispatch`] writes exactly one audit entry,
/// whatever the outcome. Checks run in a fixed order: credential, then
/// arguments, then I/O.
pub struct ToolDispatcher {
    source: Arc<dyn MetricsSource>,
    store: Arc<dyn MetricStore>,
    audit_log: Arc<dyn AuditLog>,
    secret: SharedSecret,
    client_id: String,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ToolDispatcher")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    pub fn new(
        config: ToolDispatcherConfig,
        source: Arc<dyn MetricsSource>,
        store: Arc<dyn MetricStore>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Result<Self, DispatcherConfigError> {
        let secret = SharedSecret::from_config(config.shared_secret.as_deref())
            .ok_or(DispatcherConfigError::MissingSecret)?;
        let client_id = config.client_id.trim();
        if client_id.is_empty() {
            return Err(DispatcherConfigError::MissingClientId);
        }
        Ok(Self {
            source,
            store,
            audit_log,
            secret,
            client_id: client_id.to_string(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Checks a caller credential without running or auditing a tool.
    pub fn verify_credential(&self, presented: Option<&str>) -> bool {
        self.secret.verify(presented)
    }

    pub async fn dispatch(&self, call: ToolCall) -> Result<Value, ToolError> {
        let started = Instant::now();
        let outcome = self.run(&call).await;

        let (status_code, response_payload) = match &outcome {
            Ok(success) => (200, success.audit_payload.clone()),
            Err(error) => (error.status_code(), error.to_payload()),
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let tool_name = call.name.trim();
        tracing::info!(
            tool = tool_name,
            status = status_code,
            duration_ms = duration_ms,
            client_id = self.client_id.as_str(),
            "tool call completed"
        );

        self.record_audit(AuditLogEntry {
            endpoint: tool_endpoint(tool_name),
            tool_name: tool_name.to_string(),
            request_payload: request_log_payload(&call.arguments),
            response_payload,
            status_code,
            duration_ms,
            client_id: self.client_id.clone(),
        })
        .await;

        outcome.map(|success| success.result)
    }

    /// Dashboard aggregation over the newest `days` cached dates. Not audited.
    pub async fn dashboard_snapshot(
        &self,
        subject_id: Option<String>,
        days: usize,
    ) -> Result<DashboardSnapshot, ToolError> {
        let newest = self
            .store
            .list_cached(&MetricFilter {
                subject_id: subject_id.clone(),
                limit: 1,
                ..MetricFilter::default()
            })
            .await?;
        let Some(latest) = newest.first().map(|stored| stored.date()) else {
            return Ok(DashboardSnapshot::from_metrics(&[], days));
        };
        // Several subjects can share a date, so bound the window by date.
        let start_date = latest.checked_sub_days(Days::new(days.saturating_sub(1) as u64));
        let rows = self
            .store
            .list_cached(&MetricFilter {
                subject_id,
                start_date,
                end_date: Some(latest),
                limit: usize::MAX,
            })
            .await?;
        Ok(DashboardSnapshot::from_metrics(&rows, days))
    }

    /// Most recent audit entries, newest first. Not audited.
    pub async fn recent_audit_entries(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredAuditLogEntry>, ToolError> {
        Ok(self.audit_log.recent(limit).await?)
    }

    async fn record_audit(&self, entry: AuditLogEntry) {
        if let Err(error) = self.audit_log.append(entry).await {
            tracing::warn!(error = %error, "failed to write tool audit entry");
        }
    }

    async fn run(&self, call: &ToolCall) -> Result<ToolSuccess, ToolError> {
        if !self.secret.verify(call.credential.as_deref()) {
            return Err(ToolError::Authentication);
        }
        let tool =
            ToolName::parse(&call.name).ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        match parse_tool_input(tool, &call.arguments)? {
            ToolInput::FetchDailyMetrics(query) => {
                let metrics = self.source.fetch_daily_metrics(&query).await?;
                Ok(ToolSuccess {
                    audit_payload: json!({ "count": metrics.len() }),
                    result: json!({ "count": metrics.len(), "metrics": metrics }),
                })
            }
            ToolInput::RefreshAndStoreMetrics(query) => {
                let metrics = self.source.fetch_daily_metrics(&query).await?;
                let stored = self.store.upsert_many(&metrics).await?;
                Ok(ToolSuccess {
                    audit_payload: json!({ "stored": stored }),
                    result: json!({ "stored": stored }),
                })
            }
            ToolInput::ListCachedMetrics(filter) => {
                let rows = self.store.list_cached(&filter).await?;
                let summaries = rows
                    .iter()
                    .map(|row| {
                        json!({
                            "date": format_iso_date(row.date()),
                            "summary": SleepSummary::from(row),
                        })
                    })
                    .collect::<Vec<_>>();
                Ok(ToolSuccess {
                    audit_payload: json!({ "count": rows.len() }),
                    result: json!({
                        "count": rows.len(),
                        "metrics": rows,
                        "summaries": summaries,
                    }),
                })
            }
            ToolInput::GetMetricSummary { date, subject } => {
                let date_label = format_iso_date(date);
                let result = match self.store.find_by_date(subject.as_deref(), date).await? {
                    Some(record) => json!({
                        "found": true,
                        "date": date_label,
                        "summary": SleepSummary::from(&record),
                        "metric": record,
                    }),
                    None => json!({ "found": false, "date": date_label }),
                };
                Ok(ToolSuccess {
                    audit_payload: json!({ "found": result["found"] }),
                    result,
                })
            }
            ToolInput::RefreshRecentMetrics { days, subject } => {
                let dates = recent_dates(days, Utc::now().date_naive());
                let mut metrics: Vec<CanonicalMetric> = Vec::new();
                for date in &dates {
                    let query = MetricsQuery::for_date(*date);
                    let query = match subject.as_deref() {
                        Some(subject) => query.with_subject(subject),
                        None => query,
                    };
                    metrics.extend(self.source.fetch_daily_metrics(&query).await?);
                }
                let stored = self.store.upsert_many(&metrics).await?;
                let dates = dates.into_iter().map(format_iso_date).collect::<Vec<_>>();
                Ok(ToolSuccess {
                    audit_payload: json!({ "stored": stored }),
                    result: json!({ "stored": stored, "dates": dates }),
                })
            }
        }
    }
}

fn request_log_payload(arguments: &Value) -> Value {
    match arguments {
        Value::Object(_) => arguments.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    }
}
