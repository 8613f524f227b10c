//! Metric cache and audit log abstractions with in-memory backend.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;

pub use sqlite::SqliteMetricStore;
pub use somna_types::{AuditLogEntry, CanonicalMetric, StoredAuditLogEntry, StoredMetric};

/// Default row count for cached metric listings.
pub const DEFAULT_LIST_LIMIT: usize = 14;
/// Default row count for recent audit entries.
pub const DEFAULT_AUDIT_LIMIT: usize = 40;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid record for {date}: {reason}")]
    InvalidRecord { date: NaiveDate, reason: String },
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filters for [`MetricStore::list_cached`]. Date bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFilter {
    pub subject_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: usize,
}

impl Default for MetricFilter {
    fn default() -> Self {
        Self {
            subject_id: None,
            start_date: None,
            end_date: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl MetricFilter {
    fn matches(&self, metric: &CanonicalMetric) -> bool {
        self.subject_id
            .as_deref()
            .map_or(true, |subject| subject == metric.subject_id)
            && self.start_date.map_or(true, |start| metric.date >= start)
            && self.end_date.map_or(true, |end| metric.date <= end)
    }
}

/// Idempotent cache of canonical metrics keyed by (subject, date).
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Inserts or fully replaces each record, returning how many were written.
    ///
    /// Every record is validated before the first write; an empty batch
    /// returns 0 without touching storage.
    async fn upsert_many(&self, records: &[CanonicalMetric]) -> StoreResult<usize>;

    /// Returns records newest date first, then by subject, truncated to
    /// `filter.limit`.
    async fn list_cached(&self, filter: &MetricFilter) -> StoreResult<Vec<StoredMetric>>;

    /// Exact (subject, date) lookup. Without a subject, returns the record
    /// with the lowest subject id for that date.
    async fn find_by_date(
        &self,
        subject_id: Option<&str>,
        date: NaiveDate,
    ) -> StoreResult<Option<StoredMetric>>;
}

/// Append-only log of externally triggered operations.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> StoreResult<StoredAuditLogEntry>;
    /// Newest entries first.
    async fn recent(&self, limit: usize) -> StoreResult<Vec<StoredAuditLogEntry>>;
}

/// Checks a batch before any of it is written.
pub fn validate_records(records: &[CanonicalMetric]) -> StoreResult<()> {
    for record in records {
        if record.subject_id.trim().is_empty() {
            return Err(StoreError::InvalidRecord {
                date: record.date,
                reason: "subject id must not be empty".to_string(),
            });
        }
        if !matches!(record.raw_payload, Value::Object(_) | Value::Array(_)) {
            return Err(StoreError::InvalidRecord {
                date: record.date,
                reason: "raw payload must be a JSON object or array".to_string(),
            });
        }
    }
    Ok(())
}

fn sort_newest_first(rows: &mut [StoredMetric]) {
    rows.sort_by(|left, right| {
        right
            .date()
            .cmp(&left.date())
            .then_with(|| left.subject_id().cmp(right.subject_id()))
    });
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    metrics: BTreeMap<(String, NaiveDate), StoredMetric>,
    audit_log: Vec<StoredAuditLogEntry>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn upsert_many(&self, records: &[CanonicalMetric]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        validate_records(records)?;

        let now = Utc::now();
        let mut inner = self.inner.write().await;
        for record in records {
            inner
                .metrics
                .entry((record.subject_id.clone(), record.date))
                .and_modify(|existing| {
                    existing.metric = record.clone();
                    existing.updated_at = existing.updated_at.max(now);
                })
                .or_insert_with(|| StoredMetric {
                    metric: record.clone(),
                    created_at: now,
                    updated_at: now,
                });
        }
        Ok(records.len())
    }

    async fn list_cached(&self, filter: &MetricFilter) -> StoreResult<Vec<StoredMetric>> {
        let inner = self.inner.read().await;
        let mut rows = inner
            .metrics
            .values()
            .filter(|stored| filter.matches(&stored.metric))
            .cloned()
            .collect::<Vec<_>>();
        sort_newest_first(&mut rows);
        rows.truncate(filter.limit);
        Ok(rows)
    }

    async fn find_by_date(
        &self,
        subject_id: Option<&str>,
        date: NaiveDate,
    ) -> StoreResult<Option<StoredMetric>> {
        let inner = self.inner.read().await;
        // Map keys sort by subject first, so the first hit has the lowest id.
        Ok(inner
            .metrics
            .values()
            .find(|stored| {
                stored.date() == date && subject_id.map_or(true, |id| id == stored.subject_id())
            })
            .cloned())
    }
}

#[async_trait]
impl AuditLog for InMemoryMetricStore {
    async fn append(&self, entry: AuditLogEntry) -> StoreResult<StoredAuditLogEntry> {
        let mut inner = self.inner.write().await;
        let stored = StoredAuditLogEntry {
            id: inner.audit_log.len() as i64 + 1,
            entry,
            created_at: Utc::now(),
        };
        inner.audit_log.push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<StoredAuditLogEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.audit_log.iter().rev().take(limit).cloned().collect())
    }
}
