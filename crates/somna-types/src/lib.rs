//! Shared data types for sleep and recovery telemetry ingestion.

mod audit;
mod dashboard;
pub mod dates;
mod metric;
mod summary;

pub use audit::{AuditLogEntry, StoredAuditLogEntry};
pub use dashboard::{DashboardAverages, DashboardSnapshot, SleepSeriesPoint, DEFAULT_LOOKBACK_DAYS};
pub use dates::{date_only, format_iso_date, parse_iso_date, recent_dates, DateParseError};
pub use metric::{CanonicalMetric, MetricFields, StoredMetric, DEFAULT_SUBJECT_ID};
pub use summary::{project_summary, SleepSummary};
