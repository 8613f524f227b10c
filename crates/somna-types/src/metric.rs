use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subject id used when the upstream response does not name a data owner.
pub const DEFAULT_SUBJECT_ID: &str = "self";

/// Typed per-day metrics derived from the upstream payload.
///
/// Every field is optional: `None` means upstream did not report the field for
/// the date, which is different from a reported zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rem_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restorative_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_bed_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedtime_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedtime_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tosses_and_turns: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movements: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morning_alertness_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_deviation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_body_temp_celsius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_sleep_hrv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_rhr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_rhr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vo2_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metabolic_score: Option<f64>,
}

/// Normalized record for one subject and calendar date, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetric {
    pub subject_id: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub fields: MetricFields,
    /// Unmodified upstream fragment(s) the typed fields were derived from.
    pub raw_payload: Value,
}

impl CanonicalMetric {
    /// Creates a record with no typed fields for `date`.
    pub fn new(subject_id: impl Into<String>, date: NaiveDate, raw_payload: Value) -> Self {
        Self {
            subject_id: subject_id.into(),
            date,
            fields: MetricFields::default(),
            raw_payload,
        }
    }

    pub fn with_fields(mut self, fields: MetricFields) -> Self {
        self.fields = fields;
        self
    }
}

/// Cached record as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetric {
    #[serde(flatten)]
    pub metric: CanonicalMetric,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredMetric {
    pub fn date(&self) -> NaiveDate {
        self.metric.date
    }

    pub fn subject_id(&self) -> &str {
        &self.metric.subject_id
    }

    pub fn fields(&self) -> &MetricFields {
        &self.metric.fields
    }
}
