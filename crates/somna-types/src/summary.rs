//! Compact sleep summary projected from a canonical record.

use serde::{Deserialize, Serialize};

use crate::{CanonicalMetric, MetricFields, StoredMetric};

/// Fixed-shape subset of [`MetricFields`] used by dashboards and tool results.
///
/// Never persisted; always recomputed from the record it summarizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rem_sleep_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_sleep_hrv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_score: Option<i64>,
}

impl SleepSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub fn project_summary(fields: &MetricFields) -> SleepSummary {
    SleepSummary {
        total_sleep_minutes: fields.total_sleep_minutes,
        deep_sleep_minutes: fields.deep_sleep_minutes,
        rem_sleep_minutes: fields.rem_sleep_minutes,
        readiness_score: fields.readiness_score,
        avg_sleep_hrv: fields.avg_sleep_hrv,
        sleep_score: fields.sleep_score,
    }
}

impl From<&MetricFields> for SleepSummary {
    fn from(fields: &MetricFields) -> Self {
        project_summary(fields)
    }
}

impl From<&CanonicalMetric> for SleepSummary {
    fn from(metric: &CanonicalMetric) -> Self {
        project_summary(&metric.fields)
    }
}

impl From<&StoredMetric> for SleepSummary {
    fn from(stored: &StoredMetric) -> Self {
        project_summary(&stored.metric.fields)
    }
}
