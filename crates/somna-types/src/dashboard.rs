//! Aggregated trend view over a window of cached records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{SleepSummary, StoredMetric};

pub const DEFAULT_LOOKBACK_DAYS: usize = 14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSeriesPoint {
    pub date: NaiveDate,
    pub total_sleep_hours: f64,
    pub deep_sleep_hours: f64,
    pub readiness_score: Option<f64>,
    pub hrv: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAverages {
    pub avg_sleep_hours: f64,
    pub avg_deep_sleep_hours: f64,
    pub avg_readiness: Option<f64>,
    pub avg_hrv: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub series: Vec<SleepSeriesPoint>,
    pub summary: DashboardAverages,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_summary: Option<SleepSummary>,
}

impl DashboardSnapshot {
    /// Builds the snapshot from cached records in any order, keeping the
    /// newest `days` dates. A date cached for several subjects contributes
    /// the record with the lowest subject id.
    pub fn from_metrics(metrics: &[StoredMetric], days: usize) -> Self {
        let mut ordered = metrics.iter().collect::<Vec<_>>();
        ordered.sort_by(|left, right| {
            left.date()
                .cmp(&right.date())
                .then_with(|| left.subject_id().cmp(right.subject_id()))
        });
        ordered.dedup_by_key(|stored| stored.date());
        let skip = ordered.len().saturating_sub(days);
        let ordered = &ordered[skip..];

        let series = ordered
            .iter()
            .map(|stored| {
                let fields = stored.fields();
                SleepSeriesPoint {
                    date: stored.date(),
                    total_sleep_hours: minutes_to_hours(fields.total_sleep_minutes),
                    deep_sleep_hours: minutes_to_hours(fields.deep_sleep_minutes),
                    readiness_score: fields.readiness_score,
                    hrv: fields.avg_sleep_hrv,
                }
            })
            .collect::<Vec<_>>();

        Self {
            summary: compute_averages(&series),
            latest_summary: ordered.last().map(|stored| SleepSummary::from(*stored)),
            series,
        }
    }
}

#[derive(Default)]
struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| round_tenth(self.sum / self.count as f64))
    }
}

fn compute_averages(series: &[SleepSeriesPoint]) -> DashboardAverages {
    let mut sleep = RunningMean::default();
    let mut deep = RunningMean::default();
    let mut readiness = RunningMean::default();
    let mut hrv = RunningMean::default();

    for point in series {
        // Zero hours means the night was not tracked.
        if point.total_sleep_hours > 0.0 {
            sleep.push(point.total_sleep_hours);
        }
        if point.deep_sleep_hours > 0.0 {
            deep.push(point.deep_sleep_hours);
        }
        if let Some(value) = point.readiness_score {
            readiness.push(value);
        }
        if let Some(value) = point.hrv {
            hrv.push(value);
        }
    }

    DashboardAverages {
        avg_sleep_hours: sleep.mean().unwrap_or(0.0),
        avg_deep_sleep_hours: deep.mean().unwrap_or(0.0),
        avg_readiness: readiness.mean(),
        avg_hrv: hrv.mean(),
    }
}

fn minutes_to_hours(minutes: Option<i64>) -> f64 {
    match minutes {
        Some(value) if value != 0 => round_tenth(value as f64 / 60.0),
        _ => 0.0,
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
