//! Tool argument validation. Runs before any network or storage access.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use somna_partner::MetricsQuery;
use somna_store::{MetricFilter, DEFAULT_LIST_LIMIT};
use somna_types::parse_iso_date;

use crate::{ToolError, ToolName};

pub const MAX_LIST_LIMIT: usize = 90;
pub const MAX_REFRESH_DAYS: usize = 7;
pub const DEFAULT_REFRESH_DAYS: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ToolInput {
    FetchDailyMetrics(MetricsQuery),
    RefreshAndStoreMetrics(MetricsQuery),
    ListCachedMetrics(MetricFilter),
    GetMetricSummary {
        date: NaiveDate,
        subject: Option<String>,
    },
    RefreshRecentMetrics {
        days: usize,
        subject: Option<String>,
    },
}

pub(crate) fn parse_tool_input(tool: ToolName, arguments: &Value) -> Result<ToolInput, ToolError> {
    let empty = Map::new();
    let arguments = match arguments {
        Value::Object(arguments) => arguments,
        Value::Null => &empty,
        _ => return Err(ToolError::validation("tool arguments must be an object")),
    };
    let subject = optional_string(arguments, "email")?;

    match tool {
        ToolName::FetchDailyMetrics => Ok(ToolInput::FetchDailyMetrics(metrics_query(
            arguments, subject,
        )?)),
        ToolName::RefreshAndStoreMetrics => Ok(ToolInput::RefreshAndStoreMetrics(
            metrics_query(arguments, subject)?,
        )),
        ToolName::ListCachedMetrics => {
            let start_date = optional_date(arguments, "startDate")?;
            let end_date = optional_date(arguments, "endDate")?;
            if let (Some(start), Some(end)) = (start_date, end_date) {
                if start > end {
                    return Err(ToolError::validation("startDate must be <= endDate"));
                }
            }
            let limit = bounded_count(arguments, "limit", DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)?;
            Ok(ToolInput::ListCachedMetrics(MetricFilter {
                subject_id: subject,
                start_date,
                end_date,
                limit,
            }))
        }
        ToolName::GetMetricSummary => {
            let date = optional_date(arguments, "date")?
                .ok_or_else(|| ToolError::validation("date is required"))?;
            Ok(ToolInput::GetMetricSummary { date, subject })
        }
        ToolName::RefreshRecentMetrics => Ok(ToolInput::RefreshRecentMetrics {
            days: bounded_count(arguments, "days", DEFAULT_REFRESH_DAYS, MAX_REFRESH_DAYS)?,
            subject,
        }),
    }
}

fn metrics_query(
    arguments: &Map<String, Value>,
    subject: Option<String>,
) -> Result<MetricsQuery, ToolError> {
    let date = optional_date(arguments, "date")?;
    let start_epoch = optional_integer(arguments, "start_epoch")?;
    let end_epoch = optional_integer(arguments, "end_epoch")?;
    let query = match (date, start_epoch, end_epoch) {
        (Some(date), None, None) => MetricsQuery::for_date(date),
        (None, Some(start_epoch), Some(end_epoch)) => {
            MetricsQuery::epoch_range(start_epoch, end_epoch)?
        }
        (None, Some(_), None) | (None, None, Some(_)) => {
            return Err(ToolError::validation(
                "start_epoch and end_epoch must be provided together",
            ))
        }
        _ => {
            return Err(ToolError::validation(
                "provide either date or epoch range (start_epoch and end_epoch)",
            ))
        }
    };
    Ok(match subject {
        Some(subject) => query.with_subject(subject),
        None => query,
    })
}

fn bounded_count(
    arguments: &Map<String, Value>,
    field: &str,
    default: usize,
    max: usize,
) -> Result<usize, ToolError> {
    let Some(value) = optional_integer(arguments, field)? else {
        return Ok(default);
    };
    usize::try_from(value)
        .ok()
        .filter(|count| (1..=max).contains(count))
        .ok_or_else(|| ToolError::validation(format!("{field} must be between 1 and {max}")))
}

fn optional_date(
    arguments: &Map<String, Value>,
    field: &str,
) -> Result<Option<NaiveDate>, ToolError> {
    match arguments.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => parse_iso_date(raw)
            .map(Some)
            .map_err(|error| ToolError::validation(format!("{field}: {error}"))),
        Some(_) => Err(ToolError::validation(format!(
            "{field} must be a YYYY-MM-DD string"
        ))),
    }
}

fn optional_integer(
    arguments: &Map<String, Value>,
    field: &str,
) -> Result<Option<i64>, ToolError> {
    match arguments.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolError::validation(format!("{field} must be an integer"))),
        Some(_) => Err(ToolError::validation(format!("{field} must be an integer"))),
    }
}

fn optional_string(
    arguments: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, ToolError> {
    match arguments.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(_) => Err(ToolError::validation(format!("{field} must be a string"))),
    }
}
