//! Names, endpoints and input schemas of the exposed tools.

use serde::Serialize;
use serde_json::{json, Value};

/// Audit endpoint prefix; each tool is logged under `<prefix>/<tool name>`.
pub const TOOL_ENDPOINT_PREFIX: &str = "/api/mcp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    FetchDailyMetrics,
    RefreshAndStoreMetrics,
    ListCachedMetrics,
    GetMetricSummary,
    RefreshRecentMetrics,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::FetchDailyMetrics,
        ToolName::RefreshAndStoreMetrics,
        ToolName::ListCachedMetrics,
        ToolName::GetMetricSummary,
        ToolName::RefreshRecentMetrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchDailyMetrics => "fetch_daily_metrics",
            Self::RefreshAndStoreMetrics => "refresh_and_store_metrics",
            Self::ListCachedMetrics => "list_cached_metrics",
            Self::GetMetricSummary => "get_metric_summary",
            Self::RefreshRecentMetrics => "refresh_recent_metrics",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|tool| tool.as_str() == raw)
    }

    fn description(self) -> &'static str {
        match self {
            Self::FetchDailyMetrics => {
                "Fetch daily metrics live from the partner API without caching them"
            }
            Self::RefreshAndStoreMetrics => {
                "Fetch daily metrics from the partner API and upsert them into the cache"
            }
            Self::ListCachedMetrics => {
                "List cached daily metrics, newest first, with optional date filters"
            }
            Self::GetMetricSummary => "Get the cached sleep summary for a specific date",
            Self::RefreshRecentMetrics => {
                "Refresh the cache for the most recent days, one partner request per day"
            }
        }
    }

    fn input_schema(self) -> Value {
        let iso_date = json!({ "type": "string", "pattern": "^[0-9]{4}-[0-9]{2}-[0-9]{2}$" });
        let subject = json!({ "type": "string", "description": "Optional subject (email) qualifier" });
        match self {
            Self::FetchDailyMetrics | Self::RefreshAndStoreMetrics => json!({
                "type": "object",
                "description": "Provide either date or start_epoch/end_epoch (at most 7 days apart).",
                "properties": {
                    "date": iso_date,
                    "start_epoch": { "type": "integer", "minimum": 0 },
                    "end_epoch": { "type": "integer", "minimum": 0 },
                    "email": subject,
                }
            }),
            Self::ListCachedMetrics => json!({
                "type": "object",
                "properties": {
                    "startDate": iso_date,
                    "endDate": iso_date,
                    "limit": { "type": "integer", "minimum": 1, "maximum": 90, "default": 14 },
                    "email": subject,
                }
            }),
            Self::GetMetricSummary => json!({
                "type": "object",
                "properties": {
                    "date": iso_date,
                    "email": subject,
                },
                "required": ["date"]
            }),
            Self::RefreshRecentMetrics => json!({
                "type": "object",
                "properties": {
                    "days": { "type": "integer", "minimum": 1, "maximum": 7, "default": 1 },
                    "email": subject,
                }
            }),
        }
    }
}

/// Audit endpoint for a tool name, known or not.
pub fn tool_endpoint(tool_name: &str) -> String {
    format!("{TOOL_ENDPOINT_PREFIX}/{}", tool_name.trim())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    ToolName::ALL
        .into_iter()
        .map(|tool| ToolDescriptor {
            name: tool.as_str(),
            description: tool.description(),
            input_schema: tool.input_schema(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{tool_descriptors, tool_endpoint, ToolName};

    #[test]
    fn every_tool_name_round_trips_and_has_object_schema() {
        for descriptor in tool_descriptors() {
            let tool = ToolName::parse(descriptor.name).expect("known tool");
            assert_eq!(tool.as_str(), descriptor.name);
            assert_eq!(descriptor.input_schema["type"], "object");
        }
        assert_eq!(ToolName::parse("delete_everything"), None);
        assert_eq!(
            tool_endpoint("get_metric_summary"),
            "/api/mcp/get_metric_summary"
        );
    }
}
