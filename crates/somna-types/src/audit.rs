use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One externally triggered operation, ready to be appended to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub endpoint: String,
    pub tool_name: String,
    pub request_payload: Value,
    pub response_payload: Value,
    pub status_code: u16,
    pub duration_ms: u64,
    pub client_id: String,
}

/// Audit entry after it has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAuditLogEntry {
    pub id: i64,
    #[serde(flatten)]
    pub entry: AuditLogEntry,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
