use serde_json::{json, Value};
use somna_partner::PartnerError;
use somna_store::StoreError;
use std::error::Error as _;
use thiserror::Error;

/// Failure of a single dispatched tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing or invalid caller credential")]
    Authentication,
    #[error("{0}")]
    Validation(String),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("partner api request failed with status {status}")]
    Upstream { status: u16, body: Value },
    #[error("malformed partner response: {0}")]
    MalformedResponse(String),
    #[error("partner api transport failure: {0}")]
    Transport(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication_error",
            Self::Validation(_) => "validation_error",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Upstream { .. } => "upstream_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Transport(_) => "transport_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Status recorded in the audit log and surfaced to HTTP callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication => 401,
            Self::Validation(_) => 400,
            Self::UnknownTool(_) => 404,
            Self::Upstream { status, .. } => *status,
            Self::MalformedResponse(_) | Self::Transport(_) | Self::Storage(_) => 500,
        }
    }

    /// Caller-visible request rejection, as opposed to an operational failure.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication | Self::Validation(_) | Self::UnknownTool(_)
        )
    }

    /// Structured form used for audit entries and tool results.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "status": self.status_code(),
        });
        if let Self::Upstream { body, .. } = self {
            payload["upstream_body"] = body.clone();
        }
        let mut causes = Vec::new();
        let mut source = self.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        if !causes.is_empty() {
            payload["causes"] = json!(causes);
        }
        payload
    }
}

impl From<PartnerError> for ToolError {
    fn from(error: PartnerError) -> Self {
        match error {
            PartnerError::InvalidQuery(message) => Self::Validation(message),
            PartnerError::Upstream { status, body } => Self::Upstream { status, body },
            PartnerError::MalformedResponse(message) => Self::MalformedResponse(message),
            PartnerError::Http(error) => Self::Transport(error.to_string()),
            other @ (PartnerError::MissingCredential(_) | PartnerError::InvalidConfig(_)) => {
                Self::Transport(other.to_string())
            }
        }
    }
}

/// Fatal configuration problem detected while building the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatcherConfigError {
    #[error("tool secret is not configured; refusing to serve tool calls")]
    MissingSecret,
    #[error("client id must not be empty")]
    MissingClientId,
}

#[cfg(test)]
mod tests {
    use super::ToolError;
    use serde_json::json;
    use somna_partner::PartnerError;
    use somna_store::StoreError;

    #[test]
    fn status_codes_follow_failure_kind() {
        assert_eq!(ToolError::Authentication.status_code(), 401);
        assert_eq!(ToolError::validation("bad").status_code(), 400);
        assert_eq!(ToolError::UnknownTool("x".to_string()).status_code(), 404);
        let upstream = ToolError::from(PartnerError::Upstream {
            status: 429,
            body: json!({ "error": "slow down" }),
        });
        assert_eq!(upstream.status_code(), 429);
        assert_eq!(
            ToolError::from(PartnerError::MalformedResponse("x".to_string())).status_code(),
            500
        );
    }

    #[test]
    fn payload_carries_upstream_body_and_cause_chain() {
        let upstream = ToolError::Upstream {
            status: 503,
            body: json!("maintenance"),
        };
        let payload = upstream.to_payload();
        assert_eq!(payload["kind"], "upstream_error");
        assert_eq!(payload["status"], 503);
        assert_eq!(payload["upstream_body"], "maintenance");
        assert!(payload.get("causes").is_none());

        let storage = ToolError::from(StoreError::Io(std::io::Error::other("disk full")));
        let payload = storage.to_payload();
        assert_eq!(payload["kind"], "storage_error");
        assert_eq!(payload["status"], 500);
        assert_eq!(payload["causes"][0], "disk full");
    }

    #[test]
    fn invalid_partner_query_is_a_validation_error() {
        let error = ToolError::from(PartnerError::InvalidQuery("too wide".to_string()));
        assert!(matches!(error, ToolError::Validation(message) if message == "too wide"));
    }
}
