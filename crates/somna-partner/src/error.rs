use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
/// Failures raised while querying the partner API or decoding its response.
pub enum PartnerError {
    #[error("missing partner credential: {0}")]
    MissingCredential(&'static str),
    #[error("invalid partner configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid metrics query: {0}")]
    InvalidQuery(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("partner api request failed with status {status}")]
    Upstream { status: u16, body: Value },
    #[error("malformed partner response: {0}")]
    MalformedResponse(String),
}

impl PartnerError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// HTTP status carried by an upstream rejection.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
