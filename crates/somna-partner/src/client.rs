use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use somna_types::{format_iso_date, parse_iso_date, CanonicalMetric, DEFAULT_SUBJECT_ID};

use crate::{normalize_daily_metrics, PartnerError};

pub const DEFAULT_PARTNER_API_BASE: &str = "https://partner.ultrahuman.com/api/v1/partner";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
/// Widest epoch window the partner API serves in one request.
pub const MAX_EPOCH_RANGE_SECONDS: i64 = 7 * 24 * 60 * 60;

const ACCESS_CODE_HEADER: &str = "x-access-code";

#[derive(Debug, Clone)]
/// Connection settings for the partner API.
pub struct PartnerConfig {
    pub api_base: String,
    pub api_token: String,
    pub access_code: String,
    pub request_timeout_ms: u64,
}

impl Default for PartnerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_PARTNER_API_BASE.to_string(),
            api_token: String::new(),
            access_code: String::new(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsWindow {
    Date(NaiveDate),
    EpochRange { start_epoch: i64, end_epoch: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A validated request for daily metrics.
pub struct MetricsQuery {
    window: MetricsWindow,
    subject: Option<String>,
}

impl MetricsQuery {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            window: MetricsWindow::Date(date),
            subject: None,
        }
    }

    pub fn parse_date(raw: &str) -> Result<Self, PartnerError> {
        let date =
            parse_iso_date(raw).map_err(|error| PartnerError::InvalidQuery(error.to_string()))?;
        Ok(Self::for_date(date))
    }

    /// Builds an epoch-seconds window; `end_epoch` must be after `start_epoch`
    /// and the span at most seven days.
    pub fn epoch_range(start_epoch: i64, end_epoch: i64) -> Result<Self, PartnerError> {
        if start_epoch < 0 {
            return Err(PartnerError::InvalidQuery(
                "start_epoch must not be negative".to_string(),
            ));
        }
        if end_epoch <= start_epoch {
            return Err(PartnerError::InvalidQuery(
                "end_epoch must be greater than start_epoch".to_string(),
            ));
        }
        if end_epoch - start_epoch > MAX_EPOCH_RANGE_SECONDS {
            return Err(PartnerError::InvalidQuery(
                "epoch range must not exceed 7 days".to_string(),
            ));
        }
        Ok(Self {
            window: MetricsWindow::EpochRange {
                start_epoch,
                end_epoch,
            },
            subject: None,
        })
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        let trimmed = subject.trim();
        self.subject = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn window(&self) -> MetricsWindow {
        self.window
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = match self.window {
            MetricsWindow::Date(date) => vec![("date", format_iso_date(date))],
            MetricsWindow::EpochRange {
                start_epoch,
                end_epoch,
            } => vec![
                ("start_epoch", start_epoch.to_string()),
                ("end_epoch", end_epoch.to_string()),
            ],
        };
        if let Some(subject) = self.subject.as_deref() {
            pairs.push(("email", subject.to_string()));
        }
        pairs
    }
}

#[async_trait]
/// Source of normalized daily metrics.
pub trait MetricsSource: Send + Sync {
    async fn fetch_daily_metrics(
        &self,
        query: &MetricsQuery,
    ) -> Result<Vec<CanonicalMetric>, PartnerError>;
}

#[derive(Debug, Clone)]
/// HTTP client for the partner daily metrics endpoint.
pub struct PartnerClient {
    http: reqwest::Client,
    api_base: String,
}

impl PartnerClient {
    pub fn new(config: PartnerConfig) -> Result<Self, PartnerError> {
        let token = config.api_token.trim();
        if token.is_empty() {
            return Err(PartnerError::MissingCredential("api token"));
        }
        let access_code = config.access_code.trim();
        if access_code.is_empty() {
            return Err(PartnerError::MissingCredential("access code"));
        }
        let api_base = config.api_base.trim().trim_end_matches('/');
        if api_base.is_empty() {
            return Err(PartnerError::InvalidConfig(
                "api base url must not be empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|error| {
                PartnerError::InvalidConfig(format!("invalid api token header: {error}"))
            })?,
        );
        headers.insert(
            ACCESS_CODE_HEADER,
            HeaderValue::from_str(access_code).map_err(|error| {
                PartnerError::InvalidConfig(format!("invalid access code header: {error}"))
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl MetricsSource for PartnerClient {
    async fn fetch_daily_metrics(
        &self,
        query: &MetricsQuery,
    ) -> Result<Vec<CanonicalMetric>, PartnerError> {
        let response = self
            .http
            .get(format!("{}/daily_metrics", self.api_base))
            .query(&query.query_pairs())
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            let body = serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
            return Err(PartnerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let payload = serde_json::from_str::<Value>(&raw).map_err(|error| {
            PartnerError::MalformedResponse(format!("response body is not JSON: {error}"))
        })?;
        normalize_daily_metrics(&payload, query.subject().unwrap_or(DEFAULT_SUBJECT_ID))
    }
}
