//! Partner API client and wire-format normalizer for daily metrics.

mod client;
mod error;
pub mod wire;

pub use client::{
    MetricsQuery, MetricsSource, MetricsWindow, PartnerClient, PartnerConfig,
    DEFAULT_PARTNER_API_BASE, DEFAULT_REQUEST_TIMEOUT_MS, MAX_EPOCH_RANGE_SECONDS,
};
pub use error::PartnerError;
pub use wire::{detect_wire_shape, normalize_daily_metrics, WireShape};
