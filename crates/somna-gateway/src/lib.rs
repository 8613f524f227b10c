//! HTTP transport for the somna tool dispatcher.
pub mod gateway_mcp;

pub use gateway_mcp::*;
