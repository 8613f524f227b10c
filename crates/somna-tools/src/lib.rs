//! Audited, authenticated tool dispatch for cached biometric metrics.
//!
//! [`ToolDispatcher`] is the single boundary every externally triggered
//! operation crosses; [`mcp_server_runtime`] adapts it to JSON-RPC frames.

mod auth;
mod catalog;
mod dispatcher;
mod error;
pub mod mcp_server_runtime;
mod validation;

pub use catalog::{tool_descriptors, tool_endpoint, ToolDescriptor, ToolName, TOOL_ENDPOINT_PREFIX};
pub use dispatcher::{ToolCall, ToolDispatcher, ToolDispatcherConfig, DEFAULT_CLIENT_ID};
pub use error::{DispatcherConfigError, ToolError};
pub use somna_store::DEFAULT_AUDIT_LIMIT;
pub use validation::{DEFAULT_REFRESH_DAYS, MAX_LIST_LIMIT, MAX_REFRESH_DAYS};
