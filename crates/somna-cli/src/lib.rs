//! Command-line surface for the somna metric cache and tool server.

pub mod cli_args;
mod command_runtime;

pub use cli_args::*;
pub use command_runtime::run_cli;
