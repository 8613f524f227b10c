use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use somna_gateway::DEFAULT_GATEWAY_BIND;
use somna_partner::{DEFAULT_PARTNER_API_BASE, DEFAULT_REQUEST_TIMEOUT_MS};

pub const DEFAULT_DB_PATH: &str = ".somna/somna.sqlite";
/// Audit client id for one-shot commands; `serve` records the dispatcher default.
pub const CLI_CLIENT_ID: &str = "cli";

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "somna",
    about = "Sleep and recovery telemetry cache with an audited tool server",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub partner: CliPartnerFlags,

    #[arg(
        long = "db-path",
        env = "SOMNA_DB_PATH",
        default_value = DEFAULT_DB_PATH,
        help = "SQLite database holding cached metrics and the audit log"
    )]
    pub db_path: PathBuf,

    #[arg(
        long = "mcp-secret",
        env = "SOMNA_MCP_SECRET",
        hide_env_values = true,
        help = "Shared secret callers must present; required by every command"
    )]
    pub mcp_secret: Option<String>,

    #[arg(
        long = "client-id",
        env = "SOMNA_CLIENT_ID",
        help = "Client id recorded in audit entries"
    )]
    pub client_id: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Partner API connection flags flattened into `Cli`.
#[derive(Debug, Args)]
pub struct CliPartnerFlags {
    #[arg(
        long = "partner-api-base",
        env = "SOMNA_PARTNER_API_BASE",
        default_value = DEFAULT_PARTNER_API_BASE
    )]
    pub api_base: String,

    #[arg(
        long = "partner-api-token",
        env = "SOMNA_PARTNER_API_TOKEN",
        hide_env_values = true
    )]
    pub api_token: Option<String>,

    #[arg(
        long = "partner-access-code",
        env = "SOMNA_PARTNER_ACCESS_CODE",
        hide_env_values = true
    )]
    pub access_code: Option<String>,

    #[arg(
        long = "partner-timeout-ms",
        env = "SOMNA_PARTNER_TIMEOUT_MS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_MS,
        value_parser = parse_positive_u64
    )]
    pub timeout_ms: u64,
}

impl CliPartnerFlags {
    pub fn has_credentials(&self) -> bool {
        [&self.api_token, &self.access_code]
            .iter()
            .all(|value| value.as_deref().is_some_and(|value| !value.trim().is_empty()))
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Serve the JSON-RPC tool endpoint and dashboard routes over HTTP.
    Serve {
        #[arg(long, env = "SOMNA_BIND", default_value = DEFAULT_GATEWAY_BIND)]
        bind: String,
    },
    /// Fetch metrics live from the partner API without caching them.
    Fetch(CliWindowArgs),
    /// Fetch metrics and upsert them into the cache.
    Refresh {
        #[command(flatten)]
        window: CliWindowArgs,
        #[arg(
            long,
            conflicts_with_all = ["date", "start_epoch", "end_epoch"],
            help = "Refresh each of the last N days, today first"
        )]
        days: Option<u64>,
    },
    /// List cached metrics newest first.
    List {
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "start-date")]
        start_date: Option<String>,
        #[arg(long = "end-date")]
        end_date: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Show the sleep summary cached for one date.
    Summary {
        #[arg(long)]
        date: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Print the most recent audit entries.
    Logs {
        #[arg(long, default_value_t = somna_tools::DEFAULT_AUDIT_LIMIT)]
        limit: usize,
    },
    /// Print dashboard trends over the cached window.
    Dashboard {
        #[arg(long, default_value_t = somna_types::DEFAULT_LOOKBACK_DAYS)]
        days: usize,
        #[arg(long)]
        email: Option<String>,
    },
}

/// Date or epoch window for upstream fetches. Validation happens in the dispatcher.
#[derive(Debug, Args)]
pub struct CliWindowArgs {
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long = "start-epoch")]
    pub start_epoch: Option<i64>,
    #[arg(long = "end-epoch")]
    pub end_epoch: Option<i64>,
    #[arg(long)]
    pub email: Option<String>,
}

impl CliCommand {
    /// Commands that reach the partner API and need its credentials.
    pub fn requires_partner(&self) -> bool {
        matches!(self, Self::Serve { .. } | Self::Fetch(_) | Self::Refresh { .. })
    }
}
