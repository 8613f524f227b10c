use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use somna_gateway::{run_gateway_server, GatewayServerConfig};
use somna_partner::{MetricsQuery, MetricsSource, PartnerClient, PartnerConfig, PartnerError};
use somna_store::SqliteMetricStore;
use somna_tools::{ToolCall, ToolDispatcher, ToolDispatcherConfig, ToolName, DEFAULT_CLIENT_ID};
use somna_types::CanonicalMetric;

use crate::{Cli, CliCommand, CliPartnerFlags, CliWindowArgs, CLI_CLIENT_ID};

/// Stand-in source for cache-only commands run without partner credentials.
struct UnconfiguredPartnerSource;

#[async_trait]
impl MetricsSource for UnconfiguredPartnerSource {
    async fn fetch_daily_metrics(
        &self,
        _query: &MetricsQuery,
    ) -> Result<Vec<CanonicalMetric>, PartnerError> {
        Err(PartnerError::MissingCredential("api token"))
    }
}

pub async fn run_cli(cli: Cli) -> Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&cli)?);
    let credential = cli.mcp_secret.clone();

    match cli.command {
        CliCommand::Serve { bind } => {
            run_gateway_server(GatewayServerConfig { bind }, dispatcher).await
        }
        CliCommand::Logs { limit } => {
            let entries = dispatcher.recent_audit_entries(limit).await?;
            print_json(&json!({ "count": entries.len(), "entries": entries }))
        }
        CliCommand::Dashboard { days, email } => {
            let snapshot = dispatcher.dashboard_snapshot(email, days).await?;
            print_json(&serde_json::to_value(snapshot)?)
        }
        command => {
            let (tool, arguments) = tool_invocation(command)?;
            let result = dispatcher
                .dispatch(ToolCall::new(tool.as_str(), arguments, credential))
                .await
                .with_context(|| format!("{} failed", tool.as_str()))?;
            print_json(&result)
        }
    }
}

fn build_dispatcher(cli: &Cli) -> Result<ToolDispatcher> {
    let source: Arc<dyn MetricsSource> =
        if cli.command.requires_partner() || cli.partner.has_credentials() {
            Arc::new(build_partner_client(&cli.partner)?)
        } else {
            Arc::new(UnconfiguredPartnerSource)
        };
    let store = Arc::new(SqliteMetricStore::new(&cli.db_path).with_context(|| {
        format!("failed to open metric store {}", cli.db_path.display())
    })?);
    let client_id = cli.client_id.clone().unwrap_or_else(|| match cli.command {
        CliCommand::Serve { .. } => DEFAULT_CLIENT_ID.to_string(),
        _ => CLI_CLIENT_ID.to_string(),
    });

    ToolDispatcher::new(
        ToolDispatcherConfig {
            shared_secret: cli.mcp_secret.clone(),
            client_id,
        },
        source,
        store.clone(),
        store,
    )
    .context("failed to configure tool dispatcher")
}

fn build_partner_client(flags: &CliPartnerFlags) -> Result<PartnerClient> {
    PartnerClient::new(PartnerConfig {
        api_base: flags.api_base.clone(),
        api_token: flags.api_token.clone().unwrap_or_default(),
        access_code: flags.access_code.clone().unwrap_or_default(),
        request_timeout_ms: flags.timeout_ms,
    })
    .context("failed to configure partner api client")
}

/// Maps a one-shot subcommand onto the tool it drives and that tool's arguments.
fn tool_invocation(command: CliCommand) -> Result<(ToolName, Value)> {
    let mut arguments = Map::new();
    let tool = match command {
        CliCommand::Fetch(window) => {
            insert_window(&mut arguments, window);
            ToolName::FetchDailyMetrics
        }
        CliCommand::Refresh {
            window,
            days: Some(days),
        } => {
            insert_optional(&mut arguments, "email", window.email.map(Value::from));
            arguments.insert("days".to_string(), Value::from(days));
            ToolName::RefreshRecentMetrics
        }
        CliCommand::Refresh { window, days: None } => {
            insert_window(&mut arguments, window);
            ToolName::RefreshAndStoreMetrics
        }
        CliCommand::List {
            email,
            start_date,
            end_date,
            limit,
        } => {
            insert_optional(&mut arguments, "email", email.map(Value::from));
            insert_optional(&mut arguments, "startDate", start_date.map(Value::from));
            insert_optional(&mut arguments, "endDate", end_date.map(Value::from));
            insert_optional(&mut arguments, "limit", limit.map(Value::from));
            ToolName::ListCachedMetrics
        }
        CliCommand::Summary { date, email } => {
            arguments.insert("date".to_string(), Value::from(date));
            insert_optional(&mut arguments, "email", email.map(Value::from));
            ToolName::GetMetricSummary
        }
        CliCommand::Serve { .. } | CliCommand::Logs { .. } | CliCommand::Dashboard { .. } => {
            return Err(anyhow!("command does not map onto a tool"));
        }
    };
    Ok((tool, Value::Object(arguments)))
}

fn insert_window(arguments: &mut Map<String, Value>, window: CliWindowArgs) {
    insert_optional(arguments, "date", window.date.map(Value::from));
    insert_optional(arguments, "start_epoch", window.start_epoch.map(Value::from));
    insert_optional(arguments, "end_epoch", window.end_epoch.map(Value::from));
    insert_optional(arguments, "email", window.email.map(Value::from));
}

fn insert_optional(arguments: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        arguments.insert(key.to_string(), value);
    }
}

fn print_json(value: &Value) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(value).context("failed to render command output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::tool_invocation;
    use crate::Cli;
    use clap::Parser;
    use serde_json::json;
    use somna_tools::ToolName;

    fn invocation(args: &[&str]) -> (ToolName, serde_json::Value) {
        let cli = Cli::try_parse_from(args).expect("parse");
        tool_invocation(cli.command).expect("tool command")
    }

    #[test]
    fn fetch_passes_window_through_unvalidated() {
        let (tool, arguments) = invocation(&[
            "somna",
            "fetch",
            "--start-epoch",
            "100",
            "--end-epoch",
            "200",
        ]);
        assert_eq!(tool, ToolName::FetchDailyMetrics);
        assert_eq!(arguments, json!({ "start_epoch": 100, "end_epoch": 200 }));
    }

    #[test]
    fn refresh_with_days_targets_recent_refresh() {
        let (tool, arguments) =
            invocation(&["somna", "refresh", "--days", "3", "--email", "ana@example.com"]);
        assert_eq!(tool, ToolName::RefreshRecentMetrics);
        assert_eq!(arguments, json!({ "days": 3, "email": "ana@example.com" }));
    }

    #[test]
    fn list_uses_camel_case_date_bounds() {
        let (tool, arguments) = invocation(&[
            "somna",
            "list",
            "--start-date",
            "2025-11-01",
            "--limit",
            "5",
        ]);
        assert_eq!(tool, ToolName::ListCachedMetrics);
        assert_eq!(arguments, json!({ "startDate": "2025-11-01", "limit": 5 }));
    }

    #[test]
    fn read_commands_are_not_tools() {
        let cli = Cli::try_parse_from(["somna", "dashboard"]).expect("parse");
        assert!(tool_invocation(cli.command).is_err());
    }
}
