use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use cqlgate_audit::{AuditEventType, AuditFilter};
use cqlgate_core::GatewayConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "cqlgate", version, about = "Multi-tenant gateway for CQL clusters")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway until interrupted.
    Serve {
        /// Gateway configuration file.
        #[arg(long, short, env = "CQLGATE_CONFIG", default_value = "cqlgate.yaml")]
        config: PathBuf,

        /// Override `proxy.listen_port`.
        #[arg(long)]
        listen_port: Option<u16>,
    },

    /// Validate a configuration file and print a summary.
    Check {
        #[arg(long, short, env = "CQLGATE_CONFIG", default_value = "cqlgate.yaml")]
        config: PathBuf,

        /// Also print the effective configuration, secrets redacted.
        #[arg(long, default_value_t = false)]
        print: bool,
    },

    /// Show how a statement would be rewritten for a tenant.
    Explain {
        /// Internal token of the tenant.
        #[arg(long)]
        token: String,

        /// Logical keyspace selected with USE.
        #[arg(long)]
        keyspace: Option<String>,

        /// Take namespace settings from this configuration file.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// The CQL statement.
        statement: String,
    },

    /// Print recent audit events, newest first.
    Audit {
        #[arg(long, short, env = "CQLGATE_CONFIG", default_value = "cqlgate.yaml")]
        config: PathBuf,

        /// Tenant owner id.
        #[arg(long)]
        tenant: Option<String>,

        /// Logical principal.
        #[arg(long)]
        principal: Option<String>,

        /// Verb such as `SELECT` or `CREATE KEYSPACE`.
        #[arg(long)]
        action: Option<String>,

        /// Event type, e.g. `statement_failed`.
        #[arg(long)]
        event_type: Option<AuditEventType>,

        #[arg(long)]
        connection_id: Option<String>,

        /// Only events at or after this RFC 3339 time.
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Only events at or before this RFC 3339 time.
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Skip this many matching events.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.cmd {
        Command::Serve { config, .. } => logging_filter(config),
        _ => "warn".to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.cmd {
        Command::Serve {
            config,
            listen_port,
        } => commands::serve::run(&config, listen_port).await?,

        Command::Check { config, print } => commands::check::run(&config, print)?,

        Command::Explain {
            token,
            keyspace,
            config,
            statement,
        } => commands::explain::run(&token, keyspace.as_deref(), config.as_deref(), &statement)?,

        Command::Audit {
            config,
            tenant,
            principal,
            action,
            event_type,
            connection_id,
            since,
            until,
            limit,
            offset,
        } => {
            let filter = AuditFilter {
                tenant,
                principal,
                action,
                event_type,
                connection_id,
                start_time: since,
                end_time: until,
                limit: Some(limit),
                offset: Some(offset),
            };
            commands::audit::run(&config, filter).await?
        }
    }

    Ok(())
}

/// The configured log filter, or `info` when the file cannot be read yet.
/// Load errors are reported once the subscriber is installed.
fn logging_filter(config: &Path) -> String {
    GatewayConfig::from_file(config)
        .map(|c| c.logging.filter)
        .unwrap_or_else(|_| "info".to_string())
}
