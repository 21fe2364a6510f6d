//! `cqlgate audit`: print recent events from the configured audit log.

use anyhow::Context;
use cqlgate_audit::{AuditFilter, AuditLogger};
use cqlgate_core::GatewayConfig;
use cqlgate_core::config::AuditConfig;
use std::path::Path;

pub async fn run(config_path: &Path, filter: AuditFilter) -> anyhow::Result<()> {
    let config = GatewayConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let lines = recent(config.audit, filter).await?;
    if lines.is_empty() {
        println!("No matching audit events.");
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Matching events as log lines, newest first.
async fn recent(config: AuditConfig, filter: AuditFilter) -> anyhow::Result<Vec<String>> {
    anyhow::ensure!(config.enabled, "audit logging is disabled in this configuration");

    // Reading only, never mirror to stdout.
    let logger = AuditLogger::new(AuditConfig {
        stdout: false,
        ..config
    })
    .context("failed to open the audit log")?;

    let events = logger.query(filter).await?;
    Ok(events.iter().map(|event| event.to_log_line()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlgate_audit::{AuditContext, AuditEventType, StatementRecord};
    use pretty_assertions::assert_eq;

    fn config(dir: &tempfile::TempDir) -> AuditConfig {
        AuditConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_recent_reads_events_written_by_the_gateway() {
        let dir = tempfile::tempdir().unwrap();
        {
            let logger = AuditLogger::new(config(&dir)).unwrap();
            let acme = AuditContext::connection("c1", "10.0.0.1").with_tenant("acme", "cassandra");
            let globex = AuditContext::connection("c2", "10.0.0.2").with_tenant("globex", "cassandra");
            logger.log_session_opened(&acme).await.unwrap();
            logger
                .log_statement_failed(
                    &acme,
                    StatementRecord {
                        action: "USE",
                        statement: Some("USE blah"),
                        ..Default::default()
                    },
                    "Keyspace 'blah' does not exist",
                )
                .await
                .unwrap();
            logger.log_session_opened(&globex).await.unwrap();
        }

        let lines = recent(
            config(&dir),
            AuditFilter {
                tenant: Some("acme".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("STATEMENT_FAILED"));
        assert!(lines[1].contains("SESSION_OPENED"));

        let failures = recent(
            config(&dir),
            AuditFilter {
                event_type: Some(AuditEventType::StatementFailed),
                limit: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("statement=\"USE blah\""));
    }

    #[tokio::test]
    async fn test_recent_refuses_disabled_audit() {
        let dir = tempfile::tempdir().unwrap();
        let disabled = AuditConfig {
            enabled: false,
            ..config(&dir)
        };
        assert!(recent(disabled, AuditFilter::default()).await.is_err());
    }
}
