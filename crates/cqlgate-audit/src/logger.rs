//! Audit logger implementation.
//!
//! Provides the main `AuditLogger` type with helper methods for the session
//! lifecycle and for executed statements.

use chrono::{DateTime, Utc};
use cqlgate_core::AuditConfig;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::AuditError;
use crate::event::{AuditContext, AuditEvent, AuditEventBuilder, AuditEventType};
use crate::storage::{AuditStorage, ConsoleStorage, DualStorage, FileStorage, NullStorage};

/// A statement as seen by the gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementRecord<'a> {
    /// Verb or protocol operation.
    pub action: &'a str,
    /// Client text.
    pub statement: Option<&'a str>,
    /// Backend text.
    pub rewritten: Option<&'a str>,
    /// Physical relation.
    pub relation: Option<&'a str>,
    pub duration_ms: u64,
}

/// The main audit logger.
pub struct AuditLogger {
    config: AuditConfig,
    storage: Arc<dyn AuditStorage>,
}

impl AuditLogger {
    /// Create a new audit logger with the given configuration.
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        let storage: Arc<dyn AuditStorage> = if !config.enabled {
            Arc::new(NullStorage::new())
        } else {
            let file_path = Self::resolve_log_path(&config);

            if config.stdout {
                Arc::new(DualStorage::new(&file_path)?)
            } else {
                Arc::new(FileStorage::new(&file_path)?)
            }
        };

        Ok(Self { config, storage })
    }

    /// Create a logger with a custom storage backend.
    pub fn with_storage(config: AuditConfig, storage: Arc<dyn AuditStorage>) -> Self {
        Self { config, storage }
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            storage: Arc::new(NullStorage::new()),
        }
    }

    /// Create a console-only logger (useful for development).
    pub fn console_only() -> Self {
        Self {
            config: AuditConfig {
                enabled: true,
                stdout: true,
                ..Default::default()
            },
            storage: Arc::new(ConsoleStorage::new()),
        }
    }

    fn resolve_log_path(config: &AuditConfig) -> PathBuf {
        let mut path = PathBuf::from(&config.directory);
        path.push("audit.log");
        path
    }

    /// Check if logging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Log an audit event.
    pub async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if !self.config.enabled {
            return Ok(());
        }

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            tenant = event.tenant.as_deref().unwrap_or("-"),
            action = %event.action,
            "Audit event"
        );

        self.storage.store(event).await
    }

    pub async fn log_session_opened(&self, context: &AuditContext) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::SessionOpened, "AUTHENTICATE")
            .context(context)
            .build();
        self.log(event).await
    }

    pub async fn log_session_closed(
        &self,
        context: &AuditContext,
        duration_ms: u64,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::SessionClosed, "CLOSE")
            .context(context)
            .duration_ms(duration_ms)
            .build();
        self.log(event).await
    }

    /// Log rejected credentials. `context` carries no tenant at this point.
    pub async fn log_authentication_failed(
        &self,
        context: &AuditContext,
        reason: &str,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::AuthenticationFailed, "AUTHENTICATE")
            .context(context)
            .error(reason)
            .build();
        self.log(event).await
    }

    pub async fn log_statement_executed(
        &self,
        context: &AuditContext,
        record: StatementRecord<'_>,
        row_count: Option<u64>,
        rows_filtered: u64,
    ) -> Result<(), AuditError> {
        let mut builder = self.statement_builder(AuditEventType::StatementExecuted, context, &record);
        if let Some(rows) = row_count {
            builder = builder.row_count(rows);
        }
        if rows_filtered > 0 {
            builder = builder.rows_filtered(rows_filtered);
        }
        self.log(builder.build()).await
    }

    pub async fn log_statement_failed(
        &self,
        context: &AuditContext,
        record: StatementRecord<'_>,
        error: &str,
    ) -> Result<(), AuditError> {
        let event = self
            .statement_builder(AuditEventType::StatementFailed, context, &record)
            .error(error)
            .build();
        self.log(event).await
    }

    fn statement_builder(
        &self,
        event_type: AuditEventType,
        context: &AuditContext,
        record: &StatementRecord<'_>,
    ) -> AuditEventBuilder {
        let mut builder = AuditEvent::builder(event_type, record.action)
            .context(context)
            .duration_ms(record.duration_ms);

        if self.config.log_statements {
            if let Some(statement) = record.statement {
                builder = builder.statement(statement);
            }
            if let Some(rewritten) = record.rewritten {
                builder = builder.rewritten_statement(rewritten);
            }
        }
        if let Some(relation) = record.relation {
            builder = builder.relation(relation);
        }
        builder
    }

    /// Query audit events with filters, newest first. Backs `cqlgate audit`.
    pub async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        self.storage.query(filter).await
    }
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub tenant: Option<String>,
    pub principal: Option<String>,
    pub action: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub connection_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Offset for pagination.
    pub offset: Option<usize>,
}

impl AuditFilter {
    /// Whether `event` passes every set criterion.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        fn same(wanted: &Option<String>, actual: &Option<String>) -> bool {
            wanted.is_none() || wanted == actual
        }

        same(&self.tenant, &event.tenant)
            && same(&self.principal, &event.principal)
            && same(&self.connection_id, &event.connection_id)
            && self.action.as_ref().is_none_or(|a| *a == event.action)
            && self.event_type.is_none_or(|t| t == event.event_type)
            && self.start_time.is_none_or(|start| event.occurred_at >= start)
            && self.end_time.is_none_or(|end| event.occurred_at <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> AuditContext {
        AuditContext::connection("conn-1", "127.0.0.1").with_tenant("acme", "cassandra")
    }

    #[tokio::test]
    async fn test_disabled_logger() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());

        logger.log_session_opened(&context()).await.unwrap();
    }

    #[tokio::test]
    async fn test_console_only_logger() {
        let logger = AuditLogger::console_only();
        assert!(logger.is_enabled());

        logger
            .log_authentication_failed(&AuditContext::connection("c", "10.1.1.1"), "unknown token")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_statement_events_are_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let logger = AuditLogger::new(config).unwrap();

        let record = StatementRecord {
            action: "SELECT",
            statement: Some("SELECT * FROM system.schema_keyspaces"),
            rewritten: Some("SELECT * FROM system.schema_keyspaces"),
            relation: Some("system.schema_keyspaces"),
            duration_ms: 4,
        };
        logger
            .log_statement_executed(&context(), record, Some(3), 7)
            .await
            .unwrap();
        logger
            .log_statement_failed(
                &context(),
                StatementRecord {
                    action: "USE",
                    statement: Some("USE blah"),
                    ..Default::default()
                },
                "Keyspace 'blah' does not exist",
            )
            .await
            .unwrap();

        let events = logger
            .query(AuditFilter {
                tenant: Some("acme".to_string()),
                limit: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::StatementFailed);
        assert_eq!(events[1].rows_filtered, Some(7));

        assert!(dir.path().join("audit.log").exists());
    }

    #[tokio::test]
    async fn test_statement_text_can_be_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            log_statements: false,
            ..Default::default()
        };
        let logger = AuditLogger::new(config).unwrap();

        logger
            .log_statement_executed(
                &context(),
                StatementRecord {
                    action: "INSERT",
                    statement: Some("INSERT INTO ks.t (k) VALUES ('secret')"),
                    ..Default::default()
                },
                None,
                0,
            )
            .await
            .unwrap();

        let events = logger.query(AuditFilter::default()).await.unwrap();
        assert!(events[0].statement.is_none());
        assert_eq!(events[0].action, "INSERT");
    }

    #[test]
    fn test_filter_matches() {
        let event = AuditEvent::builder(AuditEventType::SessionOpened, "AUTHENTICATE")
            .context(&context())
            .build();

        assert!(AuditFilter::default().matches(&event));
        assert!(AuditFilter {
            tenant: Some("acme".to_string()),
            event_type: Some(AuditEventType::SessionOpened),
            ..Default::default()
        }
        .matches(&event));
        assert!(!AuditFilter {
            tenant: Some("globex".to_string()),
            ..Default::default()
        }
        .matches(&event));
    }
}
