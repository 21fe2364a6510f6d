//! Audit event types.
//!
//! One event per session transition or executed statement, always in the
//! tenant's logical names unless a field says otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A client authenticated and got a backend session.
    SessionOpened,
    /// An authenticated session ended.
    SessionClosed,
    /// Credentials were rejected.
    AuthenticationFailed,
    /// A statement completed.
    StatementExecuted,
    /// A statement returned an error.
    StatementFailed,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionOpened => write!(f, "SESSION_OPENED"),
            Self::SessionClosed => write!(f, "SESSION_CLOSED"),
            Self::AuthenticationFailed => write!(f, "AUTH_FAILED"),
            Self::StatementExecuted => write!(f, "STATEMENT_EXECUTED"),
            Self::StatementFailed => write!(f, "STATEMENT_FAILED"),
        }
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = String;

    /// Accepts the serialized (`session_opened`) or displayed
    /// (`SESSION_OPENED`) form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session_opened" => Ok(Self::SessionOpened),
            "session_closed" => Ok(Self::SessionClosed),
            "authentication_failed" | "auth_failed" => Ok(Self::AuthenticationFailed),
            "statement_executed" => Ok(Self::StatementExecuted),
            "statement_failed" => Ok(Self::StatementFailed),
            other => Err(format!("unknown audit event type '{other}'")),
        }
    }
}

/// Who a session belongs to, attached to every event it produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    /// Tenant owner id, never the internal token.
    pub tenant: Option<String>,
    /// Logical principal the client logged in as.
    pub principal: Option<String>,
    pub connection_id: Option<String>,
    pub client_ip: Option<String>,
}

impl AuditContext {
    pub fn connection(connection_id: impl Into<String>, client_ip: impl Into<String>) -> Self {
        Self {
            tenant: None,
            principal: None,
            connection_id: Some(connection_id.into()),
            client_ip: Some(client_ip.into()),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>, principal: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self.principal = Some(principal.into());
        self
    }
}

/// An audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: Uuid,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Event type.
    pub event_type: AuditEventType,

    /// Tenant owner id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Logical principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,

    /// Statement verb or protocol operation (e.g. "CREATE KEYSPACE", "EXECUTE").
    pub action: String,

    /// Statement as sent by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,

    /// Statement as sent to the backend. Contains physical names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_statement: Option<String>,

    /// Physical relation of a single-table statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    /// Rows returned to the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,

    /// Catalog rows hidden from the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_filtered: Option<u64>,

    /// Duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error message (if event_type indicates failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Connection ID (for correlation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,

    /// Client IP address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event of the given type.
    pub fn new(event_type: AuditEventType, action: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type,
            tenant: None,
            principal: None,
            action: action.into(),
            statement: None,
            rewritten_statement: None,
            relation: None,
            row_count: None,
            rows_filtered: None,
            duration_ms: None,
            error: None,
            connection_id: None,
            client_ip: None,
        }
    }

    /// Create a builder for an audit event.
    pub fn builder(event_type: AuditEventType, action: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder::new(event_type, action)
    }

    /// Format the event as a human-readable log line.
    ///
    /// Format: `[timestamp] EVENT_TYPE tenant=... principal=... action=... [statement=...]`
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} tenant={} principal={} action={}",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.event_type,
            self.tenant.as_deref().unwrap_or("-"),
            self.principal.as_deref().unwrap_or("-"),
            self.action,
        );

        if let Some(ref statement) = self.statement {
            let preview: String = if statement.chars().count() > 100 {
                format!("{}...", statement.chars().take(100).collect::<String>())
            } else {
                statement.clone()
            };
            line.push_str(&format!(" statement=\"{}\"", preview.replace('\n', " ")));
        }

        if let Some(ref relation) = self.relation {
            line.push_str(&format!(" relation={}", relation));
        }

        if let Some(row_count) = self.row_count {
            line.push_str(&format!(" rows={}", row_count));
        }

        if let Some(filtered) = self.rows_filtered.filter(|n| *n > 0) {
            line.push_str(&format!(" filtered={}", filtered));
        }

        if let Some(duration) = self.duration_ms {
            line.push_str(&format!(" duration_ms={}", duration));
        }

        if let Some(ref error) = self.error {
            line.push_str(&format!(" error=\"{}\"", error.replace('"', "'")));
        }

        if let Some(ref ip) = self.client_ip {
            line.push_str(&format!(" client={}", ip));
        }

        line
    }
}

/// Builder for creating audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn new(event_type: AuditEventType, action: impl Into<String>) -> Self {
        Self {
            event: AuditEvent::new(event_type, action),
        }
    }

    /// Copy tenant, principal, connection and client from a session context.
    pub fn context(mut self, context: &AuditContext) -> Self {
        self.event.tenant = context.tenant.clone();
        self.event.principal = context.principal.clone();
        self.event.connection_id = context.connection_id.clone();
        self.event.client_ip = context.client_ip.clone();
        self
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.event.tenant = Some(tenant.into());
        self
    }

    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.event.principal = Some(principal.into());
        self
    }

    pub fn statement(mut self, statement: impl Into<String>) -> Self {
        self.event.statement = Some(statement.into());
        self
    }

    pub fn rewritten_statement(mut self, statement: impl Into<String>) -> Self {
        self.event.rewritten_statement = Some(statement.into());
        self
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.event.relation = Some(relation.into());
        self
    }

    pub fn row_count(mut self, count: u64) -> Self {
        self.event.row_count = Some(count);
        self
    }

    pub fn rows_filtered(mut self, count: u64) -> Self {
        self.event.rows_filtered = Some(count);
        self
    }

    pub fn duration_ms(mut self, duration: u64) -> Self {
        self.event.duration_ms = Some(duration);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.event.error = Some(error.into());
        self
    }

    pub fn connection_id(mut self, id: impl Into<String>) -> Self {
        self.event.connection_id = Some(id.into());
        self
    }

    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.event.client_ip = Some(ip.into());
        self
    }

    /// Build the audit event.
    pub fn build(self) -> AuditEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_from_str() {
        assert_eq!(
            "AUTH_FAILED".parse::<AuditEventType>(),
            Ok(AuditEventType::AuthenticationFailed)
        );
        assert_eq!(
            "statement_failed".parse::<AuditEventType>(),
            Ok(AuditEventType::StatementFailed)
        );
        assert!("dropped".parse::<AuditEventType>().is_err());
    }

    #[test]
    fn test_builder_with_context() {
        let context = AuditContext::connection("conn-1", "10.0.0.1").with_tenant("acme", "bob");
        let event = AuditEvent::builder(AuditEventType::StatementExecuted, "SELECT")
            .context(&context)
            .statement("SELECT * FROM ks.t")
            .row_count(3)
            .build();

        assert_eq!(event.tenant.as_deref(), Some("acme"));
        assert_eq!(event.principal.as_deref(), Some("bob"));
        assert_eq!(event.connection_id.as_deref(), Some("conn-1"));
        assert_eq!(event.row_count, Some(3));
    }

    #[test]
    fn test_log_line() {
        let event = AuditEvent::builder(AuditEventType::StatementFailed, "USE")
            .tenant("acme")
            .principal("cassandra")
            .statement("USE\nblah")
            .error("Keyspace \"blah\" does not exist")
            .build();

        let line = event.to_log_line();
        assert!(line.contains("STATEMENT_FAILED"));
        assert!(line.contains("tenant=acme"));
        assert!(line.contains("statement=\"USE blah\""));
        assert!(line.contains("error=\"Keyspace 'blah' does not exist\""));
    }

    #[test]
    fn test_long_statement_is_truncated_on_char_boundary() {
        let statement = "é".repeat(150);
        let event = AuditEvent::builder(AuditEventType::StatementExecuted, "INSERT")
            .statement(statement)
            .build();
        assert!(event.to_log_line().contains("..."));
    }

    #[test]
    fn test_json_skips_empty_fields() {
        let event = AuditEvent::new(AuditEventType::SessionOpened, "STARTUP");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "session_opened");
        assert!(json.get("statement").is_none());
        assert!(json.get("tenant").is_none());
    }
}
