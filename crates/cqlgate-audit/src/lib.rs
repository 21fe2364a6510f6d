//! # cqlgate-audit
//!
//! Audit logging for the cqlgate gateway.
//!
//! This crate provides functionality for:
//! - Recording session lifecycle events (opened, closed, authentication failures)
//! - Recording every statement with its client text and backend text
//! - Storing audit events in files (JSON Lines) and console (human-readable)
//! - Querying recent audit history with filters (`cqlgate audit`)
//!
//! ## Event Types
//!
//! | Event Type | Description |
//! |------------|-------------|
//! | `SessionOpened` | Client authenticated with a valid user token |
//! | `SessionClosed` | Authenticated session ended |
//! | `AuthenticationFailed` | Credentials rejected |
//! | `StatementExecuted` | Statement completed |
//! | `StatementFailed` | Statement returned an error |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cqlgate_audit::{AuditContext, AuditLogger, StatementRecord};
//! use cqlgate_core::AuditConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let logger = AuditLogger::new(AuditConfig::default())?;
//! let context = AuditContext::connection("c0ffee", "10.0.0.7").with_tenant("acme", "cassandra");
//!
//! logger.log_session_opened(&context).await?;
//! logger
//!     .log_statement_executed(
//!         &context,
//!         StatementRecord {
//!             action: "CREATE KEYSPACE",
//!             statement: Some("CREATE KEYSPACE foo WITH replication = {...}"),
//!             ..Default::default()
//!         },
//!         None,
//!         0,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod logger;
pub mod storage;

pub use error::AuditError;
pub use event::{AuditContext, AuditEvent, AuditEventBuilder, AuditEventType};
pub use logger::{AuditFilter, AuditLogger, StatementRecord};
pub use storage::{AuditStorage, ConsoleStorage, DualStorage, FileStorage, NullStorage};
