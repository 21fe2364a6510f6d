//! Audit logging configuration.

use serde::{Deserialize, Serialize};

/// Configuration for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Directory receiving `audit.log` (JSON Lines).
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Also print human-readable lines to stdout.
    #[serde(default)]
    pub stdout: bool,

    /// Record statement text (original and rewritten) in events.
    #[serde(default = "default_enabled")]
    pub log_statements: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            directory: default_directory(),
            stdout: false,
            log_statements: default_enabled(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_directory() -> String {
    "logs".to_string()
}
