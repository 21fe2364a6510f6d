//! Tenant records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Characters of a user token that may appear in logs.
const LOGGED_TOKEN_PREFIX: usize = 4;

/// A tenant as written by the provisioning tool.
///
/// Read-only to the gateway. One record is shared (behind an `Arc`) by every
/// session authenticated with its user token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Namespace prefix of every keyspace and user the tenant owns.
    pub internal_token: String,

    /// Public credential presented by clients.
    pub user_token: String,

    /// Human-readable owner (usually an email address).
    pub owner_id: String,

    /// Free text attached at provisioning time.
    #[serde(default)]
    pub comment: Option<String>,

    /// When the record was written.
    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,

    /// When the token stops being accepted. `None` never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    /// Create a non-expiring record.
    pub fn new(
        internal_token: impl Into<String>,
        user_token: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            internal_token: internal_token.into(),
            user_token: user_token.into(),
            owner_id: owner_id.into(),
            comment: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Set the expiration time.
    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether the token is no longer valid at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    /// The user token shortened for log output.
    pub fn redacted_user_token(&self) -> String {
        redact_token(&self.user_token)
    }
}

/// Shorten a token so only its first characters are visible.
pub fn redact_token(token: &str) -> String {
    let visible: String = token.chars().take(LOGGED_TOKEN_PREFIX).collect();
    format!("{visible}…")
}

fn default_created_at() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}
