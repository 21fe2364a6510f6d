//! Error types for the token crate.

use cqlgate_core::NamespaceError;
use thiserror::Error;

/// Errors that can occur while resolving a client's credentials.
///
/// Every variant is reported to the client as the same authentication
/// failure; the distinction only reaches the gateway's own logs.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The username or SASL payload could not be split into token and principal.
    #[error("malformed credentials: {0}")]
    MalformedCredentials(String),

    /// No record for the token, or the record has expired.
    #[error("token not found")]
    NotFound,

    /// The record's internal token is not a valid namespace.
    #[error("invalid tenant record: {0}")]
    InvalidRecord(#[from] NamespaceError),

    /// The registry could not be read.
    #[error("token registry unavailable: {0}")]
    Registry(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
