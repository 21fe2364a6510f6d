//! Error types for the proxy crate.

use cqlgate_rewrite::RewriteError;
use cqlgate_token::TokenError;
use thiserror::Error;

use crate::protocol::ErrorBody;

/// Errors decoding or encoding native protocol frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The body ended before a field was complete.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// A string field is not UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The frame uses a protocol version the gateway does not speak.
    #[error("unsupported protocol version {version}")]
    UnsupportedVersion { version: u8, stream: i16 },

    #[error("unknown opcode 0x{opcode:02x}")]
    UnknownOpcode { opcode: u8, stream: i16 },

    #[error("frame body of {length} bytes exceeds the {max} byte limit")]
    FrameTooLarge { length: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors talking to the backend cluster.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Could not open a TCP connection.
    #[error("cannot connect to backend {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response within the configured timeout.
    #[error("backend timed out during {0}")]
    Timeout(&'static str),

    /// The backend sent something that is not a valid frame.
    #[error("backend protocol error: {0}")]
    Protocol(#[from] WireError),

    /// The backend answered with an ERROR message.
    #[error("backend rejected request: {}", .0.message)]
    Rejected(ErrorBody),

    /// A well formed but unexpected response.
    #[error("unexpected backend response: {0}")]
    Unexpected(String),
}

impl BackendError {
    /// Whether the backend itself could not be reached or stopped answering.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Io(_) | Self::Timeout(_) | Self::Protocol(WireError::Io(_))
        )
    }
}

/// Errors that stop the gateway or a session.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Failed to bind to the listen address.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    /// Failed to accept a connection.
    #[error("failed to accept connection: {0}")]
    AcceptFailed(#[source] std::io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
