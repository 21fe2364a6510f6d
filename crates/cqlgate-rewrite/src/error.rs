//! Error types for the rewrite crate.

use thiserror::Error;

use crate::lexer::LexError;

/// Errors raised while classifying or translating statements.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The statement was not understood and must pass through verbatim.
    #[error("statement not classified: {0}")]
    Classification(String),

    /// The backend reported a name outside the tenant's namespace.
    ///
    /// The offending name is deliberately not part of the message.
    #[error("{kind} outside the tenant namespace in {context}")]
    ForeignIdentifier {
        kind: &'static str,
        context: &'static str,
    },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LexError> for RewriteError {
    fn from(e: LexError) -> Self {
        Self::Classification(e.to_string())
    }
}
