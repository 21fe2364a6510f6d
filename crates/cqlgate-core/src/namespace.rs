//! Mapping between a tenant's logical names and backend physical names.
//!
//! A physical name is the tenant's internal token followed by the logical
//! name. Every internal token has the same length, starts with a lowercase
//! ASCII letter and contains only lowercase ASCII letters and digits, so:
//!
//! - a physical name splits back into exactly one (token, logical) pair;
//! - two tenants can never produce the same physical name;
//! - the backend's lowercase folding of unquoted identifiers never alters
//!   the prefix.

use thiserror::Error;

use crate::tenant::TenantRecord;

/// An internal token failed validation.
///
/// Messages never include the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("internal token has length {actual}, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("internal token must start with a lowercase ASCII letter")]
    InvalidLeadingCharacter,

    #[error("internal token may only contain lowercase ASCII letters and digits")]
    InvalidCharacter,
}

/// A validated tenant namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    token: String,
}

impl Namespace {
    /// Validate `token` as a namespace prefix of `token_length` characters.
    pub fn new(token: impl Into<String>, token_length: usize) -> Result<Self, NamespaceError> {
        let token = token.into();

        if token.len() != token_length {
            return Err(NamespaceError::InvalidLength {
                expected: token_length,
                actual: token.len(),
            });
        }

        let mut chars = token.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return Err(NamespaceError::InvalidLeadingCharacter),
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(NamespaceError::InvalidCharacter);
        }

        Ok(Self { token })
    }

    /// Namespace of a resolved tenant.
    pub fn for_tenant(tenant: &TenantRecord, token_length: usize) -> Result<Self, NamespaceError> {
        Self::new(tenant.internal_token.clone(), token_length)
    }

    /// The raw prefix.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Physical name of a logical name.
    pub fn physical(&self, logical: &str) -> String {
        let mut name = String::with_capacity(self.token.len() + logical.len());
        name.push_str(&self.token);
        name.push_str(logical);
        name
    }

    /// Logical name of a physical name owned by this namespace.
    pub fn logical<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical
            .strip_prefix(self.token.as_str())
            .filter(|rest| !rest.is_empty())
    }

    /// Whether `physical` belongs to this namespace.
    pub fn owns(&self, physical: &str) -> bool {
        self.logical(physical).is_some()
    }

    /// Remove every occurrence of the prefix from free text (error messages,
    /// warnings).
    pub fn strip_all(&self, text: &str) -> String {
        text.replace(self.token.as_str(), "")
    }
}
