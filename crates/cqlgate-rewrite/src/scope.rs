//! Which backend names a tenant may see, and under which logical name.

use cqlgate_core::{Namespace, NamespaceConfig};

use crate::error::RewriteError;

/// Relationship between a physical name and a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership<'n> {
    /// Shared by every tenant; shown unchanged.
    Global,
    /// Owned by the tenant; carries the logical name.
    Owned(&'n str),
    /// Belongs to someone else.
    Foreign,
}

/// A tenant namespace paired with the global name lists.
#[derive(Debug, Clone, Copy)]
pub struct TenantScope<'a> {
    namespace: &'a Namespace,
    config: &'a NamespaceConfig,
}

impl<'a> TenantScope<'a> {
    pub fn new(namespace: &'a Namespace, config: &'a NamespaceConfig) -> Self {
        Self { namespace, config }
    }

    pub fn namespace(&self) -> &'a Namespace {
        self.namespace
    }

    pub fn keyspace_ownership<'n>(&self, physical: &'n str) -> Ownership<'n> {
        if self.config.is_global_keyspace(physical) {
            return Ownership::Global;
        }
        match self.namespace.logical(physical) {
            Some(logical) => Ownership::Owned(logical),
            None => Ownership::Foreign,
        }
    }

    pub fn principal_ownership<'n>(&self, physical: &'n str) -> Ownership<'n> {
        if self.config.is_global_principal(physical) {
            return Ownership::Global;
        }
        match self.namespace.logical(physical) {
            Some(logical) => Ownership::Owned(logical),
            None => Ownership::Foreign,
        }
    }

    /// Backend name of a canonical logical keyspace.
    pub fn physical_keyspace(&self, logical: &str) -> String {
        if self.config.is_global_keyspace(logical) {
            logical.to_string()
        } else {
            self.namespace.physical(logical)
        }
    }

    /// Backend name of a logical principal.
    pub fn physical_principal(&self, logical: &str) -> String {
        if self.config.is_global_principal(logical) {
            logical.to_string()
        } else {
            self.namespace.physical(logical)
        }
    }

    /// Logical name of a keyspace reported by the backend.
    pub fn logical_keyspace(
        &self,
        physical: &str,
        context: &'static str,
    ) -> Result<String, RewriteError> {
        match self.keyspace_ownership(physical) {
            Ownership::Global => Ok(physical.to_string()),
            Ownership::Owned(logical) => Ok(logical.to_string()),
            Ownership::Foreign => Err(RewriteError::ForeignIdentifier {
                kind: "keyspace",
                context,
            }),
        }
    }

    /// Logical name of a principal reported by the backend.
    pub fn logical_principal(
        &self,
        physical: &str,
        context: &'static str,
    ) -> Result<String, RewriteError> {
        match self.principal_ownership(physical) {
            Ownership::Global => Ok(physical.to_string()),
            Ownership::Owned(logical) => Ok(logical.to_string()),
            Ownership::Foreign => Err(RewriteError::ForeignIdentifier {
                kind: "principal",
                context,
            }),
        }
    }

    /// Remove the tenant token from free text.
    pub fn strip(&self, text: &str) -> String {
        self.namespace.strip_all(text)
    }
}
