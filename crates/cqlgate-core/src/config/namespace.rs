//! Namespace and catalog virtualization settings.

use serde::{Deserialize, Serialize};

/// How tenant names are laid out in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Length of every internal token.
    #[serde(default = "default_token_length")]
    pub token_length: usize,

    /// Length of the user token at the start of a client username.
    #[serde(default = "default_token_length")]
    pub user_token_length: usize,

    /// Keyspaces shared by all tenants and never namespaced.
    #[serde(default = "default_global_keyspaces")]
    pub global_keyspaces: Vec<String>,

    /// Backend principals visible to all tenants and never namespaced.
    #[serde(default)]
    pub global_principals: Vec<String>,

    /// Catalog relations filtered in addition to the built-in ones.
    #[serde(default)]
    pub protected_relations: Vec<ProtectedRelationConfig>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            token_length: default_token_length(),
            user_token_length: default_token_length(),
            global_keyspaces: default_global_keyspaces(),
            global_principals: Vec::new(),
            protected_relations: Vec::new(),
        }
    }
}

impl NamespaceConfig {
    /// Whether a canonical keyspace name is shared by all tenants.
    pub fn is_global_keyspace(&self, keyspace: &str) -> bool {
        self.global_keyspaces.iter().any(|k| k == keyspace)
    }

    /// Whether a principal name is shared by all tenants.
    pub fn is_global_principal(&self, principal: &str) -> bool {
        self.global_principals.iter().any(|p| p == principal)
    }

    /// Add a global keyspace.
    pub fn with_global_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.global_keyspaces.push(keyspace.into());
        self
    }

    /// Add a global principal.
    pub fn with_global_principal(mut self, principal: impl Into<String>) -> Self {
        self.global_principals.push(principal.into());
        self
    }
}

/// A catalog table whose rows name tenant-owned objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRelationConfig {
    pub keyspace: String,
    pub table: String,
    pub columns: Vec<ProtectedColumnConfig>,
}

/// A column identifying the owner of a catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedColumnConfig {
    pub name: String,
    pub kind: IdentifierKind,
}

/// What kind of name a catalog column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    /// A keyspace name.
    Keyspace,
    /// A user or role name.
    Principal,
    /// A permission resource such as `data/ks/table` or `<keyspace ks>`.
    Resource,
}

fn default_token_length() -> usize {
    20
}

fn default_global_keyspaces() -> Vec<String> {
    vec![
        "system".to_string(),
        "system_auth".to_string(),
        "system_traces".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_globals() {
        let config = NamespaceConfig::default();
        assert!(config.is_global_keyspace("system"));
        assert!(config.is_global_keyspace("system_auth"));
        assert!(config.is_global_keyspace("system_traces"));
        assert!(!config.is_global_keyspace("System"));
        assert!(!config.is_global_principal("cassandra"));
    }

    #[test]
    fn test_builders() {
        let config = NamespaceConfig::default()
            .with_global_keyspace("system_schema")
            .with_global_principal("monitoring");
        assert!(config.is_global_keyspace("system_schema"));
        assert!(config.is_global_principal("monitoring"));
    }

    #[test]
    fn test_protected_relation_yaml() {
        let yaml = r#"
keyspace: system
table: peers_audit
columns:
  - name: keyspace_name
    kind: keyspace
  - name: owner
    kind: principal
"#;
        let relation: ProtectedRelationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(relation.columns.len(), 2);
        assert_eq!(relation.columns[1].kind, IdentifierKind::Principal);
    }
}
