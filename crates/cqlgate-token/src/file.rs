//! Static tenant registry loaded from YAML.
//!
//! ```yaml
//! tenants:
//!   - user_token: 0123456789abcdef0123
//!     internal_token: a1111111111111111111
//!     owner_id: alice@example.com
//!     comment: staging tenant
//!     expires_at: 2027-01-01T00:00:00Z
//! ```

use async_trait::async_trait;
use cqlgate_core::TenantRecord;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::TokenError;
use crate::registry::TokenRegistry;

#[derive(Debug, Deserialize)]
struct TenantFile {
    #[serde(default)]
    tenants: Vec<TenantRecord>,
}

/// Registry backed by an in-memory map, read once at startup.
#[derive(Debug, Default)]
pub struct StaticTokenRegistry {
    records: HashMap<String, TenantRecord>,
}

impl StaticTokenRegistry {
    /// Build a registry from records. Later duplicates replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.user_token.clone(), record))
            .collect();
        Self { records }
    }

    /// Load records from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TokenError::Registry(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse records from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, TokenError> {
        let file: TenantFile = serde_yaml::from_str(content)
            .map_err(|e| TokenError::Registry(format!("invalid tenant file: {e}")))?;
        Ok(Self::from_records(file.tenants))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenRegistry for StaticTokenRegistry {
    async fn lookup(&self, user_token: &str) -> Result<Option<TenantRecord>, TokenError> {
        Ok(self.records.get(user_token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
tenants:
  - user_token: 0123456789abcdef0123
    internal_token: a1111111111111111111
    owner_id: alice@example.com
  - user_token: fedcba9876543210fedc
    internal_token: b2222222222222222222
    owner_id: bob@example.com
    comment: second tenant
    expires_at: 2030-01-01T00:00:00Z
"#;

    #[tokio::test]
    async fn test_lookup_from_yaml() {
        let registry = StaticTokenRegistry::from_yaml(YAML).unwrap();
        assert_eq!(registry.len(), 2);

        let bob = registry.lookup("fedcba9876543210fedc").await.unwrap().unwrap();
        assert_eq!(bob.internal_token, "b2222222222222222222");
        assert_eq!(bob.comment.as_deref(), Some("second tenant"));
        assert!(bob.expires_at.is_some());

        assert!(registry.lookup("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let registry = StaticTokenRegistry::from_file(file.path()).unwrap();
        assert!(registry.lookup("0123456789abcdef0123").await.unwrap().is_some());
    }

    #[test]
    fn test_missing_file_is_registry_error() {
        let result = StaticTokenRegistry::from_file("/nonexistent/tenants.yaml");
        assert!(matches!(result, Err(TokenError::Registry(_))));
    }

    #[test]
    fn test_empty_file() {
        let registry = StaticTokenRegistry::from_yaml("tenants: []").unwrap();
        assert!(registry.is_empty());
    }
}
