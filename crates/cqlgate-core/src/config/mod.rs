//! Configuration types for cqlgate.
//!
//! Everything is read from a single YAML file (`cqlgate.yaml` by convention):
//!
//! ```yaml
//! proxy:
//!   listen_port: 9042
//! backend:
//!   host: cassandra.internal
//!   port: 9043
//! namespace:
//!   token_length: 20
//! registry:
//!   source: backend
//!   password_env: CQLGATE_REGISTRY_PASSWORD
//! audit:
//!   directory: /var/log/cqlgate
//! ```
//!
//! Every section is optional and falls back to its `Default`.

pub mod audit;
pub mod logging;
pub mod namespace;
pub mod proxy;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use audit::AuditConfig;
pub use logging::LoggingConfig;
pub use namespace::{IdentifierKind, NamespaceConfig, ProtectedColumnConfig, ProtectedRelationConfig};
pub use proxy::{BackendConfig, ProxyConfig};
pub use registry::{BackendRegistryConfig, FileRegistryConfig, RegistryConfig};

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Client-facing listener.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Shared backend cluster.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tenant namespace layout and catalog virtualization.
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Token registry source.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Audit logging.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Diagnostic logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayConfig {
    /// Load configuration from a YAML file.
    ///
    /// A relative `registry.path` is resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        if let RegistryConfig::File(file) = &mut config.registry {
            if file.path.is_relative() {
                if let Some(base_dir) = path.parent() {
                    file.path = base_dir.join(&file.path);
                }
            }
        }

        Ok(config)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Check settings that serde alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.token_length == 0 {
            return Err(ConfigError::Config(
                "namespace.token_length must be greater than zero".to_string(),
            ));
        }
        if self.namespace.user_token_length == 0 {
            return Err(ConfigError::Config(
                "namespace.user_token_length must be greater than zero".to_string(),
            ));
        }
        if self.namespace.global_keyspaces.is_empty() {
            return Err(ConfigError::Config(
                "namespace.global_keyspaces must list the backend system keyspaces".to_string(),
            ));
        }
        if self.backend.max_connections == 0 {
            return Err(ConfigError::Config(
                "backend.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.proxy.max_connections == 0 {
            return Err(ConfigError::Config(
                "proxy.max_connections must be greater than zero".to_string(),
            ));
        }

        match &self.registry {
            RegistryConfig::Backend(backend) => {
                if !(1..=4).contains(&backend.protocol_version) {
                    return Err(ConfigError::Config(format!(
                        "registry.protocol_version {} is not supported (1-4)",
                        backend.protocol_version
                    )));
                }
                backend.resolve_password()?;
            }
            RegistryConfig::File(file) => {
                if file.path.as_os_str().is_empty() {
                    return Err(ConfigError::Config("registry.path is empty".to_string()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = GatewayConfig::from_yaml("{}").unwrap();
        assert_eq!(config.proxy.listen_port, 9042);
        assert_eq!(config.backend.port, 9043);
        assert_eq!(config.namespace.token_length, 20);
        assert!(matches!(config.registry, RegistryConfig::Backend(_)));
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
proxy:
  listen_addr: 127.0.0.1
  listen_port: 19042
backend:
  host: db.internal
  port: 19043
  request_timeout_secs: 3
namespace:
  global_keyspaces: [system, system_auth, system_traces, system_schema]
registry:
  source: backend
  username: registry
  password: hunter2
audit:
  enabled: false
logging:
  filter: cqlgate_proxy=debug
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.proxy.bind_address(), "127.0.0.1:19042");
        assert_eq!(config.backend.address(), "db.internal:19043");
        assert!(config.namespace.is_global_keyspace("system_schema"));
        assert!(!config.audit.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_registry_password() {
        let config = GatewayConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_protocol_version() {
        let yaml = "registry:\n  source: backend\n  password: x\n  protocol_version: 5\n";
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_resolves_registry_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("cqlgate.yaml");
        let mut file = fs::File::create(&config_path).unwrap();
        writeln!(file, "registry:\n  source: file\n  path: tenants.yaml").unwrap();

        let config = GatewayConfig::from_file(&config_path).unwrap();
        match config.registry {
            RegistryConfig::File(file) => assert_eq!(file.path, dir.path().join("tenants.yaml")),
            RegistryConfig::Backend(_) => panic!("expected file registry"),
        }
    }
}
