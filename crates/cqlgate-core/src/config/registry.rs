//! Token registry source settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ConfigError;

/// Where tenant records are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RegistryConfig {
    /// The token table stored in the backend itself.
    Backend(BackendRegistryConfig),
    /// A static YAML file of tenant records.
    File(FileRegistryConfig),
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::Backend(BackendRegistryConfig::default())
    }
}

/// Token table in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRegistryConfig {
    /// Keyspace holding the token table.
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    /// Token table name.
    #[serde(default = "default_table")]
    pub table: String,

    /// Backend user allowed to read the token table.
    #[serde(default = "default_username")]
    pub username: String,

    /// Password of `username`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Native protocol version used for registry lookups.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u8,
}

impl Default for BackendRegistryConfig {
    fn default() -> Self {
        Self {
            keyspace: default_keyspace(),
            table: default_table(),
            username: default_username(),
            password: None,
            password_env: None,
            protocol_version: default_protocol_version(),
        }
    }
}

impl BackendRegistryConfig {
    /// The registry password, reading `password_env` when set.
    pub fn resolve_password(&self) -> Result<String, ConfigError> {
        match (&self.password, &self.password_env) {
            (Some(_), Some(_)) => Err(ConfigError::Config(
                "registry: set either password or password_env, not both".to_string(),
            )),
            (Some(password), None) => Ok(password.clone()),
            (None, Some(var)) => std::env::var(var).map_err(|_| {
                ConfigError::Config(format!("registry: environment variable {var} is not set"))
            }),
            (None, None) => Err(ConfigError::Config(
                "registry: password or password_env is required".to_string(),
            )),
        }
    }
}

/// Static tenant file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRegistryConfig {
    /// Path to the YAML file, relative to the config file.
    pub path: PathBuf,
}

fn default_keyspace() -> String {
    "multitenantcassandra".to_string()
}

fn default_table() -> String {
    "tokentable".to_string()
}

fn default_username() -> String {
    "cassandra".to_string()
}

fn default_protocol_version() -> u8 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_backend_table() {
        match RegistryConfig::default() {
            RegistryConfig::Backend(backend) => {
                assert_eq!(backend.keyspace, "multitenantcassandra");
                assert_eq!(backend.table, "tokentable");
                assert_eq!(backend.protocol_version, 3);
            }
            RegistryConfig::File(_) => panic!("expected backend registry"),
        }
    }

    #[test]
    fn test_tagged_file_source() {
        let yaml = "source: file\npath: tenants.yaml\n";
        let config: RegistryConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config, RegistryConfig::File(f) if f.path == PathBuf::from("tenants.yaml")));
    }

    #[test]
    fn test_resolve_password() {
        let inline = BackendRegistryConfig {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        assert_eq!(inline.resolve_password().unwrap(), "secret");

        let missing = BackendRegistryConfig::default();
        assert!(matches!(missing.resolve_password(), Err(ConfigError::Config(_))));

        let both = BackendRegistryConfig {
            password: Some("a".to_string()),
            password_env: Some("CQLGATE_TEST_UNUSED".to_string()),
            ..Default::default()
        };
        assert!(both.resolve_password().is_err());
    }
}
