//! `cqlgate check`: validate a configuration file.

use anyhow::Context;
use cqlgate_core::GatewayConfig;
use cqlgate_core::config::RegistryConfig;
use std::path::Path;

pub fn run(config_path: &Path, print: bool) -> anyhow::Result<()> {
    println!("Checking {}", config_path.display());

    let config = GatewayConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    config.validate().context("configuration is invalid")?;

    for line in summary(&config) {
        println!("  {line}");
    }
    if print {
        println!();
        print!("{}", serde_yaml::to_string(&redacted(config))?);
    }

    println!("Configuration is valid.");
    Ok(())
}

fn summary(config: &GatewayConfig) -> Vec<String> {
    let registry = match &config.registry {
        RegistryConfig::Backend(backend) => format!(
            "backend table {}.{} (user {}, protocol v{})",
            backend.keyspace, backend.table, backend.username, backend.protocol_version
        ),
        RegistryConfig::File(file) => format!("file {}", file.path.display()),
    };

    vec![
        format!("listen:           {}", config.proxy.bind_address()),
        format!("backend:          {}", config.backend.address()),
        format!("registry:         {registry}"),
        format!("token length:     {}", config.namespace.token_length),
        format!("global keyspaces: {}", config.namespace.global_keyspaces.join(", ")),
        format!(
            "audit:            {}",
            if config.audit.enabled { "enabled" } else { "disabled" }
        ),
    ]
}

fn redacted(mut config: GatewayConfig) -> GatewayConfig {
    if let RegistryConfig::Backend(backend) = &mut config.registry {
        if backend.password.is_some() {
            backend.password = Some("<redacted>".to_string());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_file_registry() {
        let file = write_config(
            "proxy:\n  listen_port: 9043\nregistry:\n  source: file\n  path: tenants.yaml\n",
        );
        assert!(run(file.path(), false).is_ok());
    }

    #[test]
    fn test_missing_registry_password_fails() {
        let file = write_config("registry:\n  source: backend\n");
        assert!(run(file.path(), false).is_err());
    }

    #[test]
    fn test_summary_and_redaction() {
        let config = GatewayConfig::from_yaml(
            "registry:\n  source: backend\n  password: hunter2\n",
        )
        .unwrap();

        let lines = summary(&config);
        assert!(lines.iter().any(|l| l.contains("multitenantcassandra.tokentable")));
        assert!(lines.iter().any(|l| l.contains("system, system_auth, system_traces")));

        let printed = serde_yaml::to_string(&redacted(config)).unwrap();
        assert!(!printed.contains("hunter2"));
    }
}
