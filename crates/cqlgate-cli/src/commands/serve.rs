//! `cqlgate serve`: run the gateway.

use anyhow::Context;
use cqlgate_audit::AuditLogger;
use cqlgate_core::GatewayConfig;
use cqlgate_proxy::CqlGateway;
use std::path::Path;
use tokio::sync::watch;

pub async fn run(config_path: &Path, listen_port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!(config = %config_path.display(), "Loading configuration");
    let mut config = GatewayConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    if let Some(port) = listen_port {
        config.proxy.listen_port = port;
    }
    config.validate().context("invalid configuration")?;

    let audit = if config.audit.enabled {
        Some(AuditLogger::new(config.audit.clone()).context("failed to open the audit log")?)
    } else {
        None
    };

    tracing::info!(
        listen_address = %config.proxy.bind_address(),
        backend = %config.backend.address(),
        audit = config.audit.enabled,
        "Starting cqlgate"
    );

    let gateway = CqlGateway::from_config(config, audit).context("failed to build the gateway")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupt received, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    gateway.run(shutdown_rx).await?;
    Ok(())
}
