//! Gateway server.
//!
//! Accepts client connections and runs one session task per connection.
//! Everything sessions share lives in [`GatewayContext`].

use cqlgate_audit::AuditLogger;
use cqlgate_core::config::{GatewayConfig, NamespaceConfig, RegistryConfig};
use cqlgate_rewrite::{IdentifierRewriter, MetadataVirtualizer};
use cqlgate_token::{StaticTokenRegistry, TenantResolver, TokenRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};

use crate::backend::{BackendPool, BackendTokenRegistry};
use crate::error::GatewayError;
use crate::session;

/// State shared by all sessions.
pub(crate) struct GatewayContext {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) namespace: Arc<NamespaceConfig>,
    pub(crate) pool: Arc<BackendPool>,
    pub(crate) resolver: TenantResolver,
    pub(crate) rewriter: IdentifierRewriter,
    pub(crate) virtualizer: MetadataVirtualizer,
    pub(crate) audit: Arc<AuditLogger>,
}

/// The CQL multi-tenancy gateway.
pub struct CqlGateway {
    context: Arc<GatewayContext>,
}

impl CqlGateway {
    /// Create a gateway resolving tokens through `registry`.
    pub fn new(
        config: GatewayConfig,
        registry: Arc<dyn TokenRegistry>,
        audit: Option<AuditLogger>,
    ) -> Self {
        let pool = BackendPool::new(config.backend.clone(), config.proxy.max_frame_bytes);
        Self::with_pool(config, registry, pool, audit)
    }

    /// Create a gateway that shares `pool` with other components.
    pub fn with_pool(
        config: GatewayConfig,
        registry: Arc<dyn TokenRegistry>,
        pool: Arc<BackendPool>,
        audit: Option<AuditLogger>,
    ) -> Self {
        let namespace = Arc::new(config.namespace.clone());
        let context = GatewayContext {
            resolver: TenantResolver::new(registry, namespace.token_length),
            rewriter: IdentifierRewriter::new(Arc::clone(&namespace)),
            virtualizer: MetadataVirtualizer::new(Arc::clone(&namespace)),
            audit: Arc::new(audit.unwrap_or_else(AuditLogger::disabled)),
            config: Arc::new(config),
            namespace,
            pool,
        };

        Self {
            context: Arc::new(context),
        }
    }

    /// Build a gateway with the token registry named in `config`.
    pub fn from_config(config: GatewayConfig, audit: Option<AuditLogger>) -> Result<Self, GatewayError> {
        let pool = BackendPool::new(config.backend.clone(), config.proxy.max_frame_bytes);

        let registry: Arc<dyn TokenRegistry> = match &config.registry {
            RegistryConfig::File(file) => {
                let registry = StaticTokenRegistry::from_file(&file.path)?;
                tracing::info!(path = %file.path.display(), tenants = registry.len(), "Loaded token registry");
                Arc::new(registry)
            }
            RegistryConfig::Backend(backend) => {
                let password = backend
                    .resolve_password()
                    .map_err(|e| GatewayError::Internal(e.into()))?;
                tracing::info!(
                    keyspace = %backend.keyspace,
                    table = %backend.table,
                    "Using backend token registry"
                );
                Arc::new(BackendTokenRegistry::new(Arc::clone(&pool), backend, password))
            }
        };

        Ok(Self::with_pool(config, registry, pool, audit))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.context.config
    }

    /// Bind the configured address and serve until `shutdown` turns true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), GatewayError> {
        let address = self.context.config.proxy.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| GatewayError::BindFailed {
                address: address.clone(),
                source,
            })?;

        tracing::info!(
            address = %address,
            backend = %self.context.config.backend.address(),
            "Gateway listening"
        );
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), GatewayError> {
        let connections = Arc::new(Semaphore::new(self.context.config.proxy.max_connections));

        loop {
            let accepted = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("Gateway shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            let (socket, peer) = match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&connections).try_acquire_owned() else {
                tracing::warn!(peer = %peer, "Connection limit reached, refusing client");
                drop(socket);
                continue;
            };

            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
            }
            tracing::debug!(peer = %peer, "New connection");

            let context = Arc::clone(&self.context);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                session::serve(context, socket, peer, shutdown).await;
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlgate_core::config::FileRegistryConfig;
    use std::io::Write;

    #[test]
    fn test_gateway_creation() {
        let mut config = GatewayConfig::default();
        config.proxy.listen_port = 9043;

        let gateway = CqlGateway::new(config, Arc::new(StaticTokenRegistry::default()), None);
        assert_eq!(gateway.config().proxy.listen_port, 9043);
        assert!(!gateway.context.audit.is_enabled());
    }

    #[test]
    fn test_from_config_with_file_registry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tenants:\n  - user_token: \"0123456789abcdef0123\"\n    internal_token: \"a1111111111111111111\"\n    owner_id: \"alice\""
        )
        .unwrap();

        let mut config = GatewayConfig::default();
        config.registry = RegistryConfig::File(FileRegistryConfig {
            path: file.path().to_path_buf(),
        });

        assert!(CqlGateway::from_config(config, None).is_ok());
    }

    #[test]
    fn test_from_config_requires_registry_password() {
        let config = GatewayConfig::default();
        let result = CqlGateway::from_config(config, None);
        assert!(matches!(result, Err(GatewayError::Internal(_))));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let gateway = CqlGateway::new(
            GatewayConfig::default(),
            Arc::new(StaticTokenRegistry::default()),
            None,
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);

        let server = tokio::spawn(async move { gateway.serve(listener, rx).await });
        tx.send(true).unwrap();
        assert!(server.await.unwrap().is_ok());
    }
}
