//! Backend connections reused across sessions of the same principal.
//!
//! Connections are keyed by everything that was fixed at STARTUP: protocol
//! version, login and startup options. The selected keyspace is mutable
//! state and is synchronised with `USE` at checkout.

use cqlgate_core::BackendConfig;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use super::connection::{BackendConnection, BackendLogin};
use crate::error::BackendError;

/// What a pooled connection was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub version: u8,
    pub options: Vec<(String, String)>,
    pub login: Option<BackendLogin>,
}

impl ConnectionSpec {
    pub fn new(version: u8, options: Vec<(String, String)>) -> Self {
        Self {
            version,
            options,
            login: None,
        }
    }

    pub fn with_login(mut self, login: BackendLogin) -> Self {
        self.login = Some(login);
        self
    }

    pub fn key(&self) -> PoolKey {
        let (username, password_digest) = match &self.login {
            Some(login) => (
                Some(login.username.clone()),
                Sha256::digest(login.password.as_bytes()).into(),
            ),
            None => (None, [0u8; 32]),
        };

        let mut options: Vec<_> = self.options.iter().collect();
        options.sort();
        let mut hasher = Sha256::new();
        for (name, value) in options {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }

        PoolKey {
            version: self.version,
            username,
            password_digest,
            options_digest: hasher.finalize().into(),
        }
    }
}

/// Identity of interchangeable connections. Holds no plaintext password.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    version: u8,
    username: Option<String>,
    password_digest: [u8; 32],
    options_digest: [u8; 32],
}

pub struct BackendPool {
    config: BackendConfig,
    max_frame_bytes: usize,
    idle: Mutex<HashMap<PoolKey, Vec<BackendConnection>>>,
    permits: Arc<Semaphore>,
}

impl BackendPool {
    pub fn new(config: BackendConfig, max_frame_bytes: usize) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.max_connections));
        Arc::new(Self {
            config,
            max_frame_bytes,
            idle: Mutex::new(HashMap::new()),
            permits,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Log `spec` in on a new backend connection and keep it idle.
    ///
    /// Idle connections are never used for this, so every client login is
    /// checked by the backend. A rejected login closes the idle connections
    /// opened with the same credentials.
    pub async fn login(self: &Arc<Self>, spec: &ConnectionSpec) -> Result<(), BackendError> {
        let permit = self.permit().await?;
        let key = spec.key();
        match self.open(spec).await {
            Ok(connection) => {
                self.put_back(key, connection);
                drop(permit);
                Ok(())
            }
            Err(e) => {
                if matches!(e, BackendError::Rejected(_)) {
                    self.evict(&key);
                }
                Err(e)
            }
        }
    }

    /// Check out a connection for `spec` with `keyspace` (physical) selected.
    ///
    /// A session without a keyspace never receives a connection that has one.
    pub async fn acquire(
        self: &Arc<Self>,
        spec: &ConnectionSpec,
        keyspace: Option<&str>,
    ) -> Result<PooledConnection, BackendError> {
        let permit = self.permit().await?;
        let key = spec.key();
        let connection = match self.take_idle(&key, keyspace) {
            Some(connection) => connection,
            None => self.open(spec).await?,
        };

        let mut pooled = PooledConnection {
            connection,
            lease: Lease {
                key,
                pool: Arc::clone(self),
                _permit: permit,
            },
        };

        if let Some(keyspace) = keyspace {
            if pooled.keyspace() != Some(keyspace) {
                if let Err(e) = pooled.use_keyspace(keyspace).await {
                    if matches!(e, BackendError::Rejected(_)) {
                        pooled.release();
                    }
                    return Err(e);
                }
            }
        }

        Ok(pooled)
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, BackendError> {
        timeout(
            self.config.connect_timeout(),
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| BackendError::Timeout("waiting for a free backend connection"))?
        .map_err(|_| BackendError::Unexpected("backend pool is closed".to_string()))
    }

    async fn open(&self, spec: &ConnectionSpec) -> Result<BackendConnection, BackendError> {
        tracing::debug!(
            username = spec.login.as_ref().map(|l| l.username.as_str()).unwrap_or("-"),
            "Opening backend connection"
        );
        BackendConnection::open(
            &self.config,
            spec.version,
            self.max_frame_bytes,
            &spec.options,
            spec.login.as_ref(),
        )
        .await
    }

    fn evict(&self, key: &PoolKey) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(closed) = idle.remove(key) {
            tracing::debug!(count = closed.len(), "Closed idle connections after a rejected login");
        }
    }

    fn take_idle(&self, key: &PoolKey, keyspace: Option<&str>) -> Option<BackendConnection> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let connections = idle.get_mut(key)?;

        let position = match keyspace {
            Some(keyspace) => connections
                .iter()
                .position(|c| c.keyspace() == Some(keyspace))
                .or_else(|| connections.len().checked_sub(1)),
            None => connections.iter().rposition(|c| c.keyspace().is_none()),
        };
        position.map(|index| connections.swap_remove(index))
    }

    fn put_back(&self, key: PoolKey, connection: BackendConnection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let connections = idle.entry(key).or_default();
        if connections.len() < self.config.max_idle_per_principal {
            connections.push(connection);
        } else {
            tracing::trace!("Idle limit reached, closing backend connection");
        }
    }

    /// Connections currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        let idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.values().map(Vec::len).sum()
    }
}

struct Lease {
    key: PoolKey,
    pool: Arc<BackendPool>,
    _permit: OwnedSemaphorePermit,
}

/// A checked-out connection.
///
/// [`release`](Self::release) returns it to the pool. Dropping it instead
/// closes the connection, which is what must happen after any error.
pub struct PooledConnection {
    connection: BackendConnection,
    lease: Lease,
}

impl PooledConnection {
    pub fn release(self) {
        let Self { connection, lease } = self;
        lease.pool.put_back(lease.key, connection);
    }
}

impl Deref for PooledConnection {
    type Target = BackendConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}
