//! # cqlgate-core
//!
//! Types shared by every cqlgate crate:
//! - [`TenantRecord`]: the resolved owner of a session
//! - [`Namespace`]: the bijection between a tenant's logical names and the
//!   physical names stored in the shared backend
//! - [`config`]: the `cqlgate.yaml` configuration tree

pub mod config;
pub mod namespace;
pub mod tenant;

pub use config::{
    AuditConfig, BackendConfig, ConfigError, GatewayConfig, IdentifierKind, LoggingConfig,
    NamespaceConfig, ProtectedRelationConfig, ProxyConfig, RegistryConfig,
};
pub use namespace::{Namespace, NamespaceError};
pub use tenant::TenantRecord;
