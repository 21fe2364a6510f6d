//! # cqlgate-proxy
//!
//! CQL native protocol gateway that lets many tenants share one Cassandra
//! cluster.
//!
//! Each client session:
//! - Authenticates with `<user token><principal>` and a password
//! - Gets the tenant's namespace from the token registry
//! - Has keyspace and principal names rewritten into that namespace
//! - Sees backend responses translated back to logical names, with other
//!   tenants' schema metadata removed
//! - Is audited through `cqlgate-audit`
//!
//! ## Architecture
//!
//! ```text
//!   CQL driver
//!       │  native protocol v1-v4, user token + principal as username
//!       ▼
//! ┌──────────────────────┐
//! │  cqlgate gateway     │
//! │  1. Resolve token    │  ← cqlgate-token
//! │  2. Rewrite names    │  ← cqlgate-rewrite
//! │  3. Forward          │  ← backend pool
//! │  4. Translate reply  │  ← cqlgate-rewrite virtual schema
//! │  5. Audit            │  ← cqlgate-audit
//! └──────────┬───────────┘
//!            ▼
//!     Shared Cassandra cluster
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use cqlgate_core::GatewayConfig;
//! use cqlgate_proxy::CqlGateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::from_file("cqlgate.yaml")?;
//!     let gateway = CqlGateway::from_config(config, None)?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     gateway.run(shutdown_rx).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod protocol;
pub mod proxy;
mod session;
pub mod translate;

pub use backend::{BackendPool, BackendTokenRegistry};
pub use error::{BackendError, GatewayError, WireError};
pub use proxy::CqlGateway;
