//! Connections to the shared backend cluster.

pub mod connection;
pub mod pool;
pub mod registry;

pub use connection::{BackendConnection, BackendLogin, decode_response};
pub use pool::{BackendPool, ConnectionSpec, PoolKey, PooledConnection};
pub use registry::BackendTokenRegistry;
