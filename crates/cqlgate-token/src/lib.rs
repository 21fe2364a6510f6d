//! # cqlgate-token
//!
//! Turns the credentials a CQL client presents into a resolved tenant.
//!
//! A client authenticates with an unmodified driver by putting its public
//! user token in front of the backend user name:
//!
//! ```text
//! username = 0123456789abcdef0123cassandra
//!            └──── user token ────┘└ principal ┘
//! password = <that principal's password>
//! ```
//!
//! The user token is looked up in a [`TokenRegistry`]; the resulting
//! [`TenantRecord`](cqlgate_core::TenantRecord) supplies the internal token
//! that namespaces the principal on the backend.
//!
//! Unknown tokens, expired tokens and malformed records all surface as the
//! same [`TokenError`] class so the client cannot tell them apart.

pub mod credentials;
pub mod error;
pub mod file;
pub mod registry;

pub use credentials::GatewayCredentials;
pub use error::TokenError;
pub use file::StaticTokenRegistry;
pub use registry::{ResolvedTenant, TenantResolver, TokenRegistry};
