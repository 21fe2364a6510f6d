//! # cqlgate-rewrite
//!
//! Statement classification and tenant namespace translation for cqlgate.
//!
//! This crate provides functionality to:
//! - Tokenize CQL while keeping the byte span of every token
//! - Classify the statements that name keyspaces, tables and principals
//! - Rewrite those names into the tenant's physical namespace
//! - Filter catalog rows so a tenant only sees its own objects
//!
//! ## How It Works
//!
//! For a tenant whose internal token is `a1b2...`:
//!
//! **Before (from client):**
//! ```text
//! CREATE KEYSPACE foo WITH replication = {...}
//! ```
//!
//! **After (to backend):**
//! ```text
//! CREATE KEYSPACE a1b2...foo WITH replication = {...}
//! ```
//!
//! ## Supported Statements
//!
//! | Statement | Rewritten names |
//! |-----------|-----------------|
//! | `USE`, `CREATE/ALTER/DROP KEYSPACE` | keyspace |
//! | table, index, type and trigger DDL | qualifying keyspace |
//! | materialized view, function and aggregate DDL | qualifying keyspace |
//! | `SELECT`, `INSERT`, `UPDATE`, `DELETE`, `BATCH` | qualifying keyspace, function calls, catalog `WHERE` literals and markers |
//! | `CREATE/ALTER/DROP USER` and `ROLE` | principal |
//! | `GRANT`, `REVOKE`, `LIST` | resource keyspace and principals |
//!
//! Anything else is forwarded unchanged, unless it names another tenant's
//! physical keyspace, in which case it is refused.

pub mod classifier;
pub mod error;
pub mod lexer;
pub mod rewriter;
pub mod scope;
pub mod statement;
pub mod virtual_schema;

pub use classifier::StatementClassifier;
pub use error::RewriteError;
pub use rewriter::{BoundName, IdentifierRewriter, RewrittenStatement};
pub use scope::{Ownership, TenantScope};
pub use statement::{ParsedStatement, Statement, Target, Verb};
pub use virtual_schema::{
    FilteredRows, MetadataVirtualizer, ProtectedCatalog, ProtectedRelation, RelationName,
};
