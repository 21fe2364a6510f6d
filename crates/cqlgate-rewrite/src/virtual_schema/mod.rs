//! Catalog virtualization.
//!
//! Each tenant sees the shared catalog tables as if it were alone on the
//! cluster: rows naming other tenants' keyspaces or principals are removed
//! and the tenant's own names lose their internal token.

pub mod catalog;
pub mod resource;
pub mod virtualizer;

pub use catalog::{ProtectedCatalog, ProtectedRelation, RelationName};
pub use resource::map_resource;
pub use virtualizer::{FilteredRows, MetadataVirtualizer};
