//! Per-tenant filtering of catalog result rows.

use cqlgate_core::{IdentifierKind, Namespace, NamespaceConfig};
use std::sync::Arc;

use super::catalog::{ProtectedCatalog, ProtectedRelation, RelationName};
use super::resource::map_resource;
use crate::scope::{Ownership, TenantScope};

/// Rows left after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredRows<C> {
    pub rows: Vec<Vec<Option<C>>>,
    /// Number of rows removed.
    pub dropped: usize,
}

/// Filters catalog rows down to what one tenant may see.
#[derive(Debug, Clone)]
pub struct MetadataVirtualizer {
    config: Arc<NamespaceConfig>,
    catalog: Arc<ProtectedCatalog>,
}

impl MetadataVirtualizer {
    pub fn new(config: Arc<NamespaceConfig>) -> Self {
        let catalog = Arc::new(ProtectedCatalog::from_config(&config));
        Self { config, catalog }
    }

    pub fn with_catalog(config: Arc<NamespaceConfig>, catalog: Arc<ProtectedCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn catalog(&self) -> &ProtectedCatalog {
        &self.catalog
    }

    pub fn is_protected(&self, relation: &RelationName) -> bool {
        self.catalog.is_protected(relation)
    }

    /// Keep global rows and the tenant's own rows (with the token stripped
    /// from identifying cells), drop everything else. Row order is kept.
    ///
    /// `columns` are the result's column names in order. Rows of a relation
    /// that is not protected are returned untouched. When none of the
    /// identifying columns is part of the result, ownership cannot be
    /// established and every row is dropped.
    pub fn filter_rows<C, S>(
        &self,
        namespace: &Namespace,
        relation: &RelationName,
        columns: &[S],
        rows: Vec<Vec<Option<C>>>,
    ) -> FilteredRows<C>
    where
        C: AsRef<[u8]> + From<Vec<u8>>,
        S: AsRef<str>,
    {
        let Some(protected) = self.catalog.get(&relation.keyspace, &relation.table) else {
            return FilteredRows { rows, dropped: 0 };
        };

        let identifying = identifying_columns(protected, columns);
        let total = rows.len();

        if identifying.is_empty() {
            if total > 0 {
                tracing::warn!(
                    relation = %relation,
                    rows = total,
                    "Catalog result has no identifying column, dropping all rows"
                );
            }
            return FilteredRows {
                rows: Vec::new(),
                dropped: total,
            };
        }

        let scope = TenantScope::new(namespace, &self.config);
        let kept: Vec<_> = rows
            .into_iter()
            .filter_map(|row| translate_row(&scope, &identifying, row))
            .collect();

        let dropped = total - kept.len();
        if dropped > 0 {
            tracing::debug!(relation = %relation, dropped, "Filtered catalog rows");
        }

        FilteredRows {
            rows: kept,
            dropped,
        }
    }
}

fn identifying_columns<S: AsRef<str>>(
    relation: &ProtectedRelation,
    columns: &[S],
) -> Vec<(usize, IdentifierKind)> {
    columns
        .iter()
        .enumerate()
        .filter_map(|(index, name)| {
            relation
                .column_kind(name.as_ref())
                .map(|kind| (index, kind))
        })
        .collect()
}

fn translate_row<C>(
    scope: &TenantScope<'_>,
    identifying: &[(usize, IdentifierKind)],
    mut row: Vec<Option<C>>,
) -> Option<Vec<Option<C>>>
where
    C: AsRef<[u8]> + From<Vec<u8>>,
{
    for &(index, kind) in identifying {
        let Some(Some(cell)) = row.get(index) else {
            // NULL or missing cells carry no owner.
            continue;
        };
        let value = std::str::from_utf8(cell.as_ref()).ok()?;
        let replacement = logical_value(scope, kind, value)?;
        if let Some(replacement) = replacement {
            row[index] = Some(C::from(replacement.into_bytes()));
        }
    }
    Some(row)
}

/// `None` drops the row; `Some(None)` keeps the cell as is.
fn logical_value(
    scope: &TenantScope<'_>,
    kind: IdentifierKind,
    value: &str,
) -> Option<Option<String>> {
    match kind {
        IdentifierKind::Keyspace => match scope.keyspace_ownership(value) {
            Ownership::Global => Some(None),
            Ownership::Owned(logical) => Some(Some(logical.to_string())),
            Ownership::Foreign => None,
        },
        IdentifierKind::Principal => match scope.principal_ownership(value) {
            Ownership::Global => Some(None),
            Ownership::Owned(logical) => Some(Some(logical.to_string())),
            Ownership::Foreign => None,
        },
        IdentifierKind::Resource => {
            let mapped = map_resource(
                value,
                |ks| match scope.keyspace_ownership(ks) {
                    Ownership::Global => Some(ks.to_string()),
                    Ownership::Owned(logical) => Some(logical.to_string()),
                    Ownership::Foreign => None,
                },
                |role| match scope.principal_ownership(role) {
                    Ownership::Global => Some(role.to_string()),
                    Ownership::Owned(logical) => Some(logical.to_string()),
                    Ownership::Foreign => None,
                },
            )?;
            Some((mapped != value).then_some(mapped))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: &str = "a1111111111111111111";
    const B: &str = "b2222222222222222222";

    fn cell(value: &str) -> Option<Vec<u8>> {
        Some(value.as_bytes().to_vec())
    }

    fn text(cell: &Option<Vec<u8>>) -> Option<String> {
        cell.as_ref()
            .map(|v| String::from_utf8(v.clone()).unwrap())
    }

    fn virtualizer() -> MetadataVirtualizer {
        MetadataVirtualizer::new(Arc::new(NamespaceConfig::default()))
    }

    #[test]
    fn test_schema_keyspaces_are_filtered() {
        let ns = Namespace::new(A, 20).unwrap();
        let relation = RelationName::new("system", "schema_keyspaces");
        let columns = ["keyspace_name", "durable_writes"];
        let rows = vec![
            vec![cell("system"), cell("true")],
            vec![cell(&format!("{A}foo")), cell("true")],
            vec![cell(&format!("{B}bar")), cell("true")],
            vec![cell("system_auth"), cell("true")],
            vec![cell(&format!("{A}zed")), cell("false")],
        ];

        let filtered = virtualizer().filter_rows(&ns, &relation, &columns, rows);
        let names: Vec<_> = filtered.rows.iter().map(|r| text(&r[0]).unwrap()).collect();
        assert_eq!(names, vec!["system", "foo", "system_auth", "zed"]);
        assert_eq!(filtered.dropped, 1);
        assert_eq!(text(&filtered.rows[3][1]).unwrap(), "false");
    }

    #[test]
    fn test_unprotected_relation_is_untouched() {
        let ns = Namespace::new(A, 20).unwrap();
        let relation = RelationName::new(format!("{A}foo"), "t");
        let rows = vec![vec![cell(&format!("{B}bar"))]];
        let filtered = virtualizer().filter_rows(&ns, &relation, &["keyspace_name"], rows.clone());
        assert_eq!(filtered.rows, rows);
    }

    #[test]
    fn test_users_show_only_tenant_principals() {
        let ns = Namespace::new(A, 20).unwrap();
        let relation = RelationName::new("system_auth", "users");
        let rows = vec![
            vec![cell("cassandra"), cell("true")],
            vec![cell(&format!("{A}cassandra")), cell("true")],
            vec![cell(&format!("{A}bob")), cell("false")],
            vec![cell(&format!("{B}cassandra")), cell("true")],
        ];
        let filtered = virtualizer().filter_rows(&ns, &relation, &["name", "super"], rows);
        let names: Vec<_> = filtered.rows.iter().map(|r| text(&r[0]).unwrap()).collect();
        assert_eq!(names, vec!["cassandra", "bob"]);
        assert_eq!(filtered.dropped, 2);
    }

    #[test]
    fn test_permissions_need_every_column_to_pass() {
        let ns = Namespace::new(A, 20).unwrap();
        let relation = RelationName::new("system_auth", "permissions");
        let columns = ["username", "resource", "permission"];
        let rows = vec![
            vec![cell(&format!("{A}bob")), cell(&format!("<keyspace {A}foo>")), cell("SELECT")],
            vec![cell(&format!("{A}bob")), cell("<all keyspaces>"), cell("MODIFY")],
            vec![cell(&format!("{A}bob")), cell(&format!("<table {B}x.y>")), cell("SELECT")],
            vec![cell(&format!("{B}eve")), cell(&format!("<keyspace {A}foo>")), cell("SELECT")],
        ];
        let filtered = virtualizer().filter_rows(&ns, &relation, &columns, rows);
        assert_eq!(filtered.rows.len(), 2);
        assert_eq!(text(&filtered.rows[0][1]).unwrap(), "<keyspace foo>");
        assert_eq!(text(&filtered.rows[1][1]).unwrap(), "<all keyspaces>");
    }

    #[test]
    fn test_null_identifier_passes() {
        let ns = Namespace::new(A, 20).unwrap();
        let relation = RelationName::new("system_schema", "tables");
        let rows = vec![vec![None, cell("t")]];
        let filtered =
            virtualizer().filter_rows(&ns, &relation, &["keyspace_name", "table_name"], rows);
        assert_eq!(filtered.rows.len(), 1);
    }

    #[test]
    fn test_missing_identifying_column_drops_everything() {
        let ns = Namespace::new(A, 20).unwrap();
        let relation = RelationName::new("system", "schema_keyspaces");
        let rows = vec![vec![cell("3")]];
        let filtered = virtualizer().filter_rows(&ns, &relation, &["count"], rows);
        assert!(filtered.rows.is_empty());
        assert_eq!(filtered.dropped, 1);
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let ns = Namespace::new(A, 20).unwrap();
        let relation = RelationName::new("system", "schema_keyspaces");
        let rows = vec![vec![Some(vec![0xff, 0xfe])]];
        let filtered = virtualizer().filter_rows(&ns, &relation, &["keyspace_name"], rows);
        assert!(filtered.rows.is_empty());
    }
}
