//! The catalog relations whose rows must be filtered per tenant.

use cqlgate_core::{IdentifierKind, NamespaceConfig};
use std::fmt;

/// A backend relation, by physical keyspace and table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationName {
    pub keyspace: String,
    pub table: String,
}

impl RelationName {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.table)
    }
}

/// A catalog table and the columns that name the owner of each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRelation {
    pub name: RelationName,
    pub columns: Vec<(String, IdentifierKind)>,
}

impl ProtectedRelation {
    fn new(keyspace: &str, table: &str, columns: &[(&str, IdentifierKind)]) -> Self {
        Self {
            name: RelationName::new(keyspace, table),
            columns: columns
                .iter()
                .map(|(column, kind)| (column.to_string(), *kind))
                .collect(),
        }
    }

    /// Kind of an identifying column, if `column` is one.
    pub fn column_kind(&self, column: &str) -> Option<IdentifierKind> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, kind)| *kind)
    }
}

/// Lookup table of protected relations.
#[derive(Debug, Clone)]
pub struct ProtectedCatalog {
    relations: Vec<ProtectedRelation>,
}

impl Default for ProtectedCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProtectedCatalog {
    /// The schema and auth tables of Cassandra 2.x and 3.x.
    pub fn builtin() -> Self {
        use IdentifierKind::{Keyspace, Principal, Resource};

        let mut relations = Vec::new();

        for table in [
            "schema_keyspaces",
            "schema_columnfamilies",
            "schema_columns",
            "schema_triggers",
            "schema_usertypes",
            "schema_functions",
            "schema_aggregates",
            "size_estimates",
            "compaction_history",
        ] {
            relations.push(ProtectedRelation::new(
                "system",
                table,
                &[("keyspace_name", Keyspace)],
            ));
        }
        relations.push(ProtectedRelation::new(
            "system",
            "IndexInfo",
            &[("table_name", Keyspace)],
        ));

        for table in [
            "keyspaces",
            "tables",
            "columns",
            "dropped_columns",
            "types",
            "views",
            "indexes",
            "triggers",
            "functions",
            "aggregates",
        ] {
            relations.push(ProtectedRelation::new(
                "system_schema",
                table,
                &[("keyspace_name", Keyspace)],
            ));
        }

        relations.push(ProtectedRelation::new(
            "system_auth",
            "users",
            &[("name", Principal)],
        ));
        relations.push(ProtectedRelation::new(
            "system_auth",
            "credentials",
            &[("username", Principal)],
        ));
        relations.push(ProtectedRelation::new(
            "system_auth",
            "permissions",
            &[("username", Principal), ("resource", Resource)],
        ));
        relations.push(ProtectedRelation::new(
            "system_auth",
            "roles",
            &[("role", Principal)],
        ));
        relations.push(ProtectedRelation::new(
            "system_auth",
            "role_permissions",
            &[("role", Principal), ("resource", Resource)],
        ));
        relations.push(ProtectedRelation::new(
            "system_auth",
            "role_members",
            &[("role", Principal), ("member", Principal)],
        ));
        relations.push(ProtectedRelation::new(
            "system_auth",
            "resource_role_permissons_index",
            &[("resource", Resource), ("role", Principal)],
        ));

        Self { relations }
    }

    /// Built-in relations plus those configured under
    /// `namespace.protected_relations`. A configured relation replaces a
    /// built-in one with the same name.
    pub fn from_config(config: &NamespaceConfig) -> Self {
        let mut catalog = Self::builtin();
        for extra in &config.protected_relations {
            let relation = ProtectedRelation {
                name: RelationName::new(&extra.keyspace, &extra.table),
                columns: extra
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.kind))
                    .collect(),
            };
            catalog.relations.retain(|r| r.name != relation.name);
            catalog.relations.push(relation);
        }
        catalog
    }

    pub fn get(&self, keyspace: &str, table: &str) -> Option<&ProtectedRelation> {
        self.relations
            .iter()
            .find(|r| r.name.keyspace == keyspace && r.name.table == table)
    }

    pub fn is_protected(&self, relation: &RelationName) -> bool {
        self.get(&relation.keyspace, &relation.table).is_some()
    }

    pub fn relations(&self) -> &[ProtectedRelation] {
        &self.relations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlgate_core::config::{ProtectedColumnConfig, ProtectedRelationConfig};

    #[test]
    fn test_builtin_relations() {
        let catalog = ProtectedCatalog::builtin();
        let keyspaces = catalog.get("system", "schema_keyspaces").unwrap();
        assert_eq!(
            keyspaces.column_kind("keyspace_name"),
            Some(IdentifierKind::Keyspace)
        );
        assert!(catalog.get("system_schema", "tables").is_some());
        assert!(catalog.get("system", "IndexInfo").is_some());
        assert!(catalog.get("system", "indexinfo").is_none());
        assert!(catalog.get("system", "local").is_none());

        let permissions = catalog.get("system_auth", "permissions").unwrap();
        assert_eq!(
            permissions.column_kind("resource"),
            Some(IdentifierKind::Resource)
        );
        assert_eq!(permissions.column_kind("permissions"), None);
    }

    #[test]
    fn test_configured_relation_replaces_builtin() {
        let mut config = NamespaceConfig::default();
        config.protected_relations.push(ProtectedRelationConfig {
            keyspace: "system".to_string(),
            table: "size_estimates".to_string(),
            columns: vec![ProtectedColumnConfig {
                name: "ks".to_string(),
                kind: IdentifierKind::Keyspace,
            }],
        });
        config.protected_relations.push(ProtectedRelationConfig {
            keyspace: "ops".to_string(),
            table: "tenant_usage".to_string(),
            columns: vec![ProtectedColumnConfig {
                name: "keyspace".to_string(),
                kind: IdentifierKind::Keyspace,
            }],
        });

        let catalog = ProtectedCatalog::from_config(&config);
        let builtin_len = ProtectedCatalog::builtin().relations().len();
        assert_eq!(catalog.relations().len(), builtin_len + 1);
        assert_eq!(
            catalog
                .get("system", "size_estimates")
                .unwrap()
                .column_kind("ks"),
            Some(IdentifierKind::Keyspace)
        );
        assert!(catalog.is_protected(&RelationName::new("ops", "tenant_usage")));
    }
}
