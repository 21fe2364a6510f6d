//! Tenant scenarios across the rewriter, the scope and the catalog virtualizer.
//!
//! Statements are rewritten for one tenant and the catalog rows a backend
//! would then return are virtualized for another, with no network involved.

use cqlgate_core::Namespace;
use cqlgate_core::config::NamespaceConfig;
use cqlgate_rewrite::{
    IdentifierRewriter, MetadataVirtualizer, Ownership, RelationName, Target, Verb,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const A: &str = "a1111111111111111111";
const B: &str = "b2222222222222222222";

struct Fixture {
    config: Arc<NamespaceConfig>,
    rewriter: IdentifierRewriter,
    virtualizer: MetadataVirtualizer,
}

impl Fixture {
    fn new() -> Self {
        let config = Arc::new(NamespaceConfig::default());
        Self {
            rewriter: IdentifierRewriter::new(Arc::clone(&config)),
            virtualizer: MetadataVirtualizer::new(Arc::clone(&config)),
            config,
        }
    }

    fn rewrite(&self, tenant: &Namespace, raw: &str) -> String {
        self.rewriter.rewrite_request(tenant, None, raw).text
    }

    /// Keyspace names `tenant` sees in `system.schema_keyspaces`.
    fn visible_keyspaces(&self, tenant: &Namespace, physical: &[&str]) -> Vec<String> {
        let rows = physical
            .iter()
            .map(|name| vec![Some(name.as_bytes().to_vec())])
            .collect();
        self.virtualizer
            .filter_rows(
                tenant,
                &RelationName::new("system", "schema_keyspaces"),
                &["keyspace_name"],
                rows,
            )
            .rows
            .into_iter()
            .map(|row| String::from_utf8(row[0].clone().unwrap()).unwrap())
            .collect()
    }
}

fn tenant(token: &str) -> Namespace {
    Namespace::new(token, 20).unwrap()
}

#[test]
fn test_create_keyspace_is_invisible_to_other_tenants() {
    let fixture = Fixture::new();
    let (a, b) = (tenant(A), tenant(B));

    let created = fixture.rewrite(&a, "CREATE KEYSPACE foo WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 1}");
    assert!(created.starts_with(&format!("CREATE KEYSPACE {A}foo ")));

    let owned = format!("{A}foo");
    let backend = ["system", "system_auth", owned.as_str()];
    assert_eq!(fixture.visible_keyspaces(&a, &backend), vec!["system", "system_auth", "foo"]);
    assert_eq!(fixture.visible_keyspaces(&b, &backend), vec!["system", "system_auth"]);
}

#[test]
fn test_use_of_another_tenants_keyspace_stays_in_own_namespace() {
    let fixture = Fixture::new();

    assert_eq!(fixture.rewrite(&tenant(B), "USE foo"), format!("USE {B}foo"));
    assert_eq!(
        fixture.rewrite(&tenant(B), &format!("USE {A}foo")),
        format!("USE {B}{A}foo")
    );
}

#[test]
fn test_schema_is_a_synonym_for_keyspace() {
    let fixture = Fixture::new();
    let a = tenant(A);

    let keyspace = fixture.rewriter.rewrite_request(&a, None, "DROP KEYSPACE foo");
    let schema = fixture.rewriter.rewrite_request(&a, None, "DROP SCHEMA foo");
    assert_eq!(keyspace.verb(), Some(Verb::DropKeyspace));
    assert_eq!(schema.verb(), keyspace.verb());
    assert_eq!(schema.text, format!("DROP SCHEMA {A}foo"));
}

#[test]
fn test_names_round_trip_through_the_scope() {
    let fixture = Fixture::new();
    let a = tenant(A);
    let scope = fixture.rewriter.scope(&a);

    for logical in ["foo", "MixedCase", "x_1", "system"] {
        let physical = scope.physical_keyspace(logical);
        assert_eq!(scope.logical_keyspace(&physical, "test").unwrap(), logical);
    }
    assert_eq!(scope.keyspace_ownership("system_traces"), Ownership::Global);
    assert!(scope.logical_keyspace(&format!("{B}foo"), "test").is_err());
}

#[test]
fn test_catalog_lookup_by_name_finds_own_keyspace() {
    let fixture = Fixture::new();
    let a = tenant(A);

    let rewritten = fixture.rewriter.rewrite_request(
        &a,
        None,
        "SELECT * FROM system.schema_keyspaces WHERE keyspace_name = 'foo'",
    );
    assert!(rewritten.text.ends_with(&format!("keyspace_name = '{A}foo'")));
    let relation = rewritten.relation.unwrap();
    assert!(fixture.virtualizer.is_protected(&relation));
    assert!(fixture.config.is_global_keyspace(&relation.keyspace));
}

#[test]
fn test_views_and_functions_cannot_reach_another_tenant() {
    let fixture = Fixture::new();
    let a = tenant(A);
    let scope = fixture.rewriter.scope(&a);

    for raw in [
        format!("DROP MATERIALIZED VIEW {B}foo.v"),
        format!("CREATE MATERIALIZED VIEW foo.v AS SELECT k FROM {B}foo.t WHERE k IS NOT NULL PRIMARY KEY (k)"),
        format!("DROP AGGREGATE {B}foo.total"),
        format!("REVOKE EXECUTE ON FUNCTION {B}foo.f(int) FROM cassandra"),
        format!("SELECT {B}foo.f(v) FROM foo.t"),
        format!("LIST ALL PERMISSIONS ON ALL FUNCTIONS IN KEYSPACE {B}foo"),
    ] {
        let rewritten = fixture.rewriter.rewrite_request(&a, None, &raw);
        assert!(!rewritten.is_passthrough(), "{raw}");
        let parsed = rewritten.parsed.as_ref().unwrap();
        for target in parsed.targets() {
            if let Target::Keyspace(keyspace) = target {
                let physical = scope.physical_keyspace(&keyspace.name);
                assert!(a.owns(&physical), "{raw}: {physical}");
            }
        }
        assert!(rewritten.text.contains(&format!("{A}{B}foo")), "{raw}");
    }
}

#[test]
fn test_bound_catalog_marker_maps_like_a_literal() {
    let fixture = Fixture::new();
    let a = tenant(A);

    let literal = fixture.rewriter.rewrite_request(
        &a,
        None,
        "SELECT * FROM system.schema_keyspaces WHERE keyspace_name = 'foo'",
    );
    let bound = fixture.rewriter.rewrite_request(
        &a,
        None,
        "SELECT * FROM system.schema_keyspaces WHERE keyspace_name IN (?, ?)",
    );
    assert_eq!(bound.bound_names.len(), 2);
    let physical = fixture
        .rewriter
        .physical_bound_value(&a, bound.bound_names[1], "foo")
        .unwrap();
    assert!(literal.text.ends_with(&format!("'{physical}'")));
}
