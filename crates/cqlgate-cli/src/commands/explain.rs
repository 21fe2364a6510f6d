//! `cqlgate explain`: show the backend statement for a tenant, offline.

use anyhow::Context;
use cqlgate_core::config::NamespaceConfig;
use cqlgate_core::{GatewayConfig, Namespace};
use cqlgate_rewrite::IdentifierRewriter;
use std::path::Path;
use std::sync::Arc;

pub fn run(
    token: &str,
    keyspace: Option<&str>,
    config_path: Option<&Path>,
    statement: &str,
) -> anyhow::Result<()> {
    let namespace_config = match config_path {
        Some(path) => {
            GatewayConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?
                .namespace
        }
        None => NamespaceConfig::default(),
    };

    for line in explain(namespace_config, token, keyspace, statement)? {
        println!("{line}");
    }
    Ok(())
}

fn explain(
    config: NamespaceConfig,
    token: &str,
    keyspace: Option<&str>,
    statement: &str,
) -> anyhow::Result<Vec<String>> {
    let namespace = Namespace::new(token, config.token_length).context("invalid internal token")?;
    let rewriter = IdentifierRewriter::new(Arc::new(config));
    let rewritten = rewriter.rewrite_request(&namespace, keyspace, statement);

    let mut lines = Vec::new();
    match (rewritten.verb(), &rewritten.passthrough_reason) {
        (Some(verb), _) => lines.push(format!("verb:      {verb}")),
        (None, Some(reason)) => lines.push(format!("verb:      passthrough ({reason})")),
        (None, None) => lines.push("verb:      passthrough".to_string()),
    }
    if let Some(relation) = &rewritten.relation {
        lines.push(format!("relation:  {relation}"));
    }
    for name in &rewritten.bound_names {
        lines.push(format!("bound:     marker {} as {:?}", name.index, name.kind));
    }
    lines.push(format!("original:  {}", rewritten.original));
    match &rewritten.rejection {
        Some(message) => lines.push(format!("refused:   {message}")),
        None => lines.push(format!("rewritten: {}", rewritten.text)),
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOKEN: &str = "a1111111111111111111";

    #[test]
    fn test_explain_select() {
        let lines = explain(NamespaceConfig::default(), TOKEN, None, "SELECT * FROM ks.t").unwrap();
        assert_eq!(lines.last().unwrap(), &format!("rewritten: SELECT * FROM {TOKEN}ks.t"));
        assert!(lines.iter().any(|l| l == &format!("relation:  {TOKEN}ks.t")));
    }

    #[test]
    fn test_explain_passthrough() {
        let lines = explain(NamespaceConfig::default(), TOKEN, None, "SELEC 1").unwrap();
        assert!(lines[0].starts_with("verb:      passthrough"));
        assert_eq!(lines.last().unwrap(), "rewritten: SELEC 1");
    }

    #[test]
    fn test_explain_refused_statement() {
        let other = "b2222222222222222222";
        let statement = format!("SELEC * FROM {other}ks.t");
        let lines = explain(NamespaceConfig::default(), TOKEN, None, &statement).unwrap();
        assert_eq!(
            lines.last().unwrap(),
            &format!("refused:   Keyspace '{other}ks' does not exist")
        );
    }

    #[test]
    fn test_explain_bound_catalog_marker() {
        let lines = explain(
            NamespaceConfig::default(),
            TOKEN,
            None,
            "SELECT * FROM system_schema.tables WHERE keyspace_name = ?",
        )
        .unwrap();
        assert!(lines.iter().any(|l| l == "bound:     marker 0 as Keyspace"));
    }

    #[test]
    fn test_explain_rejects_short_token() {
        assert!(explain(NamespaceConfig::default(), "a111", None, "USE ks").is_err());
    }
}
