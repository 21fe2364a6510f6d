//! Request-side namespace rewriting and error message translation.
//!
//! The rewriter never re-renders a statement. It replaces the byte spans of
//! the names the classifier found, so literals, comments and formatting
//! reach the backend exactly as the client wrote them.

use cqlgate_core::{IdentifierKind, Namespace, NamespaceConfig};
use std::sync::Arc;

use crate::classifier::StatementClassifier;
use crate::lexer::{Span, TokenKind, tokenize};
use crate::scope::TenantScope;
use crate::statement::{
    Identifier, ParsedStatement, Principal, PrincipalForm, Statement, Target, Verb,
};
use crate::virtual_schema::{ProtectedCatalog, RelationName, map_resource};

/// Outcome of rewriting one client statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenStatement {
    /// Text received from the client.
    pub original: String,
    /// Text to send to the backend.
    pub text: String,
    /// Classification, `None` for passthrough statements.
    pub parsed: Option<ParsedStatement>,
    /// Physical relation of a single-table statement.
    pub relation: Option<RelationName>,
    /// Why the statement was passed through unchanged.
    pub passthrough_reason: Option<String>,
    /// Error message to answer with instead of forwarding the statement.
    pub rejection: Option<String>,
    /// Bind markers whose values name tenant objects in a catalog query.
    pub bound_names: Vec<BoundName>,
}

/// A bound value that must be translated like a catalog WHERE literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundName {
    /// Position among the statement's bind markers.
    pub index: usize,
    pub kind: IdentifierKind,
}

impl RewrittenStatement {
    pub fn is_passthrough(&self) -> bool {
        self.parsed.is_none()
    }

    pub fn verb(&self) -> Option<Verb> {
        self.parsed.as_ref().map(ParsedStatement::verb)
    }

    pub fn statement(&self) -> Option<&Statement> {
        self.parsed.as_ref().map(|p| &p.statement)
    }
}

/// Translates statements from a tenant's logical names to physical names.
#[derive(Debug, Clone)]
pub struct IdentifierRewriter {
    config: Arc<NamespaceConfig>,
    catalog: Arc<ProtectedCatalog>,
    classifier: StatementClassifier,
}

impl IdentifierRewriter {
    pub fn new(config: Arc<NamespaceConfig>) -> Self {
        let catalog = Arc::new(ProtectedCatalog::from_config(&config));
        Self::with_catalog(config, catalog)
    }

    pub fn with_catalog(config: Arc<NamespaceConfig>, catalog: Arc<ProtectedCatalog>) -> Self {
        Self {
            config,
            catalog,
            classifier: StatementClassifier::new(),
        }
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    pub fn scope<'a>(&'a self, namespace: &'a Namespace) -> TenantScope<'a> {
        TenantScope::new(namespace, &self.config)
    }

    /// Classify and rewrite `raw` for the tenant owning `namespace`.
    ///
    /// `current_keyspace` is the session's logical keyspace. Statements the
    /// classifier does not understand come back unchanged, unless they name
    /// another tenant's physical keyspace; those carry a rejection.
    pub fn rewrite_request(
        &self,
        namespace: &Namespace,
        current_keyspace: Option<&str>,
        raw: &str,
    ) -> RewrittenStatement {
        match self.classifier.classify(raw) {
            Ok(parsed) => self.rewrite_parsed(namespace, current_keyspace, parsed),
            Err(e) => {
                let rejection = self
                    .foreign_name(namespace, raw)
                    .map(|name| format!("Keyspace '{name}' does not exist"));
                if rejection.is_some() {
                    tracing::warn!(reason = %e, "Refusing unclassified statement naming another namespace");
                } else {
                    tracing::debug!(reason = %e, "Passing statement through unchanged");
                }
                RewrittenStatement {
                    original: raw.to_string(),
                    text: raw.to_string(),
                    parsed: None,
                    relation: None,
                    passthrough_reason: Some(e.to_string()),
                    rejection,
                    bound_names: Vec::new(),
                }
            }
        }
    }

    /// First keyspace or principal name in `raw` that starts with a token
    /// other than the tenant's.
    ///
    /// Names count when qualified (`x.`) or after a keyword introducing a
    /// keyspace or principal. Text that does not tokenize is split on
    /// non-identifier characters and every word counts.
    fn foreign_name(&self, namespace: &Namespace, raw: &str) -> Option<String> {
        const INTRODUCERS: &[&str] = &["KEYSPACE", "SCHEMA", "USE", "USER", "ROLE", "OF", "TO"];

        let names: Vec<String> = match tokenize(raw) {
            Ok(tokens) => tokens
                .iter()
                .enumerate()
                .filter(|&(i, _)| {
                    tokens.get(i + 1).is_some_and(|next| next.is_symbol('.'))
                        || i.checked_sub(1)
                            .and_then(|previous| tokens.get(previous))
                            .is_some_and(|previous| {
                                INTRODUCERS.iter().any(|k| previous.is_keyword(k))
                            })
                })
                .filter_map(|(_, token)| match token.kind {
                    TokenKind::Word => Some(token.text.to_ascii_lowercase()),
                    TokenKind::QuotedName => Some(token.unquoted()),
                    _ => None,
                })
                .collect(),
            Err(_) => raw
                .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .map(str::to_ascii_lowercase)
                .collect(),
        };

        let length = self.config.token_length;
        names.into_iter().find(|name| {
            name.len() > length
                && name
                    .get(..length)
                    .is_some_and(|prefix| Namespace::new(prefix, length).is_ok())
                && !namespace.owns(name)
                && !self.config.is_global_keyspace(name)
        })
    }

    /// Rewrite an already classified statement.
    pub fn rewrite_parsed(
        &self,
        namespace: &Namespace,
        current_keyspace: Option<&str>,
        parsed: ParsedStatement,
    ) -> RewrittenStatement {
        let scope = self.scope(namespace);
        let mut edits = Vec::new();

        for target in parsed.targets() {
            match target {
                Target::Keyspace(keyspace) => {
                    if let Some(edit) = keyspace_edit(&scope, keyspace) {
                        edits.push(edit);
                    }
                }
                Target::Principal(principal) => {
                    if let Some(edit) = principal_edit(&scope, principal) {
                        edits.push(edit);
                    }
                }
            }
        }

        let relation = parsed.statement.table().and_then(|table| {
            let keyspace = table.keyspace_or(current_keyspace)?;
            Some(RelationName::new(
                scope.physical_keyspace(keyspace),
                table.name.name.clone(),
            ))
        });

        let mut bound_names = Vec::new();
        if let (
            Statement::Select {
                filters, markers, ..
            },
            Some(relation),
        ) = (&parsed.statement, &relation)
        {
            if let Some(protected) = self.catalog.get(&relation.keyspace, &relation.table) {
                for filter in filters {
                    let Some(kind) = protected.column_kind(&filter.column) else {
                        continue;
                    };
                    for literal in &filter.values {
                        if let Some(physical) = physical_literal(&scope, kind, &literal.value) {
                            if physical != literal.value {
                                edits.push((literal.span, quote_literal(&physical)));
                            }
                        }
                    }
                }
                for filter in markers {
                    if let Some(kind) = protected.column_kind(&filter.column) {
                        bound_names.extend(
                            filter.markers.iter().map(|&index| BoundName { index, kind }),
                        );
                    }
                }
            }
        }

        let text = apply_edits(&parsed.text, edits);
        tracing::trace!(verb = %parsed.verb(), "Rewrote statement");

        RewrittenStatement {
            original: parsed.text.clone(),
            text,
            parsed: Some(parsed),
            relation,
            passthrough_reason: None,
            rejection: None,
            bound_names,
        }
    }

    /// Physical form of a bound value for a catalog bind marker.
    pub fn physical_bound_value(
        &self,
        namespace: &Namespace,
        name: BoundName,
        value: &str,
    ) -> Option<String> {
        physical_literal(&self.scope(namespace), name.kind, value)
    }

    /// Express a backend error message in the tenant's logical names.
    pub fn rewrite_error_message(&self, namespace: &Namespace, message: &str) -> String {
        namespace.strip_all(message)
    }
}

fn keyspace_edit(scope: &TenantScope<'_>, keyspace: &Identifier) -> Option<(Span, String)> {
    let physical = scope.physical_keyspace(&keyspace.name);
    if physical == keyspace.name {
        return None;
    }
    let rendered = if keyspace.quoted {
        quote_name(&physical)
    } else {
        physical
    };
    Some((keyspace.span, rendered))
}

fn principal_edit(scope: &TenantScope<'_>, principal: &Principal) -> Option<(Span, String)> {
    let physical = scope.physical_principal(&principal.name);
    if physical == principal.name {
        return None;
    }
    let rendered = match principal.form {
        PrincipalForm::Bare => physical,
        PrincipalForm::Quoted => quote_name(&physical),
        PrincipalForm::Literal => quote_literal(&physical),
    };
    Some((principal.span, rendered))
}

/// Physical form of a catalog WHERE literal, `None` when it cannot be mapped.
fn physical_literal(scope: &TenantScope<'_>, kind: IdentifierKind, value: &str) -> Option<String> {
    match kind {
        IdentifierKind::Keyspace => Some(scope.physical_keyspace(value)),
        IdentifierKind::Principal => Some(scope.physical_principal(value)),
        IdentifierKind::Resource => map_resource(
            value,
            |ks| Some(scope.physical_keyspace(ks)),
            |role| Some(scope.physical_principal(role)),
        ),
    }
}

fn quote_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn apply_edits(text: &str, mut edits: Vec<(Span, String)>) -> String {
    edits.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(text.len() + edits.len() * 24);
    let mut cursor = 0;
    for (span, replacement) in edits {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}
