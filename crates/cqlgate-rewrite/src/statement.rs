//! Typed model of the CQL statements the gateway understands.

use serde::Serialize;
use std::fmt;

use crate::lexer::{Span, Token, TokenKind};

/// A keyspace, table, index, type or trigger name as written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    /// Canonical name: lowercased when unquoted, exact when quoted.
    pub name: String,
    pub quoted: bool,
    pub span: Span,
}

impl Identifier {
    pub(crate) fn from_token(token: &Token<'_>) -> Option<Self> {
        match token.kind {
            TokenKind::Word => Some(Self {
                name: token.text.to_ascii_lowercase(),
                quoted: false,
                span: token.span,
            }),
            TokenKind::QuotedName => Some(Self {
                name: token.unquoted(),
                quoted: true,
                span: token.span,
            }),
            _ => None,
        }
    }
}

/// `[keyspace.]name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub keyspace: Option<Identifier>,
    pub name: Identifier,
}

impl QualifiedName {
    /// Keyspace this name lives in, falling back to the session keyspace.
    pub fn keyspace_or<'a>(&'a self, current: Option<&'a str>) -> Option<&'a str> {
        self.keyspace.as_ref().map(|k| k.name.as_str()).or(current)
    }
}

/// How a principal name was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalForm {
    Bare,
    Quoted,
    Literal,
}

/// A user or role name. Unquoted names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub form: PrincipalForm,
    pub span: Span,
}

impl Principal {
    pub(crate) fn from_token(token: &Token<'_>) -> Option<Self> {
        let (name, form) = match token.kind {
            TokenKind::Word => (token.text.to_ascii_lowercase(), PrincipalForm::Bare),
            TokenKind::QuotedName => (token.unquoted(), PrincipalForm::Quoted),
            TokenKind::StringLiteral => (token.unquoted(), PrincipalForm::Literal),
            _ => return None,
        };
        Some(Self {
            name,
            form,
            span: token.span,
        })
    }
}

/// USER or ROLE flavour of principal statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    All,
    Create,
    Alter,
    Drop,
    Select,
    Modify,
    Authorize,
    Describe,
    Execute,
}

impl Permission {
    pub(crate) fn from_keyword(word: &str) -> Option<Self> {
        let permission = match word.to_ascii_uppercase().as_str() {
            "ALL" => Self::All,
            "CREATE" => Self::Create,
            "ALTER" => Self::Alter,
            "DROP" => Self::Drop,
            "SELECT" => Self::Select,
            "MODIFY" => Self::Modify,
            "AUTHORIZE" => Self::Authorize,
            "DESCRIBE" => Self::Describe,
            "EXECUTE" => Self::Execute,
            _ => return None,
        };
        Some(permission)
    }
}

/// Target of GRANT, REVOKE and LIST PERMISSIONS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    AllKeyspaces,
    Keyspace(Identifier),
    Table(QualifiedName),
    AllRoles,
    Role(Principal),
    AllFunctions,
    AllFunctionsInKeyspace(Identifier),
    /// `FUNCTION [ks.]name(types)`; the argument types are not kept.
    Function(QualifiedName),
}

/// A `column = 'literal'` or `column IN ('a', ...)` comparison in a WHERE
/// clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralFilter {
    /// Canonical column name.
    pub column: String,
    pub values: Vec<StringValue>,
}

/// A `column = ?` or `column IN (?, ...)` comparison. `markers` are the
/// positions of its bind markers among all markers of the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFilter {
    pub column: String,
    pub markers: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringValue {
    pub value: String,
    pub span: Span,
}

/// A classified statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Use {
        keyspace: Identifier,
    },
    CreateKeyspace {
        keyspace: Identifier,
        if_not_exists: bool,
    },
    AlterKeyspace {
        keyspace: Identifier,
    },
    DropKeyspace {
        keyspace: Identifier,
        if_exists: bool,
    },
    CreateTable {
        table: QualifiedName,
        if_not_exists: bool,
    },
    AlterTable {
        table: QualifiedName,
    },
    DropTable {
        table: QualifiedName,
        if_exists: bool,
    },
    Truncate {
        table: QualifiedName,
    },
    CreateIndex {
        index: Option<Identifier>,
        table: QualifiedName,
        if_not_exists: bool,
    },
    DropIndex {
        index: QualifiedName,
        if_exists: bool,
    },
    CreateType {
        name: QualifiedName,
        if_not_exists: bool,
    },
    AlterType {
        name: QualifiedName,
    },
    DropType {
        name: QualifiedName,
        if_exists: bool,
    },
    CreateTrigger {
        trigger: Identifier,
        table: QualifiedName,
        if_not_exists: bool,
    },
    DropTrigger {
        trigger: Identifier,
        table: QualifiedName,
        if_exists: bool,
    },
    CreateMaterializedView {
        view: QualifiedName,
        base: QualifiedName,
        if_not_exists: bool,
    },
    AlterMaterializedView {
        view: QualifiedName,
    },
    DropMaterializedView {
        view: QualifiedName,
        if_exists: bool,
    },
    CreateFunction {
        function: QualifiedName,
        or_replace: bool,
        if_not_exists: bool,
    },
    DropFunction {
        function: QualifiedName,
        if_exists: bool,
    },
    CreateAggregate {
        aggregate: QualifiedName,
        or_replace: bool,
        if_not_exists: bool,
    },
    DropAggregate {
        aggregate: QualifiedName,
        if_exists: bool,
    },
    Select {
        table: QualifiedName,
        filters: Vec<LiteralFilter>,
        markers: Vec<MarkerFilter>,
    },
    Insert {
        table: QualifiedName,
    },
    Update {
        table: QualifiedName,
    },
    Delete {
        table: QualifiedName,
    },
    Batch {
        statements: Vec<Statement>,
    },
    CreatePrincipal {
        kind: PrincipalKind,
        principal: Principal,
        if_not_exists: bool,
    },
    AlterPrincipal {
        kind: PrincipalKind,
        principal: Principal,
    },
    DropPrincipal {
        kind: PrincipalKind,
        principal: Principal,
        if_exists: bool,
    },
    Grant {
        permission: Permission,
        resource: Resource,
        grantee: Principal,
    },
    Revoke {
        permission: Permission,
        resource: Resource,
        revokee: Principal,
    },
    GrantRole {
        role: Principal,
        grantee: Principal,
    },
    RevokeRole {
        role: Principal,
        revokee: Principal,
    },
    ListPrincipals {
        kind: PrincipalKind,
        of: Option<Principal>,
        norecursive: bool,
    },
    ListPermissions {
        permission: Permission,
        resource: Option<Resource>,
        of: Option<Principal>,
        norecursive: bool,
    },
}

/// A name the rewriter must namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Keyspace(&'a Identifier),
    Principal(&'a Principal),
}

impl Statement {
    pub fn verb(&self) -> Verb {
        match self {
            Self::Use { .. } => Verb::Use,
            Self::CreateKeyspace { .. } => Verb::CreateKeyspace,
            Self::AlterKeyspace { .. } => Verb::AlterKeyspace,
            Self::DropKeyspace { .. } => Verb::DropKeyspace,
            Self::CreateTable { .. } => Verb::CreateTable,
            Self::AlterTable { .. } => Verb::AlterTable,
            Self::DropTable { .. } => Verb::DropTable,
            Self::Truncate { .. } => Verb::Truncate,
            Self::CreateIndex { .. } => Verb::CreateIndex,
            Self::DropIndex { .. } => Verb::DropIndex,
            Self::CreateType { .. } => Verb::CreateType,
            Self::AlterType { .. } => Verb::AlterType,
            Self::DropType { .. } => Verb::DropType,
            Self::CreateTrigger { .. } => Verb::CreateTrigger,
            Self::DropTrigger { .. } => Verb::DropTrigger,
            Self::CreateMaterializedView { .. } => Verb::CreateMaterializedView,
            Self::AlterMaterializedView { .. } => Verb::AlterMaterializedView,
            Self::DropMaterializedView { .. } => Verb::DropMaterializedView,
            Self::CreateFunction { .. } => Verb::CreateFunction,
            Self::DropFunction { .. } => Verb::DropFunction,
            Self::CreateAggregate { .. } => Verb::CreateAggregate,
            Self::DropAggregate { .. } => Verb::DropAggregate,
            Self::Select { .. } => Verb::Select,
            Self::Insert { .. } => Verb::Insert,
            Self::Update { .. } => Verb::Update,
            Self::Delete { .. } => Verb::Delete,
            Self::Batch { .. } => Verb::Batch,
            Self::CreatePrincipal { kind, .. } => match kind {
                PrincipalKind::User => Verb::CreateUser,
                PrincipalKind::Role => Verb::CreateRole,
            },
            Self::AlterPrincipal { kind, .. } => match kind {
                PrincipalKind::User => Verb::AlterUser,
                PrincipalKind::Role => Verb::AlterRole,
            },
            Self::DropPrincipal { kind, .. } => match kind {
                PrincipalKind::User => Verb::DropUser,
                PrincipalKind::Role => Verb::DropRole,
            },
            Self::Grant { .. } => Verb::Grant,
            Self::Revoke { .. } => Verb::Revoke,
            Self::GrantRole { .. } => Verb::GrantRole,
            Self::RevokeRole { .. } => Verb::RevokeRole,
            Self::ListPrincipals { kind, .. } => match kind {
                PrincipalKind::User => Verb::ListUsers,
                PrincipalKind::Role => Verb::ListRoles,
            },
            Self::ListPermissions { .. } => Verb::ListPermissions,
        }
    }

    /// Every keyspace and principal name written in the statement, in no
    /// particular order. Nested batch statements are included.
    pub fn targets(&self) -> Vec<Target<'_>> {
        let mut targets = Vec::new();
        self.collect_targets(&mut targets);
        targets
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<Target<'a>>) {
        fn table<'a>(name: &'a QualifiedName, out: &mut Vec<Target<'a>>) {
            if let Some(keyspace) = &name.keyspace {
                out.push(Target::Keyspace(keyspace));
            }
        }

        fn resource<'a>(resource: &'a Resource, out: &mut Vec<Target<'a>>) {
            match resource {
                Resource::AllKeyspaces | Resource::AllRoles | Resource::AllFunctions => {}
                Resource::Keyspace(keyspace) | Resource::AllFunctionsInKeyspace(keyspace) => {
                    out.push(Target::Keyspace(keyspace))
                }
                Resource::Table(name) | Resource::Function(name) => table(name, out),
                Resource::Role(role) => out.push(Target::Principal(role)),
            }
        }

        match self {
            Self::Use { keyspace }
            | Self::CreateKeyspace { keyspace, .. }
            | Self::AlterKeyspace { keyspace }
            | Self::DropKeyspace { keyspace, .. } => out.push(Target::Keyspace(keyspace)),

            Self::CreateTable { table: name, .. }
            | Self::AlterTable { table: name }
            | Self::DropTable { table: name, .. }
            | Self::Truncate { table: name }
            | Self::CreateIndex { table: name, .. }
            | Self::DropIndex { index: name, .. }
            | Self::CreateType { name, .. }
            | Self::AlterType { name }
            | Self::DropType { name, .. }
            | Self::CreateTrigger { table: name, .. }
            | Self::DropTrigger { table: name, .. }
            | Self::AlterMaterializedView { view: name }
            | Self::DropMaterializedView { view: name, .. }
            | Self::CreateFunction { function: name, .. }
            | Self::DropFunction { function: name, .. }
            | Self::CreateAggregate { aggregate: name, .. }
            | Self::DropAggregate { aggregate: name, .. }
            | Self::Select { table: name, .. }
            | Self::Insert { table: name }
            | Self::Update { table: name }
            | Self::Delete { table: name } => table(name, out),

            Self::CreateMaterializedView { view, base, .. } => {
                table(view, out);
                table(base, out);
            }

            Self::Batch { statements } => {
                for statement in statements {
                    statement.collect_targets(out);
                }
            }

            Self::CreatePrincipal { principal, .. }
            | Self::AlterPrincipal { principal, .. }
            | Self::DropPrincipal { principal, .. } => out.push(Target::Principal(principal)),

            Self::Grant {
                resource: r,
                grantee: p,
                ..
            }
            | Self::Revoke {
                resource: r,
                revokee: p,
                ..
            } => {
                resource(r, out);
                out.push(Target::Principal(p));
            }

            Self::GrantRole { role, grantee: p } | Self::RevokeRole { role, revokee: p } => {
                out.push(Target::Principal(role));
                out.push(Target::Principal(p));
            }

            Self::ListPrincipals { of, .. } => {
                if let Some(of) = of {
                    out.push(Target::Principal(of));
                }
            }

            Self::ListPermissions { resource: r, of, .. } => {
                if let Some(r) = r {
                    resource(r, out);
                }
                if let Some(of) = of {
                    out.push(Target::Principal(of));
                }
            }
        }
    }

    /// Table read or written by a single-table statement.
    pub fn table(&self) -> Option<&QualifiedName> {
        match self {
            Self::CreateTable { table, .. }
            | Self::AlterTable { table }
            | Self::DropTable { table, .. }
            | Self::Truncate { table }
            | Self::CreateIndex { table, .. }
            | Self::CreateTrigger { table, .. }
            | Self::DropTrigger { table, .. }
            | Self::CreateMaterializedView { view: table, .. }
            | Self::AlterMaterializedView { view: table }
            | Self::DropMaterializedView { view: table, .. }
            | Self::Select { table, .. }
            | Self::Insert { table }
            | Self::Update { table }
            | Self::Delete { table } => Some(table),
            _ => None,
        }
    }
}

/// Statement verb, used for logging and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verb {
    Use,
    CreateKeyspace,
    AlterKeyspace,
    DropKeyspace,
    CreateTable,
    AlterTable,
    DropTable,
    Truncate,
    CreateIndex,
    DropIndex,
    CreateType,
    AlterType,
    DropType,
    CreateTrigger,
    DropTrigger,
    CreateMaterializedView,
    AlterMaterializedView,
    DropMaterializedView,
    CreateFunction,
    DropFunction,
    CreateAggregate,
    DropAggregate,
    Select,
    Insert,
    Update,
    Delete,
    Batch,
    CreateUser,
    AlterUser,
    DropUser,
    CreateRole,
    AlterRole,
    DropRole,
    Grant,
    Revoke,
    GrantRole,
    RevokeRole,
    ListUsers,
    ListRoles,
    ListPermissions,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Use => "USE",
            Self::CreateKeyspace => "CREATE KEYSPACE",
            Self::AlterKeyspace => "ALTER KEYSPACE",
            Self::DropKeyspace => "DROP KEYSPACE",
            Self::CreateTable => "CREATE TABLE",
            Self::AlterTable => "ALTER TABLE",
            Self::DropTable => "DROP TABLE",
            Self::Truncate => "TRUNCATE",
            Self::CreateIndex => "CREATE INDEX",
            Self::DropIndex => "DROP INDEX",
            Self::CreateType => "CREATE TYPE",
            Self::AlterType => "ALTER TYPE",
            Self::DropType => "DROP TYPE",
            Self::CreateTrigger => "CREATE TRIGGER",
            Self::DropTrigger => "DROP TRIGGER",
            Self::CreateMaterializedView => "CREATE MATERIALIZED VIEW",
            Self::AlterMaterializedView => "ALTER MATERIALIZED VIEW",
            Self::DropMaterializedView => "DROP MATERIALIZED VIEW",
            Self::CreateFunction => "CREATE FUNCTION",
            Self::DropFunction => "DROP FUNCTION",
            Self::CreateAggregate => "CREATE AGGREGATE",
            Self::DropAggregate => "DROP AGGREGATE",
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Batch => "BATCH",
            Self::CreateUser => "CREATE USER",
            Self::AlterUser => "ALTER USER",
            Self::DropUser => "DROP USER",
            Self::CreateRole => "CREATE ROLE",
            Self::AlterRole => "ALTER ROLE",
            Self::DropRole => "DROP ROLE",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::GrantRole => "GRANT ROLE",
            Self::RevokeRole => "REVOKE ROLE",
            Self::ListUsers => "LIST USERS",
            Self::ListRoles => "LIST ROLES",
            Self::ListPermissions => "LIST PERMISSIONS",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified statement together with its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub text: String,
    pub statement: Statement,
    /// Keyspaces qualifying function calls (`ks.f(...)`) anywhere in the
    /// statement, other than names the statement itself declares.
    pub function_keyspaces: Vec<Identifier>,
}

impl ParsedStatement {
    pub fn verb(&self) -> Verb {
        self.statement.verb()
    }

    /// Statement targets followed by the function call qualifiers.
    pub fn targets(&self) -> Vec<Target<'_>> {
        let mut targets = self.statement.targets();
        targets.extend(self.function_keyspaces.iter().map(Target::Keyspace));
        targets
    }
}
