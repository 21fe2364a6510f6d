//! Recursive-descent classifier for the CQL statements that name keyspaces,
//! tables or principals.
//!
//! Anything the classifier is not sure about is reported as
//! [`RewriteError::Classification`]; callers forward such statements to the
//! backend unchanged and let it produce the syntax error.

use crate::error::RewriteError;
use crate::lexer::{Span, Token, TokenKind, tokenize};
use crate::statement::{
    Identifier, LiteralFilter, MarkerFilter, ParsedStatement, Permission, Principal,
    PrincipalKind, QualifiedName, Resource, Statement, StringValue, Target,
};

type ParseResult<T> = Result<T, RewriteError>;

/// Keywords that cannot be used as unquoted names.
const RESERVED: &[&str] = &[
    "ADD", "ALLOW", "ALTER", "AND", "APPLY", "ASC", "AUTHORIZE", "BATCH", "BEGIN", "BY",
    "COLUMNFAMILY", "CREATE", "DELETE", "DESC", "DESCRIBE", "DROP", "ENTRIES", "EXECUTE", "FROM",
    "FULL", "GRANT", "IF", "IN", "INDEX", "INFINITY", "INSERT", "INTO", "IS", "KEYSPACE", "LIMIT",
    "MATERIALIZED", "MBEAN", "MBEANS", "MODIFY", "NAN", "NORECURSIVE", "NOT", "NULL", "OF", "ON",
    "OR", "ORDER", "PRIMARY", "RENAME", "REPLACE", "REVOKE", "SCHEMA", "SELECT", "SET", "TABLE",
    "TO", "TOKEN", "TRUNCATE", "UNLOGGED", "UPDATE", "USE", "USING", "VIEW", "WHERE", "WITH",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn unclassified(reason: impl Into<String>) -> RewriteError {
    RewriteError::Classification(reason.into())
}

fn is_name(token: &Token<'_>) -> bool {
    match token.kind {
        TokenKind::QuotedName => true,
        TokenKind::Word => !is_reserved(token.text),
        _ => false,
    }
}

/// Keyspaces of every `ks.f(` in the token stream.
fn function_qualifiers(tokens: &[Token<'_>]) -> Vec<Identifier> {
    tokens
        .windows(4)
        .filter(|w| {
            is_name(&w[0])
                && w[1].is_symbol('.')
                && matches!(w[2].kind, TokenKind::Word | TokenKind::QuotedName)
                && w[3].is_symbol('(')
        })
        .filter_map(|w| Identifier::from_token(&w[0]))
        .collect()
}

/// Stateless statement classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementClassifier;

impl StatementClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a single statement.
    pub fn classify(&self, raw: &str) -> ParseResult<ParsedStatement> {
        let tokens = tokenize(raw)?;
        let mut parser = Parser::new(&tokens);
        let statement = parser.statement()?;
        parser.finish()?;

        // `CREATE TABLE ks.t (` and friends are already targets.
        let declared: Vec<Span> = statement
            .targets()
            .into_iter()
            .filter_map(|target| match target {
                Target::Keyspace(keyspace) => Some(keyspace.span),
                Target::Principal(_) => None,
            })
            .collect();
        let function_keyspaces = function_qualifiers(&tokens)
            .into_iter()
            .filter(|keyspace| !declared.contains(&keyspace.span))
            .collect();

        Ok(ParsedStatement {
            text: raw.to_string(),
            statement,
            function_keyspaces,
        })
    }
}

struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    fn new(tokens: &'t [Token<'a>]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token<'a>> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<&'t Token<'a>> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn at_symbol(&self, symbol: char) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(symbol))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a keyword sequence only if all of it is present.
    fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let matches = keywords
            .iter()
            .enumerate()
            .all(|(i, k)| self.peek_at(i).is_some_and(|t| t.is_keyword(k)));
        if matches {
            self.pos += keywords.len();
        }
        matches
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.at_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(unclassified(format!("expected {keyword}")))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Accept an optional `;` and require nothing after it.
    fn finish(&mut self) -> ParseResult<()> {
        self.eat_symbol(';');
        if self.at_end() {
            Ok(())
        } else {
            Err(unclassified("unexpected trailing tokens"))
        }
    }

    /// Skip the unparsed remainder of a statement, up to `;` or the end.
    fn skip_rest(&mut self) {
        while let Some(token) = self.peek() {
            if token.is_symbol(';') {
                break;
            }
            self.pos += 1;
        }
    }

    /// Like [`Self::skip_rest`] but the remainder must not be empty.
    fn require_rest(&mut self) -> ParseResult<()> {
        if self.at_end() || self.at_symbol(';') {
            return Err(unclassified("statement is incomplete"));
        }
        self.skip_rest();
        Ok(())
    }

    fn identifier(&mut self) -> ParseResult<Identifier> {
        let token = self
            .peek()
            .ok_or_else(|| unclassified("expected a name"))?;
        if token.kind == TokenKind::Word && is_reserved(token.text) {
            return Err(unclassified(format!(
                "reserved keyword {} used as a name",
                token.text
            )));
        }
        let identifier =
            Identifier::from_token(token).ok_or_else(|| unclassified("expected a name"))?;
        self.pos += 1;
        Ok(identifier)
    }

    fn qualified_name(&mut self) -> ParseResult<QualifiedName> {
        let first = self.identifier()?;
        if self.eat_symbol('.') {
            let name = self.identifier()?;
            Ok(QualifiedName {
                keyspace: Some(first),
                name,
            })
        } else {
            Ok(QualifiedName {
                keyspace: None,
                name: first,
            })
        }
    }

    fn principal(&mut self) -> ParseResult<Principal> {
        let token = self
            .peek()
            .ok_or_else(|| unclassified("expected a user or role name"))?;
        if token.kind == TokenKind::Word && is_reserved(token.text) {
            return Err(unclassified(format!(
                "reserved keyword {} used as a name",
                token.text
            )));
        }
        let principal = Principal::from_token(token)
            .ok_or_else(|| unclassified("expected a user or role name"))?;
        self.pos += 1;
        Ok(principal)
    }

    /// Consume a parenthesized group, nested groups included.
    fn parenthesized(&mut self) -> ParseResult<()> {
        if !self.eat_symbol('(') {
            return Err(unclassified("expected ("));
        }
        let mut depth = 1usize;
        while let Some(token) = self.bump() {
            if token.is_symbol('(') {
                depth += 1;
            } else if token.is_symbol(')') {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(unclassified("unbalanced parentheses"))
    }

    fn if_not_exists(&mut self) -> bool {
        self.eat_keywords(&["IF", "NOT", "EXISTS"])
    }

    fn if_exists(&mut self) -> bool {
        self.eat_keywords(&["IF", "EXISTS"])
    }

    fn keyspace_keyword(&mut self) -> bool {
        self.eat_keyword("KEYSPACE") || self.eat_keyword("SCHEMA")
    }

    fn table_keyword(&mut self) -> bool {
        self.eat_keyword("TABLE") || self.eat_keyword("COLUMNFAMILY")
    }

    fn principal_keyword(&mut self) -> Option<PrincipalKind> {
        if self.eat_keyword("USER") {
            Some(PrincipalKind::User)
        } else if self.eat_keyword("ROLE") {
            Some(PrincipalKind::Role)
        } else {
            None
        }
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let verb = self
            .bump()
            .ok_or_else(|| unclassified("empty statement"))?;
        if verb.kind != TokenKind::Word {
            return Err(unclassified("statement must start with a keyword"));
        }

        match verb.text.to_ascii_uppercase().as_str() {
            "USE" => {
                let keyspace = self.identifier()?;
                Ok(Statement::Use { keyspace })
            }
            "CREATE" => self.create(),
            "ALTER" => self.alter(),
            "DROP" => self.drop(),
            "TRUNCATE" => {
                self.table_keyword();
                let table = self.qualified_name()?;
                Ok(Statement::Truncate { table })
            }
            "SELECT" => self.select(),
            "INSERT" => {
                self.expect_keyword("INTO")?;
                let table = self.qualified_name()?;
                if !(self.at_symbol('(') || self.at_keyword("JSON")) {
                    return Err(unclassified("expected column list or JSON"));
                }
                self.skip_rest();
                Ok(Statement::Insert { table })
            }
            "UPDATE" => {
                let table = self.qualified_name()?;
                if !(self.at_keyword("SET") || self.at_keyword("USING")) {
                    return Err(unclassified("expected SET or USING"));
                }
                self.skip_rest();
                Ok(Statement::Update { table })
            }
            "DELETE" => {
                self.skip_to_top_level_keyword("FROM")?;
                let table = self.qualified_name()?;
                self.require_rest()?;
                Ok(Statement::Delete { table })
            }
            "BEGIN" => self.batch(),
            "GRANT" => self.grant_or_revoke(true),
            "REVOKE" => self.grant_or_revoke(false),
            "LIST" => self.list(),
            _ => Err(unclassified(format!("unsupported statement {}", verb.text))),
        }
    }

    fn create(&mut self) -> ParseResult<Statement> {
        let or_replace = self.eat_keywords(&["OR", "REPLACE"]);

        if self.eat_keyword("FUNCTION") {
            let if_not_exists = self.if_not_exists();
            let function = self.qualified_name()?;
            self.parenthesized()?;
            self.require_rest()?;
            return Ok(Statement::CreateFunction {
                function,
                or_replace,
                if_not_exists,
            });
        }

        if self.eat_keyword("AGGREGATE") {
            let if_not_exists = self.if_not_exists();
            let aggregate = self.qualified_name()?;
            self.parenthesized()?;
            if !self.at_keyword("SFUNC") {
                return Err(unclassified("expected SFUNC"));
            }
            self.skip_rest();
            return Ok(Statement::CreateAggregate {
                aggregate,
                or_replace,
                if_not_exists,
            });
        }

        if or_replace {
            return Err(unclassified("OR REPLACE without FUNCTION or AGGREGATE"));
        }

        if self.eat_keywords(&["MATERIALIZED", "VIEW"]) {
            let if_not_exists = self.if_not_exists();
            let view = self.qualified_name()?;
            self.expect_keyword("AS")?;
            self.expect_keyword("SELECT")?;
            self.skip_to_top_level_keyword("FROM")?;
            let base = self.qualified_name()?;
            self.require_rest()?;
            return Ok(Statement::CreateMaterializedView {
                view,
                base,
                if_not_exists,
            });
        }

        if self.keyspace_keyword() {
            let if_not_exists = self.if_not_exists();
            let keyspace = self.identifier()?;
            if !self.at_keyword("WITH") {
                return Err(unclassified("expected WITH"));
            }
            self.skip_rest();
            return Ok(Statement::CreateKeyspace {
                keyspace,
                if_not_exists,
            });
        }

        if self.table_keyword() {
            let if_not_exists = self.if_not_exists();
            let table = self.qualified_name()?;
            if !self.at_symbol('(') {
                return Err(unclassified("expected column definitions"));
            }
            self.skip_rest();
            return Ok(Statement::CreateTable {
                table,
                if_not_exists,
            });
        }

        if self.eat_keyword("INDEX") || self.eat_keywords(&["CUSTOM", "INDEX"]) {
            let if_not_exists = self.if_not_exists();
            let index = if self.at_keyword("ON") {
                None
            } else {
                Some(self.identifier()?)
            };
            self.expect_keyword("ON")?;
            let table = self.qualified_name()?;
            if !self.at_symbol('(') {
                return Err(unclassified("expected indexed column"));
            }
            self.skip_rest();
            return Ok(Statement::CreateIndex {
                index,
                table,
                if_not_exists,
            });
        }

        if self.eat_keyword("TYPE") {
            let if_not_exists = self.if_not_exists();
            let name = self.qualified_name()?;
            if !self.at_symbol('(') {
                return Err(unclassified("expected field definitions"));
            }
            self.skip_rest();
            return Ok(Statement::CreateType {
                name,
                if_not_exists,
            });
        }

        if self.eat_keyword("TRIGGER") {
            let if_not_exists = self.if_not_exists();
            let trigger = self.identifier()?;
            self.expect_keyword("ON")?;
            let table = self.qualified_name()?;
            if !self.at_keyword("USING") {
                return Err(unclassified("expected USING"));
            }
            self.skip_rest();
            return Ok(Statement::CreateTrigger {
                trigger,
                table,
                if_not_exists,
            });
        }

        if let Some(kind) = self.principal_keyword() {
            let if_not_exists = self.if_not_exists();
            let principal = self.principal()?;
            self.skip_rest();
            return Ok(Statement::CreatePrincipal {
                kind,
                principal,
                if_not_exists,
            });
        }

        Err(unclassified("unsupported CREATE"))
    }

    fn alter(&mut self) -> ParseResult<Statement> {
        if self.keyspace_keyword() {
            let keyspace = self.identifier()?;
            if !self.at_keyword("WITH") {
                return Err(unclassified("expected WITH"));
            }
            self.skip_rest();
            return Ok(Statement::AlterKeyspace { keyspace });
        }

        if self.table_keyword() {
            let table = self.qualified_name()?;
            self.require_rest()?;
            return Ok(Statement::AlterTable { table });
        }

        if self.eat_keyword("TYPE") {
            let name = self.qualified_name()?;
            self.require_rest()?;
            return Ok(Statement::AlterType { name });
        }

        if self.eat_keywords(&["MATERIALIZED", "VIEW"]) {
            let view = self.qualified_name()?;
            if !self.at_keyword("WITH") {
                return Err(unclassified("expected WITH"));
            }
            self.skip_rest();
            return Ok(Statement::AlterMaterializedView { view });
        }

        if let Some(kind) = self.principal_keyword() {
            let principal = self.principal()?;
            self.require_rest()?;
            return Ok(Statement::AlterPrincipal { kind, principal });
        }

        Err(unclassified("unsupported ALTER"))
    }

    fn drop(&mut self) -> ParseResult<Statement> {
        if self.keyspace_keyword() {
            let if_exists = self.if_exists();
            let keyspace = self.identifier()?;
            return Ok(Statement::DropKeyspace {
                keyspace,
                if_exists,
            });
        }

        if self.table_keyword() {
            let if_exists = self.if_exists();
            let table = self.qualified_name()?;
            return Ok(Statement::DropTable { table, if_exists });
        }

        if self.eat_keyword("INDEX") {
            let if_exists = self.if_exists();
            let index = self.qualified_name()?;
            return Ok(Statement::DropIndex { index, if_exists });
        }

        if self.eat_keyword("TYPE") {
            let if_exists = self.if_exists();
            let name = self.qualified_name()?;
            return Ok(Statement::DropType { name, if_exists });
        }

        if self.eat_keyword("TRIGGER") {
            let if_exists = self.if_exists();
            let trigger = self.identifier()?;
            self.expect_keyword("ON")?;
            let table = self.qualified_name()?;
            return Ok(Statement::DropTrigger {
                trigger,
                table,
                if_exists,
            });
        }

        if self.eat_keywords(&["MATERIALIZED", "VIEW"]) {
            let if_exists = self.if_exists();
            let view = self.qualified_name()?;
            return Ok(Statement::DropMaterializedView { view, if_exists });
        }

        if self.eat_keyword("FUNCTION") {
            let if_exists = self.if_exists();
            let function = self.qualified_name()?;
            if self.at_symbol('(') {
                self.parenthesized()?;
            }
            return Ok(Statement::DropFunction {
                function,
                if_exists,
            });
        }

        if self.eat_keyword("AGGREGATE") {
            let if_exists = self.if_exists();
            let aggregate = self.qualified_name()?;
            if self.at_symbol('(') {
                self.parenthesized()?;
            }
            return Ok(Statement::DropAggregate {
                aggregate,
                if_exists,
            });
        }

        if let Some(kind) = self.principal_keyword() {
            let if_exists = self.if_exists();
            let principal = self.principal()?;
            return Ok(Statement::DropPrincipal {
                kind,
                principal,
                if_exists,
            });
        }

        Err(unclassified("unsupported DROP"))
    }

    /// Advance past `keyword` at parenthesis depth zero.
    fn skip_to_top_level_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        let mut depth = 0usize;
        while let Some(token) = self.bump() {
            if token.is_symbol('(') {
                depth += 1;
            } else if token.is_symbol(')') {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| unclassified("unbalanced parentheses"))?;
            } else if token.is_symbol(';') {
                break;
            } else if depth == 0 && token.is_keyword(keyword) {
                return Ok(());
            }
        }
        Err(unclassified(format!("expected {keyword}")))
    }

    fn select(&mut self) -> ParseResult<Statement> {
        self.skip_to_top_level_keyword("FROM")?;
        let table = self.qualified_name()?;

        let mut filters = Vec::new();
        let mut markers = Vec::new();
        if self.eat_keyword("WHERE") {
            while !self.at_end() && !self.at_symbol(';') {
                if let Some(filter) = self.literal_filter() {
                    filters.push(filter);
                } else if let Some(filter) = self.marker_filter() {
                    markers.push(filter);
                } else {
                    self.pos += 1;
                }
            }
        } else {
            self.skip_rest();
        }

        Ok(Statement::Select {
            table,
            filters,
            markers,
        })
    }

    /// `column = ?` or `column IN (?, ...)` at the cursor. Consumes it on
    /// success and nothing otherwise.
    fn marker_filter(&mut self) -> Option<MarkerFilter> {
        let column = self.peek().filter(|t| is_name(t))?;
        let column = Identifier::from_token(column)?.name;
        let first = self.tokens[..self.pos]
            .iter()
            .filter(|t| t.is_symbol('?'))
            .count();
        let marker_at = |offset: usize| self.peek_at(offset).is_some_and(|t| t.is_symbol('?'));

        if self.peek_at(1).is_some_and(|t| t.is_symbol('=')) && marker_at(2) {
            self.pos += 3;
            return Some(MarkerFilter {
                column,
                markers: vec![first],
            });
        }

        if self.peek_at(1).is_some_and(|t| t.is_keyword("IN"))
            && self.peek_at(2).is_some_and(|t| t.is_symbol('('))
        {
            let mut markers = Vec::new();
            let mut offset = 3;
            loop {
                if !marker_at(offset) {
                    return None;
                }
                markers.push(first + markers.len());
                let separator = self.peek_at(offset + 1)?;
                offset += 2;
                if separator.is_symbol(')') {
                    break;
                }
                if !separator.is_symbol(',') {
                    return None;
                }
            }
            self.pos += offset;
            return Some(MarkerFilter { column, markers });
        }

        None
    }

    /// `column = 'x'` or `column IN ('x', 'y')` at the cursor. Consumes it
    /// on success and nothing otherwise.
    fn literal_filter(&mut self) -> Option<LiteralFilter> {
        let column = self.peek()?;
        if !matches!(column.kind, TokenKind::Word | TokenKind::QuotedName)
            || (column.kind == TokenKind::Word && is_reserved(column.text))
        {
            return None;
        }
        let column = Identifier::from_token(column)?.name;

        let string_at = |offset: usize| {
            self.peek_at(offset)
                .filter(|t| t.kind == TokenKind::StringLiteral)
                .map(|t| StringValue {
                    value: t.unquoted(),
                    span: t.span,
                })
        };

        if self.peek_at(1).is_some_and(|t| t.is_symbol('=')) {
            let value = string_at(2)?;
            self.pos += 3;
            return Some(LiteralFilter {
                column,
                values: vec![value],
            });
        }

        if self.peek_at(1).is_some_and(|t| t.is_keyword("IN"))
            && self.peek_at(2).is_some_and(|t| t.is_symbol('('))
        {
            let mut values = Vec::new();
            let mut offset = 3;
            loop {
                values.push(string_at(offset)?);
                let separator = self.peek_at(offset + 1)?;
                offset += 2;
                if separator.is_symbol(')') {
                    break;
                }
                if !separator.is_symbol(',') {
                    return None;
                }
            }
            self.pos += offset;
            return Some(LiteralFilter { column, values });
        }

        None
    }

    fn batch(&mut self) -> ParseResult<Statement> {
        if !self.eat_keyword("UNLOGGED") {
            self.eat_keyword("COUNTER");
        }
        self.expect_keyword("BATCH")?;
        if self.eat_keyword("USING") {
            while !self.at_end() && !self.at_dml_keyword() {
                self.pos += 1;
            }
        }

        let mut statements = Vec::new();
        loop {
            while self.eat_symbol(';') {}
            if self.eat_keywords(&["APPLY", "BATCH"]) {
                break;
            }
            if !self.at_dml_keyword() {
                return Err(unclassified("expected INSERT, UPDATE, DELETE or APPLY BATCH"));
            }

            let start = self.pos;
            self.pos += 1;
            while !self.at_end() && !self.at_symbol(';') && !self.at_dml_keyword() {
                if self.at_keyword("APPLY") {
                    break;
                }
                self.pos += 1;
            }

            let mut inner = Parser::new(&self.tokens[start..self.pos]);
            let statement = inner.statement()?;
            inner.finish()?;
            statements.push(statement);
        }

        Ok(Statement::Batch { statements })
    }

    fn at_dml_keyword(&self) -> bool {
        self.at_keyword("INSERT") || self.at_keyword("UPDATE") || self.at_keyword("DELETE")
    }

    fn permission(&mut self) -> ParseResult<Permission> {
        let token = self
            .bump()
            .ok_or_else(|| unclassified("expected a permission"))?;
        if token.kind != TokenKind::Word {
            return Err(unclassified("expected a permission"));
        }
        let permission = Permission::from_keyword(token.text)
            .ok_or_else(|| unclassified(format!("unknown permission {}", token.text)))?;
        if permission == Permission::All {
            self.eat_keyword("PERMISSIONS");
        } else {
            self.eat_keyword("PERMISSION");
        }
        Ok(permission)
    }

    fn at_permission(&self) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        if token.kind != TokenKind::Word || Permission::from_keyword(token.text).is_none() {
            return false;
        }
        self.peek_at(1).is_none_or(|next| {
            next.is_keyword("ON")
                || next.is_keyword("OF")
                || next.is_keyword("PERMISSION")
                || next.is_keyword("PERMISSIONS")
                || next.is_keyword("NORECURSIVE")
                || next.is_symbol(';')
        })
    }

    fn resource(&mut self) -> ParseResult<Resource> {
        if self.eat_keywords(&["ALL", "KEYSPACES"]) {
            return Ok(Resource::AllKeyspaces);
        }
        if self.eat_keywords(&["ALL", "ROLES"]) {
            return Ok(Resource::AllRoles);
        }
        if self.keyspace_keyword() {
            return Ok(Resource::Keyspace(self.identifier()?));
        }
        if self.eat_keyword("ROLE") {
            return Ok(Resource::Role(self.principal()?));
        }
        if self.eat_keywords(&["ALL", "FUNCTIONS", "IN"]) {
            if !self.keyspace_keyword() {
                return Err(unclassified("expected KEYSPACE"));
            }
            return Ok(Resource::AllFunctionsInKeyspace(self.identifier()?));
        }
        if self.eat_keywords(&["ALL", "FUNCTIONS"]) {
            return Ok(Resource::AllFunctions);
        }
        if self.eat_keyword("FUNCTION") {
            let function = self.qualified_name()?;
            self.parenthesized()?;
            return Ok(Resource::Function(function));
        }
        if self.at_keyword("ALL") || self.at_keyword("MBEAN") || self.at_keyword("MBEANS") {
            return Err(unclassified("unsupported resource"));
        }
        self.table_keyword();
        Ok(Resource::Table(self.qualified_name()?))
    }

    fn grant_or_revoke(&mut self, grant: bool) -> ParseResult<Statement> {
        let preposition = if grant { "TO" } else { "FROM" };

        if self.at_permission() {
            let permission = self.permission()?;
            self.expect_keyword("ON")?;
            let resource = self.resource()?;
            self.expect_keyword(preposition)?;
            let principal = self.principal()?;
            return Ok(if grant {
                Statement::Grant {
                    permission,
                    resource,
                    grantee: principal,
                }
            } else {
                Statement::Revoke {
                    permission,
                    resource,
                    revokee: principal,
                }
            });
        }

        let role = self.principal()?;
        self.expect_keyword(preposition)?;
        let principal = self.principal()?;
        Ok(if grant {
            Statement::GrantRole {
                role,
                grantee: principal,
            }
        } else {
            Statement::RevokeRole {
                role,
                revokee: principal,
            }
        })
    }

    fn list(&mut self) -> ParseResult<Statement> {
        if self.eat_keyword("USERS") {
            return Ok(Statement::ListPrincipals {
                kind: PrincipalKind::User,
                of: None,
                norecursive: false,
            });
        }

        if self.eat_keyword("ROLES") {
            let of = if self.eat_keyword("OF") {
                Some(self.principal()?)
            } else {
                None
            };
            let norecursive = self.eat_keyword("NORECURSIVE");
            return Ok(Statement::ListPrincipals {
                kind: PrincipalKind::Role,
                of,
                norecursive,
            });
        }

        if !self.at_permission() {
            return Err(unclassified("unsupported LIST"));
        }
        let permission = self.permission()?;
        let resource = if self.eat_keyword("ON") {
            Some(self.resource()?)
        } else {
            None
        };
        let of = if self.eat_keyword("OF") {
            Some(self.principal()?)
        } else {
            None
        };
        let norecursive = self.eat_keyword("NORECURSIVE");
        Ok(Statement::ListPermissions {
            permission,
            resource,
            of,
            norecursive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{PrincipalForm, Verb};
    use pretty_assertions::assert_eq;

    fn classify(raw: &str) -> Statement {
        StatementClassifier::new()
            .classify(raw)
            .unwrap_or_else(|e| panic!("{raw:?}: {e}"))
            .statement
    }

    fn rejects(raw: &str) -> bool {
        matches!(
            StatementClassifier::new().classify(raw),
            Err(RewriteError::Classification(_))
        )
    }

    fn keyspace_names(statement: &Statement) -> Vec<String> {
        statement
            .targets()
            .into_iter()
            .filter_map(|t| match t {
                crate::statement::Target::Keyspace(k) => Some(k.name.clone()),
                crate::statement::Target::Principal(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_use_variants() {
        for raw in ["USE foo", "use foo;", "USE\n\n\t foo\n;", "Use FOO"] {
            match classify(raw) {
                Statement::Use { keyspace } => {
                    assert_eq!(keyspace.name, "foo");
                    assert!(!keyspace.quoted);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        match classify("use \"System\";") {
            Statement::Use { keyspace } => {
                assert_eq!(keyspace.name, "System");
                assert!(keyspace.quoted);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_schema_is_keyspace_alias() {
        let a = classify(
            "CREATE KEYSPACE foo WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 1}",
        );
        let b = classify(
            "create schema foo with replication = {'class': 'SimpleStrategy', 'replication_factor': 1}",
        );
        assert_eq!(a.verb(), Verb::CreateKeyspace);
        assert_eq!(b.verb(), Verb::CreateKeyspace);
        assert_eq!(keyspace_names(&a), keyspace_names(&b));
    }

    #[test]
    fn test_if_exists_flags() {
        assert!(matches!(
            classify("CREATE KEYSPACE IF NOT EXISTS foo WITH replication = {}"),
            Statement::CreateKeyspace {
                if_not_exists: true,
                ..
            }
        ));
        assert!(matches!(
            classify("DROP TABLE IF EXISTS ks.t"),
            Statement::DropTable {
                if_exists: true,
                ..
            }
        ));
    }

    #[test]
    fn test_qualified_table_names() {
        let statement = classify("CREATE TABLE ks.\"MyTable\" (k int PRIMARY KEY)");
        let table = statement.table().unwrap();
        assert_eq!(table.keyspace.as_ref().unwrap().name, "ks");
        assert_eq!(table.name.name, "MyTable");
        assert!(table.name.quoted);

        let statement = classify("ALTER COLUMNFAMILY t ADD v text");
        assert!(statement.table().unwrap().keyspace.is_none());
    }

    #[test]
    fn test_dml_tables() {
        assert_eq!(
            keyspace_names(&classify("SELECT count(*) FROM ks.t WHERE k = 1")),
            vec!["ks"]
        );
        assert_eq!(
            keyspace_names(&classify("INSERT INTO KS.t (k, v) VALUES (1, 'a')")),
            vec!["ks"]
        );
        assert_eq!(
            keyspace_names(&classify("UPDATE ks.t USING TTL 5 SET v = 'x' WHERE k = 1")),
            vec!["ks"]
        );
        assert_eq!(
            keyspace_names(&classify("DELETE v FROM ks.t WHERE k = 1")),
            vec!["ks"]
        );
        assert!(keyspace_names(&classify("select * from t")).is_empty());
    }

    #[test]
    fn test_batch() {
        let statement = classify(
            "BEGIN UNLOGGED BATCH USING TIMESTAMP 5 \
             INSERT INTO a.t (k) VALUES (1); \
             UPDATE b.t SET v = 2 WHERE k = 1 \
             DELETE FROM t WHERE k = 3; \
             APPLY BATCH;",
        );
        match &statement {
            Statement::Batch { statements } => assert_eq!(statements.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(keyspace_names(&statement), vec!["a", "b"]);
    }

    #[test]
    fn test_select_literal_filters() {
        match classify(
            "SELECT * FROM system.schema_keyspaces WHERE keyspace_name = 'foo' AND x IN ('a', 'b''c')",
        ) {
            Statement::Select { filters, .. } => {
                assert_eq!(filters.len(), 2);
                assert_eq!(filters[0].column, "keyspace_name");
                assert_eq!(filters[0].values[0].value, "foo");
                assert_eq!(filters[1].values[1].value, "b'c");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_select_marker_filters() {
        match classify(
            "SELECT * FROM system_schema.tables WHERE k = ? AND keyspace_name IN (?, ?) AND table_name = ?",
        ) {
            Statement::Select { filters, markers, .. } => {
                assert!(filters.is_empty());
                let positions: Vec<_> = markers
                    .iter()
                    .map(|f| (f.column.as_str(), f.markers.clone()))
                    .collect();
                assert_eq!(
                    positions,
                    vec![
                        ("k", vec![0]),
                        ("keyspace_name", vec![1, 2]),
                        ("table_name", vec![3]),
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_principal_statements() {
        match classify("CREATE USER IF NOT EXISTS 'bob' WITH PASSWORD 'x' NOSUPERUSER") {
            Statement::CreatePrincipal {
                kind,
                principal,
                if_not_exists,
            } => {
                assert_eq!(kind, PrincipalKind::User);
                assert_eq!(principal.name, "bob");
                assert_eq!(principal.form, PrincipalForm::Literal);
                assert!(if_not_exists);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(classify("drop role \"Ops\"").verb(), Verb::DropRole);
        assert_eq!(classify("ALTER USER bob WITH PASSWORD 'y'").verb(), Verb::AlterUser);
    }

    #[test]
    fn test_grant_and_revoke_targets() {
        match classify("GRANT ALL PERMISSIONS ON ALL KEYSPACES TO bob") {
            Statement::Grant {
                permission,
                resource,
                ..
            } => {
                assert_eq!(permission, Permission::All);
                assert_eq!(resource, Resource::AllKeyspaces);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            classify("grant select on keyspace foo to bob"),
            Statement::Grant {
                resource: Resource::Keyspace(_),
                ..
            }
        ));
        assert!(matches!(
            classify("REVOKE MODIFY PERMISSION ON TABLE ks.t FROM bob"),
            Statement::Revoke {
                resource: Resource::Table(_),
                ..
            }
        ));
        assert!(matches!(
            classify("REVOKE SELECT ON ks.t FROM bob"),
            Statement::Revoke {
                resource: Resource::Table(_),
                ..
            }
        ));
        assert_eq!(classify("GRANT ops TO bob").verb(), Verb::GrantRole);
    }

    #[test]
    fn test_list_statements() {
        assert_eq!(classify("LIST USERS").verb(), Verb::ListUsers);
        assert_eq!(classify("list users;").verb(), Verb::ListUsers);

        match classify("LIST ALL PERMISSIONS ON KEYSPACE foo OF bob NORECURSIVE") {
            Statement::ListPermissions {
                permission,
                resource,
                of,
                norecursive,
            } => {
                assert_eq!(permission, Permission::All);
                assert!(matches!(resource, Some(Resource::Keyspace(_))));
                assert_eq!(of.unwrap().name, "bob");
                assert!(norecursive);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            classify("LIST ALL"),
            Statement::ListPermissions {
                resource: None,
                of: None,
                ..
            }
        ));
        assert_eq!(classify("LIST ROLES OF alice").verb(), Verb::ListRoles);
    }

    #[test]
    fn test_index_type_trigger() {
        assert!(matches!(
            classify("CREATE INDEX ON ks.t (v)"),
            Statement::CreateIndex { index: None, .. }
        ));
        assert!(matches!(
            classify("CREATE INDEX IF NOT EXISTS idx ON t (v)"),
            Statement::CreateIndex {
                index: Some(_),
                if_not_exists: true,
                ..
            }
        ));
        assert_eq!(keyspace_names(&classify("DROP INDEX ks.idx")), vec!["ks"]);
        assert_eq!(
            keyspace_names(&classify("CREATE TYPE ks.address (street text)")),
            vec!["ks"]
        );
        assert_eq!(
            classify("CREATE TRIGGER trg ON ks.t USING 'org.example.Trigger'").verb(),
            Verb::CreateTrigger
        );
        assert_eq!(classify("TRUNCATE ks.t").verb(), Verb::Truncate);
    }

    #[test]
    fn test_unclassified_statements() {
        assert!(rejects(""));
        assert!(rejects("SELEC * FROM t"));
        assert!(rejects("USE"));
        assert!(rejects("USE foo bar"));
        assert!(rejects("USE foo; USE bar"));
        assert!(rejects("USE table"));
        assert!(rejects("CREATE KEYSPACE foo"));
        assert!(rejects("SELECT 'unterminated"));
        assert!(rejects("CREATE OR REPLACE TABLE ks.t (k int PRIMARY KEY)"));
        assert!(rejects("CREATE FUNCTION ks.f RETURNS int"));
        assert!(rejects("GRANT DESCRIBE ON ALL MBEANS TO bob"));
    }

    fn parsed(raw: &str) -> ParsedStatement {
        StatementClassifier::new()
            .classify(raw)
            .unwrap_or_else(|e| panic!("{raw:?}: {e}"))
    }

    fn all_keyspaces(raw: &str) -> Vec<String> {
        parsed(raw)
            .targets()
            .into_iter()
            .filter_map(|t| match t {
                Target::Keyspace(k) => Some(k.name.clone()),
                Target::Principal(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_materialized_views() {
        let statement = classify(
            "CREATE MATERIALIZED VIEW IF NOT EXISTS mine.v AS SELECT k, v FROM mine.t \
             WHERE v IS NOT NULL AND k IS NOT NULL PRIMARY KEY (v, k)",
        );
        assert_eq!(statement.verb(), Verb::CreateMaterializedView);
        assert_eq!(keyspace_names(&statement), vec!["mine", "mine"]);
        assert_eq!(statement.table().unwrap().name.name, "v");

        assert_eq!(
            keyspace_names(&classify("DROP MATERIALIZED VIEW IF EXISTS ks.v")),
            vec!["ks"]
        );
        assert_eq!(
            classify("ALTER MATERIALIZED VIEW ks.v WITH comment = 'x'").verb(),
            Verb::AlterMaterializedView
        );
    }

    #[test]
    fn test_functions_and_aggregates() {
        match classify(
            "CREATE OR REPLACE FUNCTION IF NOT EXISTS ks.f (x int) RETURNS NULL ON NULL INPUT \
             RETURNS int LANGUAGE java AS 'return x;'",
        ) {
            Statement::CreateFunction {
                function,
                or_replace,
                if_not_exists,
            } => {
                assert_eq!(function.keyspace.unwrap().name, "ks");
                assert!(or_replace);
                assert!(if_not_exists);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(keyspace_names(&classify("DROP FUNCTION ks.f")), vec!["ks"]);
        assert_eq!(
            keyspace_names(&classify("DROP FUNCTION IF EXISTS ks.f(int, frozen<list<text>>)")),
            vec!["ks"]
        );
        assert_eq!(
            classify("CREATE AGGREGATE ks.total (int) SFUNC plus STYPE int INITCOND 0").verb(),
            Verb::CreateAggregate
        );
        assert_eq!(
            keyspace_names(&classify("DROP AGGREGATE ks.total")),
            vec!["ks"]
        );
    }

    #[test]
    fn test_function_resources() {
        assert!(matches!(
            classify("GRANT EXECUTE ON ALL FUNCTIONS TO bob"),
            Statement::Grant {
                resource: Resource::AllFunctions,
                ..
            }
        ));
        assert_eq!(
            keyspace_names(&classify("GRANT EXECUTE ON ALL FUNCTIONS IN KEYSPACE ks TO bob")),
            vec!["ks"]
        );
        assert_eq!(
            keyspace_names(&classify("REVOKE EXECUTE ON FUNCTION ks.f(int) FROM bob")),
            vec!["ks"]
        );
        assert!(matches!(
            classify("LIST ALL PERMISSIONS ON FUNCTION ks.f(int) OF bob"),
            Statement::ListPermissions {
                resource: Some(Resource::Function(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_function_call_qualifiers() {
        assert_eq!(all_keyspaces("SELECT ks.f(v) FROM t"), vec!["ks"]);
        assert_eq!(
            all_keyspaces("SELECT k FROM a.t WHERE v = b.f(1) AND w = 'c.g(2)'"),
            vec!["a", "b"]
        );
        assert_eq!(
            all_keyspaces("UPDATE t SET v = \"Ks\".f(1) WHERE k = 1"),
            vec!["Ks"]
        );
        assert_eq!(
            all_keyspaces("BEGIN BATCH INSERT INTO a.t (k, v) VALUES (1, b.f(2)); APPLY BATCH"),
            vec!["a", "b"]
        );
        // Declared names are not repeated.
        assert_eq!(all_keyspaces("CREATE TABLE ks.t (k int PRIMARY KEY)"), vec!["ks"]);
        assert_eq!(all_keyspaces("DROP FUNCTION ks.f(int)"), vec!["ks"]);
    }

    #[test]
    fn test_comments_do_not_change_classification() {
        let plain = classify("DROP KEYSPACE foo");
        let commented = classify("/* c */ DROP -- x\n KEYSPACE // y\n foo");
        assert_eq!(plain.verb(), commented.verb());
        assert_eq!(keyspace_names(&plain), keyspace_names(&commented));
    }
}
