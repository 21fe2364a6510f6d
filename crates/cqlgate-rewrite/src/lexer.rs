//! CQL tokenizer.
//!
//! Produces tokens carrying their byte span in the source so that the
//! rewriter can replace identifiers in place and leave every other byte
//! (comments, literals, whitespace) untouched.

use std::fmt;

/// Half-open byte range `[start, end)` in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword.
    Word,
    /// `"Quoted"` identifier.
    QuotedName,
    /// `'string'` literal.
    StringLiteral,
    /// `$$string$$` literal.
    DollarString,
    /// Numeric, hex blob or UUID-ish literal starting with a digit.
    Number,
    /// Any single punctuation character.
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Source text of the token, delimiters included.
    pub text: &'a str,
    pub span: Span,
}

impl Token<'_> {
    /// Case-insensitive keyword match.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol && self.text.starts_with(symbol)
    }

    /// Content of a quoted name or string literal with its escapes resolved.
    /// Other tokens are returned as written.
    pub fn unquoted(&self) -> String {
        match self.kind {
            TokenKind::QuotedName => unescape(self.text, '"'),
            TokenKind::StringLiteral => unescape(self.text, '\''),
            TokenKind::DollarString => self.text[2..self.text.len() - 2].to_string(),
            _ => self.text.to_string(),
        }
    }

    /// Normalized form used to compare statements regardless of keyword
    /// case: words are lowercased, everything else is kept.
    pub fn canonical(&self) -> String {
        match self.kind {
            TokenKind::Word => self.text.to_ascii_lowercase(),
            _ => self.text.to_string(),
        }
    }
}

fn unescape(text: &str, quote: char) -> String {
    let inner = &text[1..text.len() - 1];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

/// Input the tokenizer cannot split safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub what: &'static str,
    pub offset: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unterminated {} at byte {}", self.what, self.offset)
    }
}

impl std::error::Error for LexError {}

/// Split `input` into tokens, skipping whitespace and comments.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let b = bytes[pos];

        if b.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        // Line comments.
        if (b == b'-' && bytes.get(pos + 1) == Some(&b'-'))
            || (b == b'/' && bytes.get(pos + 1) == Some(&b'/'))
        {
            pos = input[pos..]
                .find('\n')
                .map(|i| pos + i + 1)
                .unwrap_or(bytes.len());
            continue;
        }

        if b == b'/' && bytes.get(pos + 1) == Some(&b'*') {
            match input[pos + 2..].find("*/") {
                Some(i) => pos = pos + 2 + i + 2,
                None => {
                    return Err(LexError {
                        what: "comment",
                        offset: pos,
                    });
                }
            }
            continue;
        }

        let start = pos;
        let kind = match b {
            b'\'' | b'"' => {
                pos = scan_quoted(bytes, pos, b).ok_or(LexError {
                    what: if b == b'"' { "quoted name" } else { "string" },
                    offset: start,
                })?;
                if b == b'"' {
                    TokenKind::QuotedName
                } else {
                    TokenKind::StringLiteral
                }
            }
            b'$' if bytes.get(pos + 1) == Some(&b'$') => {
                let close = input[pos + 2..].find("$$").ok_or(LexError {
                    what: "string",
                    offset: start,
                })?;
                pos = pos + 2 + close + 2;
                TokenKind::DollarString
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                pos += 1;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                TokenKind::Word
            }
            b if b.is_ascii_digit() => {
                pos += 1;
                while pos < bytes.len() && is_number_byte(bytes, pos) {
                    pos += 1;
                }
                TokenKind::Number
            }
            _ => {
                // One character, which may be multi-byte.
                let width = input[pos..].chars().next().map_or(1, char::len_utf8);
                pos += width;
                TokenKind::Symbol
            }
        };

        tokens.push(Token {
            kind,
            text: &input[start..pos],
            span: Span::new(start, pos),
        });
    }

    Ok(tokens)
}

/// Returns the end offset of a quoted token starting at `start`, handling the
/// doubled-quote escape.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return Some(pos + 1);
        }
        pos += 1;
    }
    None
}

fn is_number_byte(bytes: &[u8], pos: usize) -> bool {
    let b = bytes[pos];
    if b.is_ascii_alphanumeric() || b == b'_' {
        return true;
    }
    // Decimal point, but not the start of a `..` range or a qualified name.
    b == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        assert_eq!(
            kinds("USE \"MyKs\";"),
            vec![
                (TokenKind::Word, "USE"),
                (TokenKind::QuotedName, "\"MyKs\""),
                (TokenKind::Symbol, ";"),
            ]
        );
    }

    #[test]
    fn test_spans_point_into_source() {
        let input = "select *\n  from ks.t";
        for token in tokenize(input).unwrap() {
            assert_eq!(&input[token.span.start..token.span.end], token.text);
        }
    }

    #[test]
    fn test_comments_are_skipped() {
        let input = "-- leading\nDROP /* inline */ KEYSPACE // trailing\n foo";
        assert_eq!(
            kinds(input),
            vec![
                (TokenKind::Word, "DROP"),
                (TokenKind::Word, "KEYSPACE"),
                (TokenKind::Word, "foo"),
            ]
        );
    }

    #[test]
    fn test_escapes() {
        let tokens = tokenize("'it''s' \"a\"\"b\" $$x'y$$").unwrap();
        assert_eq!(tokens[0].unquoted(), "it's");
        assert_eq!(tokens[1].unquoted(), "a\"b");
        assert_eq!(tokens[2].unquoted(), "x'y");
    }

    #[test]
    fn test_numbers_and_qualified_names() {
        assert_eq!(
            kinds("1.5 ks.t 0xff"),
            vec![
                (TokenKind::Number, "1.5"),
                (TokenKind::Word, "ks"),
                (TokenKind::Symbol, "."),
                (TokenKind::Word, "t"),
                (TokenKind::Number, "0xff"),
            ]
        );
    }

    #[test]
    fn test_unterminated_input() {
        assert_eq!(tokenize("SELECT 'oops").unwrap_err().what, "string");
        assert_eq!(tokenize("USE \"ks").unwrap_err().what, "quoted name");
        assert_eq!(tokenize("/* never closed").unwrap_err().what, "comment");
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let tokens = tokenize("KeySpace \"keyspace\"").unwrap();
        assert!(tokens[0].is_keyword("keyspace"));
        assert!(!tokens[1].is_keyword("keyspace"));
    }
}
