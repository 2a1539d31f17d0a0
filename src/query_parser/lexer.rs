use once_cell::sync::Lazy;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword
    Word,
    /// Backtick or double-quote delimited identifier
    QuotedIdent,
    Number,
    /// String literal, or a collapsed subquery block
    Literal,
    Operator,
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
}

/// A lexical token with its byte span in the source text.
///
/// `depth` is the parenthesis nesting level the token sits at; both
/// parentheses of a pair carry the depth of their surroundings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub depth: usize,
}

/// Words that end a table reference or open a clause; never taken as aliases
static CLAUSE_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "SELECT", "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "FETCH",
        "UNION", "EXCEPT", "INTERSECT", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER",
        "CROSS", "NATURAL", "STRAIGHT_JOIN", "ON", "USING", "SET", "INTO", "VALUES", "FOR",
        "LOCK", "WINDOW", "RETURNING", "USE", "FORCE", "IGNORE", "PARTITION", "AS", "WITH",
        "PROCEDURE", "LATERAL",
    ]
    .into_iter()
    .collect()
});

/// Words that can never be a bare column reference
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "AND", "OR", "NULL", "NOT", "IS", "IN", "LIKE", "BETWEEN", "TRUE", "FALSE", "UNKNOWN",
        "XOR", "CASE", "WHEN", "THEN", "ELSE", "END", "EXISTS", "ANY", "ALL", "SOME", "ASC",
        "DESC", "DISTINCT", "INTERVAL", "DEFAULT", "REGEXP", "RLIKE", "ILIKE", "ESCAPE", "COLLATE",
        "BINARY", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "LOCALTIME",
        "LOCALTIMESTAMP", "NULLS", "FIRST", "LAST", "ROLLUP", "DIV", "MOD", "SOUNDS",
    ]
    .into_iter()
    .chain(CLAUSE_KEYWORDS.iter().copied())
    .collect()
});

impl Token {
    /// Case-insensitive keyword test on bare words
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.is_keyword(k))
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    /// Identifier usable as a table, alias or column name.
    /// Bare words must not be reserved.
    pub fn is_identifier(&self) -> bool {
        match self.kind {
            TokenKind::QuotedIdent => !self.text.is_empty(),
            TokenKind::Word => !is_reserved(&self.text),
            _ => false,
        }
    }

    /// Identifier in a position where any word is a name, e.g. after a dot
    pub fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent) && !self.text.is_empty()
    }

    /// Identifier usable as a table alias
    pub fn is_alias(&self) -> bool {
        match self.kind {
            TokenKind::QuotedIdent => !self.text.is_empty(),
            TokenKind::Word => !is_clause_keyword(&self.text),
            _ => false,
        }
    }

    /// Comparison operators that relate two operands
    pub fn is_comparison(&self) -> bool {
        self.kind == TokenKind::Operator
            && matches!(self.text.as_str(), "=" | "==" | "<" | ">" | "<=" | ">=" | "<>" | "!=" | "<=>")
    }
}

pub fn is_clause_keyword(word: &str) -> bool {
    CLAUSE_KEYWORDS.contains(word.to_ascii_uppercase().as_str())
}

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(word.to_ascii_uppercase().as_str())
}

/// Split SQL text into tokens. Never fails: unterminated quotes run to the
/// end of input and unbalanced parentheses clamp the depth at zero.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let ch = bytes[i];
        let start = i;

        if ch.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let (kind, text, end) = match ch {
            b'(' => {
                let token = (TokenKind::LParen, "(".to_string(), i + 1);
                tokens.push(Token { kind: token.0, text: token.1, start, end: token.2, depth });
                depth += 1;
                i += 1;
                continue;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                (TokenKind::RParen, ")".to_string(), i + 1)
            }
            b',' => (TokenKind::Comma, ",".to_string(), i + 1),
            b'.' if followed_by_digit(bytes, i) && starts_number(&tokens) => {
                let end = scan_digits(bytes, i + 1);
                (TokenKind::Number, sql[start..end].to_string(), end)
            }
            b'.' => (TokenKind::Dot, ".".to_string(), i + 1),
            b';' => (TokenKind::Semicolon, ";".to_string(), i + 1),
            b'\'' => {
                let end = scan_quoted(bytes, i, b'\'', true);
                (TokenKind::Literal, sql[start..end].to_string(), end)
            }
            b'`' | b'"' => {
                let end = scan_quoted(bytes, i, ch, ch == b'"');
                let inner_end = if end > start + 1 && bytes[end - 1] == ch { end - 1 } else { end };
                let quote = ch as char;
                let inner = sql[start + 1..inner_end].replace(&format!("{quote}{quote}"), &quote.to_string());
                (TokenKind::QuotedIdent, inner, end)
            }
            c if is_word_byte(c) => {
                let mut end = i;
                while end < bytes.len() && is_word_byte(bytes[end]) {
                    end += 1;
                }
                if sql[start..end].bytes().all(|b| b.is_ascii_digit()) {
                    if bytes.get(end) == Some(&b'.') && followed_by_digit(bytes, end) {
                        end = scan_digits(bytes, end + 1);
                    }
                    (TokenKind::Number, sql[start..end].to_string(), end)
                } else {
                    (TokenKind::Word, sql[start..end].to_string(), end)
                }
            }
            c if is_operator_byte(c) => {
                let mut end = i + 1;
                // only comparison characters chain into longer operators
                if is_comparison_byte(c) {
                    while end < bytes.len() && is_comparison_byte(bytes[end]) && end - start < 3 {
                        end += 1;
                    }
                }
                (TokenKind::Operator, sql[start..end].to_string(), end)
            }
            _ => {
                // any other (possibly multi-byte) character becomes a one-char operator
                let width = sql[start..].chars().next().map_or(1, char::len_utf8);
                (TokenKind::Operator, sql[start..start + width].to_string(), start + width)
            }
        };

        tokens.push(Token { kind, text, start, end, depth });
        i = end;
    }

    tokens
}

/// Index of the parenthesis closing the one at `open`
pub fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let depth = tokens.get(open)?.depth;
    tokens[open + 1..]
        .iter()
        .position(|t| t.kind == TokenKind::RParen && t.depth == depth)
        .map(|offset| open + 1 + offset)
}

/// Whether the parenthesis at `open` starts a subquery block
pub fn opens_subquery(tokens: &[Token], open: usize) -> bool {
    tokens.get(open).map_or(false, |t| t.kind == TokenKind::LParen)
        && tokens
            .get(open + 1)
            .map_or(false, |t| t.is_keyword("SELECT") || t.is_keyword("WITH"))
}

/// Source text strictly between a pair of parentheses
pub fn inner_text<'a>(sql: &'a str, tokens: &[Token], open: usize, close: usize) -> &'a str {
    sql[tokens[open].end..tokens[close].start].trim()
}

fn starts_number(tokens: &[Token]) -> bool {
    // a dot directly after a name is a qualifier separator, otherwise it may begin a decimal
    !matches!(
        tokens.last().map(|t| t.kind),
        Some(TokenKind::Word) | Some(TokenKind::QuotedIdent) | Some(TokenKind::RParen)
    )
}

fn followed_by_digit(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1).map_or(false, u8::is_ascii_digit)
}

fn scan_digits(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    i
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_operator_byte(b: u8) -> bool {
    matches!(b, b'=' | b'<' | b'>' | b'!' | b'+' | b'-' | b'*' | b'/' | b'%' | b'|' | b'&' | b'^' | b'~' | b':' | b'?' | b'@')
}

fn is_comparison_byte(b: u8) -> bool {
    matches!(b, b'=' | b'<' | b'>' | b'!')
}

/// Returns the byte offset just past the closing quote (or end of input)
fn scan_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}
