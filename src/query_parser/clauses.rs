use super::lexer::{matching_paren, opens_subquery, Token, TokenKind};
use crate::error::{AdvisorError, AdvisorResult};
use crate::types::QueryType;
use std::ops::Range;

/// Clauses whose bodies are analyzed for column references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    From,
    Set,
    Where,
    GroupBy,
    Having,
    OrderBy,
    /// LIMIT, FOR UPDATE and other trailing clauses
    Tail,
}

/// A clause keyword found at statement level
#[derive(Debug, Clone, Copy)]
struct Boundary {
    kind: ClauseKind,
    /// Index of the (first) keyword token
    keyword: usize,
    /// Index of the first token of the clause body
    body: usize,
}

/// Token ranges of one statement's parts
#[derive(Debug, Clone)]
pub struct StatementLayout {
    /// Statement kind detected from the leading keyword
    pub query_type: QueryType,
    /// SELECT list, empty for UPDATE and DELETE
    pub select_list: Range<usize>,
    /// Table references, including any joins
    pub target: Range<usize>,
    /// Clause bodies following the target, in statement order
    pub clauses: Vec<(ClauseKind, Range<usize>)>,
}

impl StatementLayout {
    /// Body of the first clause of the given kind
    pub fn clause(&self, kind: ClauseKind) -> Option<Range<usize>> {
        self.clauses
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, range)| range.clone())
    }
}

/// Locate the select list, table target and clause bodies of a single statement.
///
/// Fails for statements that are not SELECT, UPDATE or DELETE, or that name
/// no target table.
pub fn layout(tokens: &[Token]) -> AdvisorResult<StatementLayout> {
    let first = tokens
        .first()
        .ok_or_else(|| AdvisorError::parse("empty statement"))?;
    let query_type = match first.kind {
        TokenKind::Word => QueryType::from_keyword(&first.text),
        _ => None,
    }
    .ok_or_else(|| AdvisorError::parse(format!("unsupported statement starting with '{}'", first.text)))?;

    let boundaries = clause_boundaries(tokens);
    let end_of = |from: usize| {
        boundaries
            .iter()
            .find(|b| b.keyword >= from && b.kind != ClauseKind::From)
            .map_or(tokens.len(), |b| b.keyword)
    };

    let (select_list, target) = match query_type {
        QueryType::Select | QueryType::Delete => {
            let from = boundaries
                .iter()
                .find(|b| b.kind == ClauseKind::From)
                .ok_or_else(|| AdvisorError::parse("statement has no FROM clause"))?;
            let select_list = if query_type == QueryType::Select { 1..from.keyword } else { 1..1 };
            (select_list, from.body..end_of(from.body))
        }
        QueryType::Update => {
            let mut start = 1;
            while tokens
                .get(start)
                .map_or(false, |t| t.is_any_keyword(&["LOW_PRIORITY", "IGNORE"]))
            {
                start += 1;
            }
            (1..1, start..end_of(start))
        }
    };

    if target.is_empty() {
        return Err(AdvisorError::parse("statement names no target table"));
    }

    let following: Vec<Boundary> = boundaries
        .into_iter()
        .filter(|b| b.keyword >= target.end && b.kind != ClauseKind::From)
        .collect();
    let clauses = following
        .iter()
        .enumerate()
        .map(|(n, b)| {
            let end = following.get(n + 1).map_or(tokens.len(), |next| next.keyword);
            (b.kind, b.body.min(end)..end)
        })
        .collect();

    Ok(StatementLayout {
        query_type,
        select_list,
        target,
        clauses,
    })
}

fn clause_boundaries(tokens: &[Token]) -> Vec<Boundary> {
    let mut boundaries = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.depth != 0 || token.kind != TokenKind::Word {
            continue;
        }
        let next = tokens.get(i + 1);
        let followed_by = |words: &[&str]| next.map_or(false, |t| t.is_any_keyword(words));
        let after_as = i > 0 && tokens[i - 1].is_keyword("AS");

        let found = match token.text.to_ascii_uppercase().as_str() {
            // unreserved in MySQL, so usable as an alias
            "OFFSET" | "RETURNING" if after_as => None,
            "FROM" => Some((ClauseKind::From, 1)),
            "SET" => Some((ClauseKind::Set, 1)),
            "WHERE" => Some((ClauseKind::Where, 1)),
            "HAVING" => Some((ClauseKind::Having, 1)),
            "GROUP" if followed_by(&["BY"]) => Some((ClauseKind::GroupBy, 2)),
            "ORDER" if followed_by(&["BY"]) => Some((ClauseKind::OrderBy, 2)),
            "LIMIT" | "OFFSET" | "FETCH" | "WINDOW" | "INTO" | "RETURNING" | "PROCEDURE" => {
                Some((ClauseKind::Tail, 1))
            }
            "FOR" if followed_by(&["UPDATE", "SHARE"]) => Some((ClauseKind::Tail, 1)),
            "LOCK" if followed_by(&["IN"]) => Some((ClauseKind::Tail, 1)),
            _ => None,
        };

        if let Some((kind, width)) = found {
            boundaries.push(Boundary {
                kind,
                keyword: i,
                body: i + width,
            });
        }
    }
    boundaries
}

/// Tokens of the first statement in the text; anything after a top-level `;` is dropped
pub fn statement_tokens(mut tokens: Vec<Token>) -> Vec<Token> {
    if let Some(cut) = tokens
        .iter()
        .position(|t| t.kind == TokenKind::Semicolon && t.depth == 0)
    {
        tokens.truncate(cut);
    }
    tokens
}

/// Branches of a UNION / EXCEPT / INTERSECT chain
pub fn split_set_operations(tokens: &[Token]) -> Vec<Range<usize>> {
    let mut branches = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token.depth == 0 && token.is_any_keyword(&["UNION", "EXCEPT", "INTERSECT"]) {
            branches.push(start..i);
            i += 1;
            if tokens.get(i).map_or(false, |t| t.is_any_keyword(&["ALL", "DISTINCT"])) {
                i += 1;
            }
            start = i;
            continue;
        }
        i += 1;
    }
    branches.push(start..tokens.len());
    branches.retain(|range| !range.is_empty());
    branches
}

/// Source text covered by a token range
pub fn text_of<'a>(sql: &'a str, tokens: &[Token], range: &Range<usize>) -> &'a str {
    match (tokens.get(range.start), range.end.checked_sub(1).and_then(|last| tokens.get(last))) {
        (Some(first), Some(last)) if range.start < range.end => &sql[first.start..last.end],
        _ => "",
    }
}

/// Split a range at commas that sit at the range's outermost depth
pub fn split_top_level(tokens: &[Token], range: Range<usize>) -> Vec<Range<usize>> {
    let Some(base) = tokens[range.clone()].iter().map(|t| t.depth).min() else {
        return Vec::new();
    };
    let mut pieces = Vec::new();
    let mut start = range.start;
    for i in range.clone() {
        if tokens[i].kind == TokenKind::Comma && tokens[i].depth == base {
            pieces.push(start..i);
            start = i + 1;
        }
    }
    pieces.push(start..range.end);
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

/// Replace every parenthesised subquery with a single opaque literal token.
///
/// Column scans over the result never descend into nested statements, which
/// are analyzed on their own.
pub fn collapse_subqueries(tokens: &[Token]) -> Vec<Token> {
    let mut collapsed = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if opens_subquery(tokens, i) {
            let close = matching_paren(tokens, i).unwrap_or(tokens.len() - 1);
            collapsed.push(Token {
                kind: TokenKind::Literal,
                text: "(subquery)".to_string(),
                start: tokens[i].start,
                end: tokens[close].end,
                depth: tokens[i].depth,
            });
            i = close + 1;
            continue;
        }
        collapsed.push(tokens[i].clone());
        i += 1;
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_parser::lexer::tokenize;

    #[test]
    fn test_layout_select_clauses() {
        let tokens = tokenize("SELECT a FROM t WHERE b = 1 GROUP BY c HAVING COUNT(*) > 1 ORDER BY d LIMIT 5");
        let layout = layout(&tokens).unwrap();

        assert_eq!(layout.query_type, QueryType::Select);
        assert_eq!(layout.select_list, 1..2);
        assert_eq!(tokens[layout.target.start].text, "t");
        assert_eq!(layout.target.len(), 1);
        let kinds: Vec<ClauseKind> = layout.clauses.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![ClauseKind::Where, ClauseKind::GroupBy, ClauseKind::Having, ClauseKind::OrderBy, ClauseKind::Tail]
        );
        let group_by = layout.clause(ClauseKind::GroupBy).unwrap();
        assert_eq!(tokens[group_by].iter().map(|t| t.text.as_str()).collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_unreserved_word_after_as_is_an_alias() {
        let tokens = tokenize("SELECT * FROM users AS offset WHERE id = 1 LIMIT 5 OFFSET 10");
        let layout = layout(&tokens).unwrap();
        let target: Vec<&str> = tokens[layout.target.clone()].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(target, vec!["users", "AS", "offset"]);
        let kinds: Vec<ClauseKind> = layout.clauses.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![ClauseKind::Where, ClauseKind::Tail, ClauseKind::Tail]);
    }

    #[test]
    fn test_layout_update_target_ends_at_set() {
        let tokens = tokenize("UPDATE LOW_PRIORITY users u SET u.name = 'x' WHERE u.id = 3");
        let layout = layout(&tokens).unwrap();
        assert_eq!(layout.query_type, QueryType::Update);
        let target: Vec<&str> = tokens[layout.target.clone()].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(target, vec!["users", "u"]);
        assert!(layout.clause(ClauseKind::Set).is_some());
        assert!(layout.clause(ClauseKind::Where).is_some());
    }

    #[test]
    fn test_layout_rejects_other_statements() {
        assert!(layout(&tokenize("INSERT INTO t VALUES (1)")).is_err());
        assert!(layout(&tokenize("SELECT 1")).is_err());
        assert!(layout(&tokenize("DELETE FROM")).is_err());
    }

    #[test]
    fn test_nested_from_is_not_a_boundary() {
        let tokens = tokenize("SELECT EXTRACT(YEAR FROM created_at) FROM events WHERE id IN (SELECT id FROM t WHERE x = 1)");
        let layout = layout(&tokens).unwrap();
        let target: Vec<&str> = tokens[layout.target.clone()].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(target, vec!["events"]);
        assert_eq!(layout.clauses.len(), 1);
    }

    #[test]
    fn test_split_set_operations() {
        let tokens = tokenize("SELECT a FROM x UNION ALL SELECT b FROM y EXCEPT SELECT c FROM z");
        assert_eq!(split_set_operations(&tokens).len(), 3);
    }

    #[test]
    fn test_collapse_subqueries() {
        let tokens = tokenize("a IN (SELECT b FROM (SELECT c FROM d) e) AND f = 1");
        let collapsed = collapse_subqueries(&tokens);
        let texts: Vec<&str> = collapsed.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "IN", "(subquery)", "AND", "f", "=", "1"]);
    }
}
