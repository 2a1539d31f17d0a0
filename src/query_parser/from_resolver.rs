use super::lexer::{inner_text, is_clause_keyword, matching_paren, opens_subquery, Token, TokenKind};
use super::subquery::synthetic_table_name;
use crate::error::{AdvisorError, AdvisorResult};
use std::ops::Range;

/// A table named in FROM, JOIN or UPDATE position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Table name, or the synthetic name of a derived table
    pub table: String,
    /// Declared alias, the table name when none was given
    pub alias: String,
    /// Whether the reference is a parenthesised subquery
    pub is_subquery: bool,
}

/// Read the leading comma-separated table list of a statement target.
///
/// Returns the tables in order and the index of the first token after the
/// list, which is where any JOIN chain starts.
pub fn resolve_from(sql: &str, tokens: &[Token], range: Range<usize>) -> AdvisorResult<(Vec<TableRef>, usize)> {
    let (first, mut next) = read_table_ref(sql, tokens, range.start, range.end)
        .ok_or_else(|| AdvisorError::parse("missing target table"))?;
    let mut tables = vec![first];

    while next < range.end && tokens[next].kind == TokenKind::Comma {
        match read_table_ref(sql, tokens, next + 1, range.end) {
            Some((table, after)) => {
                tables.push(table);
                next = after;
            }
            None => break,
        }
    }

    Ok((tables, next))
}

/// Read one table reference starting at `start`, stopping before `end`
pub fn read_table_ref(sql: &str, tokens: &[Token], start: usize, end: usize) -> Option<(TableRef, usize)> {
    if start >= end {
        return None;
    }
    let token = tokens.get(start)?;

    let (table, is_subquery, mut next) = if token.kind == TokenKind::LParen {
        if !opens_subquery(tokens, start) {
            return None;
        }
        let close = matching_paren(tokens, start).filter(|close| *close < end)?;
        (synthetic_table_name(inner_text(sql, tokens, start, close)), true, close + 1)
    } else if is_table_name(token) {
        // schema.table resolves to table
        let mut last = start;
        while last + 2 < end
            && tokens[last + 1].kind == TokenKind::Dot
            && tokens[last + 2].is_name()
        {
            last += 2;
        }
        (tokens[last].text.clone(), false, last + 1)
    } else {
        return None;
    };

    let mut alias = None;
    if next < end && tokens[next].is_keyword("AS") {
        // a dangling AS makes the reference malformed
        let name = tokens.get(next + 1).filter(|t| next + 1 < end && t.is_name())?;
        alias = Some(name.text.clone());
        next += 2;
    } else if next < end && tokens[next].is_alias() {
        alias = Some(tokens[next].text.clone());
        next += 1;
    }

    next = skip_table_hints(tokens, next, end);

    Some((
        TableRef {
            alias: alias.unwrap_or_else(|| table.clone()),
            table,
            is_subquery,
        },
        next,
    ))
}

fn is_table_name(token: &Token) -> bool {
    match token.kind {
        TokenKind::QuotedIdent => !token.text.is_empty(),
        TokenKind::Word => !is_clause_keyword(&token.text),
        _ => false,
    }
}

/// Skip `USE|FORCE|IGNORE INDEX|KEY [FOR ...] (...)` hints and `PARTITION (...)`
fn skip_table_hints(tokens: &[Token], mut i: usize, end: usize) -> usize {
    loop {
        let Some(token) = tokens.get(i).filter(|_| i < end) else {
            return i;
        };

        let mut j = if token.is_any_keyword(&["USE", "FORCE", "IGNORE"])
            && tokens.get(i + 1).map_or(false, |t| t.is_any_keyword(&["INDEX", "KEY"]))
        {
            let mut j = i + 2;
            if tokens.get(j).map_or(false, |t| t.is_keyword("FOR")) {
                j += 1;
                if tokens.get(j).map_or(false, |t| t.is_keyword("JOIN")) {
                    j += 1;
                } else {
                    // ORDER BY / GROUP BY
                    j += 2;
                }
            }
            j
        } else if token.is_keyword("PARTITION") {
            i + 1
        } else {
            return i;
        };

        if tokens.get(j).map_or(false, |t| t.kind == TokenKind::LParen) {
            j = matching_paren(tokens, j).map_or(end, |close| close + 1);
        }
        i = j.min(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_parser::lexer::tokenize;

    fn refs(sql: &str) -> (Vec<TableRef>, usize, usize) {
        let tokens = tokenize(sql);
        let (tables, next) = resolve_from(sql, &tokens, 0..tokens.len()).unwrap();
        (tables, next, tokens.len())
    }

    #[test]
    fn test_alias_forms() {
        let (tables, _, _) = refs("users AS u");
        assert_eq!(tables[0].alias, "u");
        let (tables, _, _) = refs("`users` u");
        assert_eq!(tables[0].table, "users");
        assert_eq!(tables[0].alias, "u");
        let (tables, _, _) = refs("app.users");
        assert_eq!(tables[0].table, "users");
        assert_eq!(tables[0].alias, "users");
    }

    #[test]
    fn test_comma_list_stops_at_join() {
        let (tables, next, _) = refs("a, b bb, c JOIN d ON a.x = d.x");
        let names: Vec<&str> = tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(tables[1].alias, "bb");
        let tokens = tokenize("a, b bb, c JOIN d ON a.x = d.x");
        assert!(tokens[next].is_keyword("JOIN"));
    }

    #[test]
    fn test_derived_table() {
        let (tables, next, len) = refs("(SELECT id FROM orders) AS recent");
        assert!(tables[0].is_subquery);
        assert_eq!(tables[0].table, synthetic_table_name("SELECT id FROM orders"));
        assert_eq!(tables[0].alias, "recent");
        assert_eq!(next, len);
    }

    #[test]
    fn test_index_hints_are_skipped() {
        let (tables, next, len) = refs("users u FORCE INDEX FOR JOIN (idx_email) PARTITION (p1)");
        assert_eq!(tables[0].alias, "u");
        assert_eq!(next, len);
    }

    #[test]
    fn test_dangling_alias_stays_in_range() {
        let tokens = tokenize("users AS");
        assert!(read_table_ref("users AS", &tokens, 0, tokens.len()).is_none());

        // AS is the last token of the range even though a name follows it
        let tokens = tokenize("users AS WHERE");
        assert!(read_table_ref("users AS WHERE", &tokens, 0, 2).is_none());
        assert!(resolve_from("users AS WHERE", &tokens, 0..2).is_err());
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let tokens = tokenize("WHERE x = 1");
        assert!(resolve_from("WHERE x = 1", &tokens, 0..tokens.len()).is_err());
    }
}
