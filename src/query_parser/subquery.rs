use super::lexer::{inner_text, matching_paren, opens_subquery, Token, TokenKind};
use crate::error::{AdvisorError, AdvisorResult};

/// One `name AS (...)` entry of a WITH header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonTableExpr<'a> {
    /// Name the body is referenced by
    pub name: String,
    /// Statement text inside the parentheses
    pub body: &'a str,
}

/// A leading WITH header and where the statement it prefixes begins
#[derive(Debug, Clone)]
pub struct WithClause<'a> {
    pub ctes: Vec<CommonTableExpr<'a>>,
    /// Index of the first token after the header
    pub statement_start: usize,
}

/// Table name given to a derived table, stable for identical inner text
pub fn synthetic_table_name(inner: &str) -> String {
    format!("subquery_{:x}", md5::compute(inner.as_bytes()))
}

/// Text of every parenthesised SELECT not enclosed by another one
pub fn outermost_subqueries<'a>(sql: &'a str, tokens: &[Token]) -> Vec<&'a str> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if opens_subquery(tokens, i) {
            match matching_paren(tokens, i) {
                Some(close) => {
                    blocks.push(inner_text(sql, tokens, i, close));
                    i = close + 1;
                }
                None => {
                    // unbalanced: the block runs to the end of the text
                    blocks.push(sql[tokens[i].end..].trim());
                    break;
                }
            }
            continue;
        }
        i += 1;
    }
    blocks
}

/// Split off a leading `WITH [RECURSIVE] name [(cols)] AS (...) [, ...]` header.
///
/// Returns `Ok(None)` when the statement does not start with WITH.
pub fn split_with_clause<'a>(sql: &'a str, tokens: &[Token]) -> AdvisorResult<Option<WithClause<'a>>> {
    if !tokens.first().map_or(false, |t| t.is_keyword("WITH")) {
        return Ok(None);
    }

    let mut i = 1;
    if token_at(tokens, i)?.is_keyword("RECURSIVE") {
        i += 1;
    }

    let mut ctes = Vec::new();
    loop {
        let name = token_at(tokens, i)?;
        if !name.is_name() {
            return Err(AdvisorError::parse(format!("expected CTE name, found '{}'", name.text)));
        }
        i += 1;

        if token_at(tokens, i)?.kind == TokenKind::LParen {
            i = close_of(tokens, i)? + 1;
        }
        if !token_at(tokens, i)?.is_keyword("AS") {
            return Err(AdvisorError::parse("expected AS in WITH clause"));
        }
        i += 1;
        if token_at(tokens, i)?.is_keyword("NOT") {
            i += 1;
        }
        if token_at(tokens, i)?.is_keyword("MATERIALIZED") {
            i += 1;
        }
        if token_at(tokens, i)?.kind != TokenKind::LParen {
            return Err(AdvisorError::parse("expected parenthesised CTE body"));
        }
        let close = close_of(tokens, i)?;
        ctes.push(CommonTableExpr {
            name: name.text.clone(),
            body: inner_text(sql, tokens, i, close),
        });
        i = close + 1;

        if tokens.get(i).map_or(false, |t| t.kind == TokenKind::Comma) {
            i += 1;
            continue;
        }
        break;
    }

    if i >= tokens.len() {
        return Err(AdvisorError::parse("WITH clause is not followed by a statement"));
    }

    Ok(Some(WithClause {
        ctes,
        statement_start: i,
    }))
}

fn token_at(tokens: &[Token], i: usize) -> AdvisorResult<&Token> {
    tokens
        .get(i)
        .ok_or_else(|| AdvisorError::parse("unexpected end of WITH clause"))
}

fn close_of(tokens: &[Token], open: usize) -> AdvisorResult<usize> {
    matching_paren(tokens, open).ok_or_else(|| AdvisorError::parse("unbalanced parentheses"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_parser::lexer::tokenize;

    #[test]
    fn test_outermost_subqueries_skip_inner_blocks() {
        let sql = "SELECT * FROM (SELECT a FROM (SELECT a FROM t) x) y WHERE b IN (SELECT b FROM u)";
        let tokens = tokenize(sql);
        let blocks = outermost_subqueries(sql, &tokens);
        assert_eq!(
            blocks,
            vec!["SELECT a FROM (SELECT a FROM t) x", "SELECT b FROM u"]
        );
    }

    #[test]
    fn test_split_with_clause() {
        let sql = "WITH RECURSIVE recent (id) AS (SELECT id FROM orders WHERE placed_at > 5), big AS (SELECT id FROM orders WHERE total > (SELECT AVG(total) FROM orders)) SELECT * FROM recent";
        let tokens = tokenize(sql);
        let header = split_with_clause(sql, &tokens).unwrap().unwrap();

        assert_eq!(header.ctes.len(), 2);
        assert_eq!(header.ctes[0].name, "recent");
        assert_eq!(header.ctes[0].body, "SELECT id FROM orders WHERE placed_at > 5");
        assert!(header.ctes[1].body.ends_with("(SELECT AVG(total) FROM orders)"));
        assert!(tokens[header.statement_start].is_keyword("SELECT"));
    }

    #[test]
    fn test_malformed_with_clause() {
        let sql = "WITH x AS SELECT 1";
        assert!(split_with_clause(sql, &tokenize(sql)).is_err());
        let sql = "WITH x AS (SELECT a FROM t)";
        assert!(split_with_clause(sql, &tokenize(sql)).is_err());
        let plain = "SELECT a FROM t";
        assert!(split_with_clause(plain, &tokenize(plain)).unwrap().is_none());
    }

    #[test]
    fn test_synthetic_name_is_stable() {
        let name = synthetic_table_name("SELECT id FROM t");
        assert!(name.starts_with("subquery_"));
        assert_eq!(name.len(), "subquery_".len() + 32);
        assert_eq!(name, synthetic_table_name("SELECT id FROM t"));
        assert_ne!(name, synthetic_table_name("SELECT id FROM u"));
    }
}
