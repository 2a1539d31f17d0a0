use super::clauses::{collapse_subqueries, split_top_level};
use super::lexer::{is_reserved, Token, TokenKind};
use crate::types::{ColumnRef, QueryShape};
use std::collections::HashSet;

const AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];
const SORT_SUFFIXES: &[&str] = &["ASC", "DESC", "NULLS", "FIRST", "LAST", "WITH", "ROLLUP"];
const PATTERN_OPERATORS: &[&str] = &["LIKE", "ILIKE", "REGEXP", "RLIKE", "SOUNDS"];

/// A column reference as written, before alias resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    /// Table or alias qualifier (`o` in `o.status`)
    pub qualifier: Option<String>,
    pub column: String,
    /// Index of the first token of the reference
    pub first: usize,
    /// Index of the last token of the reference
    pub last: usize,
}

/// How a referenced column is tested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// `=`, `<`, `>=`, `<>` and friends
    Comparison,
    /// LIKE / REGEXP
    Pattern,
    /// IN / NOT IN
    Membership,
    /// IS [NOT] NULL
    NullTest,
    /// [NOT] BETWEEN
    Range,
}

/// Read a possibly qualified name starting at `i`.
///
/// `a.b.c` yields qualifier `b` and column `c`. Reserved bare words, `t.*`
/// and names that continue a dotted chain are not references.
pub fn read_reference(tokens: &[Token], i: usize) -> Option<RawReference> {
    let first = tokens.get(i)?;
    if !first.is_name() {
        return None;
    }
    if i > 0 && tokens[i - 1].kind == TokenKind::Dot {
        return None;
    }

    let mut parts = vec![first.text.as_str()];
    let mut last = i;
    while let (Some(dot), Some(name)) = (tokens.get(last + 1), tokens.get(last + 2)) {
        if dot.kind != TokenKind::Dot || !name.is_name() {
            break;
        }
        parts.push(name.text.as_str());
        last += 2;
    }

    if tokens.get(last + 1).map_or(false, |t| t.kind == TokenKind::Dot) {
        return None;
    }
    if parts.len() == 1 && !first.is_identifier() {
        return None;
    }

    let column = parts[parts.len() - 1].to_string();
    let qualifier = (parts.len() >= 2).then(|| parts[parts.len() - 2].to_string());
    Some(RawReference {
        qualifier,
        column,
        first: i,
        last,
    })
}

/// Attribute a reference to its table. Bare columns belong to the main table;
/// qualified columns with an unknown qualifier are dropped.
pub fn resolve_reference(shape: &QueryShape, raw: &RawReference) -> Option<ColumnRef> {
    match &raw.qualifier {
        Some(qualifier) => shape
            .resolve_alias(qualifier)
            .map(|table| ColumnRef::new(table, raw.column.clone(), qualifier.clone())),
        None => Some(ColumnRef::new(
            shape.main_table.clone(),
            raw.column.clone(),
            shape.main_alias.clone(),
        )),
    }
}

fn is_call(tokens: &[Token], raw: &RawReference) -> bool {
    tokens
        .get(raw.last + 1)
        .map_or(false, |t| t.kind == TokenKind::LParen)
}

/// `@var`, `:name` and `::type` are not columns
fn is_variable(tokens: &[Token], i: usize) -> bool {
    i > 0 && (tokens[i - 1].is_operator("@") || tokens[i - 1].is_operator(":"))
}

/// Predicate introduced by the token at `i`, if any
fn predicate_at(tokens: &[Token], i: usize) -> Option<Predicate> {
    let token = tokens.get(i)?;
    if token.is_comparison() {
        return Some(Predicate::Comparison);
    }
    if token.is_keyword("NOT") {
        return match predicate_at(tokens, i + 1) {
            Some(Predicate::Membership) => Some(Predicate::Membership),
            Some(Predicate::Range) => Some(Predicate::Range),
            Some(Predicate::Pattern) => Some(Predicate::Pattern),
            _ => None,
        };
    }
    if token.is_keyword("IN") {
        Some(Predicate::Membership)
    } else if token.is_keyword("IS") {
        Some(Predicate::NullTest)
    } else if token.is_keyword("BETWEEN") {
        Some(Predicate::Range)
    } else if token.is_any_keyword(PATTERN_OPERATORS) {
        Some(Predicate::Pattern)
    } else {
        None
    }
}

/// References taking part in a predicate, with the predicate each one feeds.
///
/// A reference counts when an operator follows it; qualified references also
/// count on the right-hand side of a comparison.
pub fn predicate_references(tokens: &[Token]) -> Vec<(RawReference, Predicate)> {
    let tokens = collapse_subqueries(tokens);
    let mut found = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if is_variable(&tokens, i) {
            i += 1;
            continue;
        }
        let Some(raw) = read_reference(&tokens, i) else {
            i += 1;
            continue;
        };
        let next = raw.last + 1;
        // function names and typed literals such as DATE '2024-01-01'
        let typed_literal = raw.qualifier.is_none()
            && tokens.get(next).map_or(false, |t| t.kind == TokenKind::Literal);
        if is_call(&tokens, &raw) || typed_literal {
            i = next;
            continue;
        }

        let predicate = predicate_at(&tokens, next).or_else(|| {
            let after_comparison = raw.first > 0 && tokens[raw.first - 1].is_comparison();
            (raw.qualifier.is_some() && after_comparison).then_some(Predicate::Comparison)
        });
        if let Some(predicate) = predicate {
            found.push((raw, predicate));
        }
        i = next;
    }
    found
}

/// Columns tested anywhere in a boolean expression
pub fn expression_columns(shape: &QueryShape, tokens: &[Token]) -> Vec<ColumnRef> {
    predicate_references(tokens)
        .into_iter()
        .filter_map(|(raw, _)| resolve_reference(shape, &raw))
        .collect()
}

fn is_constant_condition(tokens: &[Token]) -> bool {
    matches!(
        tokens,
        [left, op, right]
            if left.kind == TokenKind::Number && op.is_operator("=") && right.kind == TokenKind::Number
    )
}

/// WHERE: every tested column goes to `where_columns`; IN / NOT IN
/// memberships are also recorded in `in_clause_columns`.
pub fn analyze_where(shape: &mut QueryShape, tokens: &[Token]) {
    if is_constant_condition(tokens) {
        return;
    }

    let mut where_columns = Vec::new();
    let mut in_columns = Vec::new();
    for (raw, predicate) in predicate_references(tokens) {
        let Some(column) = resolve_reference(shape, &raw) else {
            continue;
        };
        if predicate == Predicate::Membership {
            in_columns.push(column.clone());
        }
        where_columns.push(column);
    }

    shape.where_columns.extend(where_columns);
    shape.in_clause_columns.extend(in_columns);
}

/// HAVING: tested columns plus the arguments of COUNT/SUM/AVG/MIN/MAX
pub fn analyze_having(shape: &mut QueryShape, tokens: &[Token], select_aliases: &HashSet<String>) {
    let mut columns: Vec<ColumnRef> = predicate_references(tokens)
        .into_iter()
        .filter(|(raw, _)| raw.qualifier.is_some() || !select_aliases.contains(&raw.column.to_lowercase()))
        .filter_map(|(raw, _)| resolve_reference(shape, &raw))
        .collect();

    let tokens = collapse_subqueries(tokens);
    for i in 0..tokens.len() {
        if !tokens[i].is_any_keyword(AGGREGATES)
            || tokens.get(i + 1).map_or(true, |t| t.kind != TokenKind::LParen)
        {
            continue;
        }
        let mut arg = i + 2;
        if tokens.get(arg).map_or(false, |t| t.is_keyword("DISTINCT")) {
            arg += 1;
        }
        if let Some(raw) = read_reference(&tokens, arg) {
            if tokens.get(raw.last + 1).map_or(false, |t| t.kind == TokenKind::RParen) {
                columns.extend(resolve_reference(shape, &raw));
            }
        }
    }

    shape.having_columns.extend(columns);
}

/// GROUP BY / ORDER BY items.
///
/// Positional numbers and SELECT-list aliases are skipped; a lone name is a
/// column, and inside expressions only qualified references count.
pub fn sort_key_columns(shape: &QueryShape, tokens: &[Token], select_aliases: &HashSet<String>) -> Vec<ColumnRef> {
    let tokens = collapse_subqueries(tokens);
    let mut columns = Vec::new();

    for range in split_top_level(&tokens, 0..tokens.len()) {
        let mut item = &tokens[range];
        while let Some((last, rest)) = item.split_last() {
            if !last.is_any_keyword(SORT_SUFFIXES) {
                break;
            }
            item = rest;
        }
        if item.is_empty() || (item.len() == 1 && item[0].kind == TokenKind::Number) {
            continue;
        }

        if let Some(raw) = read_reference(item, 0).filter(|r| r.last == item.len() - 1) {
            let is_alias = raw.qualifier.is_none() && select_aliases.contains(&raw.column.to_lowercase());
            if !is_alias {
                columns.extend(resolve_reference(shape, &raw));
            }
            continue;
        }

        let mut i = 0;
        while i < item.len() {
            match read_reference(item, i) {
                Some(raw) => {
                    if raw.qualifier.is_some() && !is_call(item, &raw) {
                        columns.extend(resolve_reference(shape, &raw));
                    }
                    i = raw.last + 1;
                }
                None => i += 1,
            }
        }
    }

    columns
}

/// Conditions of `CASE WHEN <cond> THEN` and `IF(<cond>, ...)` anywhere in the statement
pub fn analyze_conditionals(shape: &mut QueryShape, tokens: &[Token]) {
    let tokens = collapse_subqueries(tokens);
    let mut columns = Vec::new();

    for i in 0..tokens.len() {
        let token = &tokens[i];
        if token.is_keyword("WHEN") {
            let then = tokens[i + 1..]
                .iter()
                .position(|t| t.depth == token.depth && t.is_keyword("THEN"))
                .map(|offset| i + 1 + offset);
            if let Some(then) = then {
                columns.extend(expression_columns(shape, &tokens[i + 1..then]));
            }
        } else if token.is_keyword("IF") && tokens.get(i + 1).map_or(false, |t| t.kind == TokenKind::LParen) {
            let open = i + 1;
            let inner = tokens[open].depth + 1;
            let comma = tokens[open + 1..]
                .iter()
                .take_while(|t| t.depth >= inner)
                .position(|t| t.depth == inner && t.kind == TokenKind::Comma)
                .map(|offset| open + 1 + offset);
            if let Some(comma) = comma {
                columns.extend(expression_columns(shape, &tokens[open + 1..comma]));
            }
        }
    }

    shape.case_when_columns.extend(columns);
}

/// Record qualified columns of the SELECT list and return the lower-cased
/// names of its output aliases.
pub fn analyze_select_list(shape: &mut QueryShape, tokens: &[Token]) -> HashSet<String> {
    let tokens = collapse_subqueries(tokens);
    let mut aliases = HashSet::new();
    let mut columns = Vec::new();

    for range in split_top_level(&tokens, 0..tokens.len()) {
        let (expression, alias) = split_output_alias(&tokens[range]);
        if let Some(alias) = alias {
            aliases.insert(alias.to_lowercase());
        }

        let mut i = 0;
        while i < expression.len() {
            match read_reference(expression, i) {
                Some(raw) => {
                    if raw.qualifier.is_some() && !is_call(expression, &raw) {
                        columns.extend(resolve_reference(shape, &raw));
                    }
                    i = raw.last + 1;
                }
                None => i += 1,
            }
        }
    }

    shape.select_columns.extend(columns);
    aliases
}

/// `expr AS name` or `expr name`
fn split_output_alias(item: &[Token]) -> (&[Token], Option<&str>) {
    let n = item.len();
    if n >= 3 && item[n - 2].is_keyword("AS") && item[n - 1].is_name() {
        return (&item[..n - 2], Some(item[n - 1].text.as_str()));
    }
    if n >= 2 && item[n - 1].is_identifier() && can_precede_alias(&item[n - 2]) {
        return (&item[..n - 1], Some(item[n - 1].text.as_str()));
    }
    (item, None)
}

fn can_precede_alias(token: &Token) -> bool {
    match token.kind {
        TokenKind::RParen | TokenKind::Literal | TokenKind::Number | TokenKind::QuotedIdent => true,
        TokenKind::Word => !is_reserved(&token.text) || token.is_keyword("END"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_parser::lexer::tokenize;
    use crate::types::QueryType;

    fn shape() -> QueryShape {
        let mut shape = QueryShape::new(QueryType::Select, "orders", "o");
        shape.add_alias("o", "orders");
        shape.add_alias("c", "customers");
        shape
    }

    fn columns(refs: &[ColumnRef]) -> Vec<String> {
        refs.iter().map(|c| format!("{}.{}", c.table, c.column)).collect()
    }

    #[test]
    fn test_read_reference_forms() {
        let tokens = tokenize("app.orders.status");
        let raw = read_reference(&tokens, 0).unwrap();
        assert_eq!(raw.qualifier.as_deref(), Some("orders"));
        assert_eq!(raw.column, "status");
        assert_eq!(raw.last, 4);

        assert!(read_reference(&tokenize("o.*"), 0).is_none());
        assert!(read_reference(&tokenize("NULL"), 0).is_none());
        assert!(read_reference(&tokenize("`order`"), 0).is_some());
    }

    #[test]
    fn test_where_predicate_kinds() {
        let mut shape = shape();
        let tokens = tokenize(
            "o.status = 'paid' AND total > 10 AND c.region IN ('eu', 'us') AND deleted_at IS NULL \
             AND placed_at NOT BETWEEN 1 AND 2 AND note LIKE '%x%' AND flag AND NULL IS NULL",
        );
        analyze_where(&mut shape, &tokens);

        assert_eq!(
            columns(&shape.where_columns),
            vec![
                "orders.status",
                "orders.total",
                "customers.region",
                "orders.deleted_at",
                "orders.placed_at",
                "orders.note",
            ]
        );
        assert_eq!(columns(&shape.in_clause_columns), vec!["customers.region"]);
    }

    #[test]
    fn test_where_skips_functions_variables_and_subqueries() {
        let mut shape = shape();
        let tokens = tokenize(
            "LOWER(email) = 'x' AND created_at > NOW() AND id = @id AND c.id IN (SELECT customer_id FROM vip WHERE level = 3) AND day = DATE '2024-01-01'",
        );
        analyze_where(&mut shape, &tokens);
        assert_eq!(
            columns(&shape.where_columns),
            vec!["orders.created_at", "orders.id", "customers.id", "orders.day"]
        );
    }

    #[test]
    fn test_qualified_right_hand_side() {
        let mut shape = shape();
        analyze_where(&mut shape, &tokenize("o.customer_id = c.id"));
        assert_eq!(columns(&shape.where_columns), vec!["orders.customer_id", "customers.id"]);
    }

    #[test]
    fn test_constant_condition_is_skipped() {
        let mut shape = shape();
        analyze_where(&mut shape, &tokenize("1 = 1"));
        assert!(shape.where_columns.is_empty());
    }

    #[test]
    fn test_having_aggregates() {
        let mut shape = shape();
        let aliases: HashSet<String> = ["order_count".to_string()].into_iter().collect();
        analyze_having(
            &mut shape,
            &tokenize("COUNT(DISTINCT c.id) > 2 AND SUM(total) > 100 AND order_count > 1"),
            &aliases,
        );
        assert_eq!(columns(&shape.having_columns), vec!["customers.id", "orders.total"]);
    }

    #[test]
    fn test_sort_keys() {
        let shape = shape();
        let aliases: HashSet<String> = ["revenue".to_string()].into_iter().collect();
        let keys = sort_key_columns(
            &shape,
            &tokenize("o.placed_at DESC, 2, revenue, status ASC NULLS LAST, YEAR(c.created_at), LOWER(name)"),
            &aliases,
        );
        assert_eq!(
            columns(&keys),
            vec!["orders.placed_at", "orders.status", "customers.created_at"]
        );
    }

    #[test]
    fn test_conditionals() {
        let mut shape = shape();
        analyze_conditionals(
            &mut shape,
            &tokenize("SELECT CASE WHEN o.total > 100 THEN 'big' WHEN c.vip = 1 THEN 'vip' END, IF(status = 'x', 1, 0) FROM orders o"),
        );
        assert_eq!(
            columns(&shape.case_when_columns),
            vec!["orders.total", "customers.vip", "orders.status"]
        );
    }

    #[test]
    fn test_select_list_aliases_and_columns() {
        let mut shape = shape();
        let aliases = analyze_select_list(
            &mut shape,
            &tokenize("DISTINCT o.id, c.name AS customer, SUM(o.total) revenue, o.*, status"),
        );
        assert!(aliases.contains("customer"));
        assert!(aliases.contains("revenue"));
        assert!(!aliases.contains("status"));
        assert_eq!(
            columns(&shape.select_columns),
            vec!["orders.id", "customers.name", "orders.total"]
        );
    }
}
