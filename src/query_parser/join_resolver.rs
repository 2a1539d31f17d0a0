use super::clauses::collapse_subqueries;
use super::from_resolver::{read_table_ref, TableRef};
use super::lexer::{matching_paren, Token, TokenKind};
use super::predicates::{read_reference, resolve_reference};
use crate::types::{ColumnRef, QueryShape};
use std::ops::Range;

const JOIN_MODIFIERS: &[&str] = &["NATURAL", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS"];
const JOIN_KEYWORDS: &[&str] = &["JOIN", "STRAIGHT_JOIN"];

/// Register an alias for a table reference found in FROM or JOIN position
pub fn register_table(shape: &mut QueryShape, table: &TableRef) {
    shape.add_alias(&table.alias, &table.table);
    if table.is_subquery {
        shape.subquery_tables.insert(table.table.clone());
    }
}

/// Walk the JOIN chain in `range`, registering joined tables and the columns
/// their ON / USING conditions relate.
pub fn resolve_joins(sql: &str, tokens: &[Token], range: Range<usize>, shape: &mut QueryShape) {
    if range.start >= range.end || range.end > tokens.len() {
        return;
    }
    let Some(base) = tokens[range.clone()].iter().map(|t| t.depth).min() else {
        return;
    };

    let mut i = range.start;
    while i < range.end {
        let token = &tokens[i];
        if token.depth != base || token.is_any_keyword(JOIN_MODIFIERS) {
            i += 1;
            continue;
        }

        // implicit join after an explicit chain: `a JOIN b ON ..., c`
        if token.kind == TokenKind::Comma {
            match read_table_ref(sql, tokens, i + 1, range.end) {
                Some((table, next)) => {
                    register_table(shape, &table);
                    i = next;
                }
                None => i += 1,
            }
            continue;
        }

        if !token.is_any_keyword(JOIN_KEYWORDS) {
            i += 1;
            continue;
        }

        let mut start = i + 1;
        if tokens.get(start).map_or(false, |t| t.is_keyword("LATERAL")) {
            start += 1;
        }
        let Some((table, next)) = read_table_ref(sql, tokens, start, range.end) else {
            i += 1;
            continue;
        };
        register_table(shape, &table);

        let end = segment_end(tokens, next, range.end, base);
        match tokens.get(next) {
            Some(t) if t.is_keyword("ON") && next < end => {
                let columns = join_condition_columns(shape, &tokens[next + 1..end]);
                shape.join_columns.extend(columns);
            }
            Some(t) if t.is_keyword("USING") && next < end => {
                let columns = using_columns(shape, tokens, next + 1, end);
                shape.join_columns.extend(columns);
            }
            _ => {}
        }
        i = end.max(next);
    }
}

/// First token after `from` that starts the next join, or `end`
fn segment_end(tokens: &[Token], from: usize, end: usize, base: usize) -> usize {
    (from..end)
        .find(|&j| {
            let t = &tokens[j];
            t.depth == base
                && (t.kind == TokenKind::Comma || t.is_any_keyword(JOIN_MODIFIERS) || t.is_any_keyword(JOIN_KEYWORDS))
        })
        .unwrap_or(end)
}

/// Both sides of every `alias.column = alias.column` pair in an ON condition
pub fn join_condition_columns(shape: &QueryShape, condition: &[Token]) -> Vec<ColumnRef> {
    let tokens = collapse_subqueries(condition);
    let mut columns = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let Some(left) = read_reference(&tokens, i).filter(|r| r.qualifier.is_some()) else {
            i += 1;
            continue;
        };
        let operator = left.last + 1;
        let is_equality = tokens
            .get(operator)
            .map_or(false, |t| t.is_operator("=") || t.is_operator("<=>"));
        let right = read_reference(&tokens, operator + 1).filter(|r| r.qualifier.is_some());

        match right {
            Some(right) if is_equality => {
                columns.extend(resolve_reference(shape, &left));
                columns.extend(resolve_reference(shape, &right));
                i = right.last + 1;
            }
            _ => i = left.last + 1,
        }
    }
    columns
}

/// `USING (a, b)`: each column is registered against every table in scope
fn using_columns(shape: &QueryShape, tokens: &[Token], open: usize, end: usize) -> Vec<ColumnRef> {
    if tokens.get(open).map_or(true, |t| t.kind != TokenKind::LParen) {
        return Vec::new();
    }
    let close = matching_paren(tokens, open).unwrap_or(end).min(end);

    let mut columns = Vec::new();
    for name in tokens[open + 1..close].iter().filter(|t| t.is_name()) {
        for (alias, table) in &shape.alias_to_table {
            columns.push(ColumnRef::new(table.clone(), name.text.clone(), alias.clone()));
        }
    }
    columns
}
