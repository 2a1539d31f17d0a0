use super::clauses::{layout, split_set_operations, statement_tokens, text_of, ClauseKind};
use super::from_resolver::resolve_from;
use super::join_resolver::{register_table, resolve_joins};
use super::lexer::{matching_paren, tokenize, Token, TokenKind};
use super::normalizer::normalize;
use super::predicates::{
    analyze_conditionals, analyze_having, analyze_select_list, analyze_where, sort_key_columns,
};
use super::subquery::{outermost_subqueries, split_with_clause};
use crate::error::{AdvisorError, AdvisorResult};
use crate::types::QueryShape;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

/// Deepest subquery nesting the extractor follows before giving up
pub const MAX_NESTING_DEPTH: usize = 32;

/// Turns SQL text into a [`QueryShape`], recursing into subqueries,
/// CTE bodies and set-operation branches.
#[derive(Debug, Clone)]
pub struct ClauseExtractor {
    /// Nesting limit; deeper statements fail to parse
    max_depth: usize,
}

/// Names visible to a nested statement from the statements enclosing it
#[derive(Debug, Clone, Default)]
struct Scope {
    aliases: IndexMap<String, String>,
    subquery_tables: IndexSet<String>,
}

impl Scope {
    fn of(shape: &QueryShape) -> Self {
        Self {
            aliases: shape.alias_to_table.clone(),
            subquery_tables: shape.subquery_tables.clone(),
        }
    }
}

impl Default for ClauseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ClauseExtractor {
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Normalize and parse one captured statement
    pub fn extract(&self, sql: &str) -> AdvisorResult<QueryShape> {
        let normalized = normalize(sql);
        self.extract_scoped(&normalized, &Scope::default(), 0)
    }

    fn extract_scoped(&self, sql: &str, scope: &Scope, depth: usize) -> AdvisorResult<QueryShape> {
        if depth > self.max_depth {
            return Err(AdvisorError::NestingTooDeep { limit: self.max_depth });
        }

        let tokens = statement_tokens(tokenize(sql));
        if tokens.is_empty() {
            return Err(AdvisorError::parse("empty statement"));
        }

        if let Some(header) = split_with_clause(sql, &tokens)? {
            let mut inner = scope.clone();
            for cte in &header.ctes {
                inner.subquery_tables.insert(cte.name.clone());
            }
            let rest = &sql[tokens[header.statement_start].start..];
            let mut shape = self.extract_scoped(rest, &inner, depth + 1)?;
            for cte in &header.ctes {
                shape.subquery_tables.insert(cte.name.clone());
                self.expand_into(&mut shape, cte.body, depth + 1)?;
            }
            return Ok(shape);
        }

        let branches = split_set_operations(&tokens);
        if branches.len() > 1 {
            let mut shape = self.extract_scoped(text_of(sql, &tokens, &branches[0]), scope, depth + 1)?;
            for branch in &branches[1..] {
                self.expand_into(&mut shape, text_of(sql, &tokens, branch), depth + 1)?;
            }
            return Ok(shape);
        }

        // `(SELECT ...)` wrapped as a whole
        if tokens[0].kind == TokenKind::LParen && matching_paren(&tokens, 0) == Some(tokens.len() - 1) {
            let inner = &sql[tokens[0].end..tokens[tokens.len() - 1].start];
            return self.extract_scoped(inner.trim(), scope, depth + 1);
        }

        self.extract_statement(sql, &tokens, scope, depth)
    }

    fn extract_statement(&self, sql: &str, tokens: &[Token], scope: &Scope, depth: usize) -> AdvisorResult<QueryShape> {
        let layout = layout(tokens)?;
        let (tables, join_start) = resolve_from(sql, tokens, layout.target.clone())?;
        let main = &tables[0];

        let mut shape = QueryShape::new(layout.query_type, main.table.clone(), main.alias.clone());
        shape.subquery_tables.extend(scope.subquery_tables.iter().cloned());
        for table in &tables {
            register_table(&mut shape, table);
        }
        resolve_joins(sql, tokens, join_start.min(layout.target.end)..layout.target.end, &mut shape);

        // outer names stay visible unless shadowed
        for (alias, table) in &scope.aliases {
            shape
                .alias_to_table
                .entry(alias.clone())
                .or_insert_with(|| table.clone());
        }

        let select_aliases = analyze_select_list(&mut shape, &tokens[layout.select_list.clone()]);

        if let Some(range) = layout.clause(ClauseKind::Where) {
            analyze_where(&mut shape, &tokens[range]);
        }
        if let Some(range) = layout.clause(ClauseKind::Having) {
            analyze_having(&mut shape, &tokens[range], &select_aliases);
        }
        if let Some(range) = layout.clause(ClauseKind::GroupBy) {
            let columns = sort_key_columns(&shape, &tokens[range], &select_aliases);
            shape.group_by_columns.extend(columns);
        }
        if let Some(range) = layout.clause(ClauseKind::OrderBy) {
            let columns = sort_key_columns(&shape, &tokens[range], &select_aliases);
            shape.order_by_columns.extend(columns);
        }
        analyze_conditionals(&mut shape, tokens);

        for block in outermost_subqueries(sql, tokens) {
            self.expand_into(&mut shape, block, depth + 1)?;
        }

        debug!(
            query_type = %shape.query_type,
            main_table = %shape.main_table,
            tables = shape.alias_to_table.len(),
            nested = shape.nested.len(),
            "Extracted query shape"
        );

        Ok(shape)
    }

    /// Parse a nested statement in the scope of `shape` and attach it.
    ///
    /// Nested statements that fail to parse are skipped; exceeding the
    /// nesting limit fails the whole statement.
    fn expand_into(&self, shape: &mut QueryShape, sql: &str, depth: usize) -> AdvisorResult<()> {
        match self.extract_scoped(sql, &Scope::of(shape), depth) {
            Ok(nested) => shape.nested.push(nested),
            Err(err @ AdvisorError::NestingTooDeep { .. }) => return Err(err),
            Err(err) => debug!(error = %err, "Skipping nested statement"),
        }
        Ok(())
    }
}

/// Parse one statement with the default extractor
pub fn parse(sql: &str) -> AdvisorResult<QueryShape> {
    ClauseExtractor::new().extract(sql)
}
