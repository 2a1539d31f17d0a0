use crate::catalog::{SchemaCache, SchemaCatalog};
use crate::types::Suggestion;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Longest identifier MySQL accepts for an index
pub const MAX_INDEX_NAME_LEN: usize = 64;

/// An executable index-creation statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatement {
    pub table: String,
    pub index_name: String,
    /// Columns that passed schema validation, in key order
    pub columns: Vec<String>,
    /// `ALTER TABLE ... ADD INDEX ...;`
    pub sql: String,
}

/// Name an index `{table}_{col1}_{col2}..._idx`.
///
/// Names over 64 characters become `{table[:10]}_{md5(cols)[:15]}_idx`,
/// and the result is always cut to 64 characters.
pub fn index_name(table: &str, columns: &[String]) -> String {
    let joined = columns.join("_");
    let mut name = format!("{}_{}_idx", table, joined);

    if name.chars().count() > MAX_INDEX_NAME_LEN {
        let prefix: String = table.chars().take(10).collect();
        let digest = format!("{:x}", md5::compute(joined.as_bytes()));
        name = format!("{}_{}_idx", prefix, &digest[..15]);
    }

    if name.chars().count() > MAX_INDEX_NAME_LEN {
        name = name.chars().take(MAX_INDEX_NAME_LEN).collect();
    }
    name
}

/// Backtick-quote an identifier, doubling embedded backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Turns suggestions into `ALTER TABLE` statements validated against the schema
#[derive(Debug, Clone, Default)]
pub struct StatementBuilder;

impl StatementBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Statement for one suggestion, or `None` when the table is unknown or
    /// none of its columns exist
    pub fn build(&self, suggestion: &Suggestion, schema: &dyn SchemaCatalog) -> Option<String> {
        let mut cache = SchemaCache::new(schema);
        self.build_cached(suggestion, &mut cache).map(|statement| statement.sql)
    }

    /// Statements for a list of suggestions in order, sharing schema lookups
    /// and skipping duplicates
    pub fn build_all(&self, suggestions: &[Suggestion], schema: &dyn SchemaCatalog) -> Vec<IndexStatement> {
        let mut cache = SchemaCache::new(schema);
        let mut seen = IndexSet::new();
        let mut statements = Vec::new();

        for suggestion in suggestions {
            if let Some(statement) = self.build_cached(suggestion, &mut cache) {
                if seen.insert(statement.sql.clone()) {
                    statements.push(statement);
                } else {
                    debug!(sql = %statement.sql, "Dropping duplicate statement");
                }
            }
        }

        statements
    }

    pub fn build_cached(&self, suggestion: &Suggestion, cache: &mut SchemaCache<'_>) -> Option<IndexStatement> {
        if !cache.has_table(&suggestion.table) {
            warn!(table = %suggestion.table, "Skipping suggestion for unknown table");
            return None;
        }

        let mut columns: Vec<String> = Vec::new();
        for column in &suggestion.columns {
            if columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                continue;
            }
            if cache.has_column(&suggestion.table, column) {
                columns.push(column.clone());
            } else {
                warn!(
                    table = %suggestion.table,
                    column = %column,
                    "Column does not exist, dropping it from the index"
                );
            }
        }

        if columns.is_empty() {
            return None;
        }

        // derived from the surviving columns; a caller-supplied name may be too long
        let index_name = index_name(&suggestion.table, &columns);
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "ALTER TABLE {} ADD INDEX {} ({});",
            quote_identifier(&suggestion.table),
            quote_identifier(&index_name),
            column_list
        );

        Some(IndexStatement {
            table: suggestion.table.clone(),
            index_name,
            columns,
            sql,
        })
    }
}
