use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recorded SQL statement handed over by the capture layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedQuery {
    /// SQL text with bound values already substituted
    pub sql: String,
    /// Execution time in milliseconds
    pub elapsed_ms: f64,
    /// When the statement was executed
    pub captured_at: DateTime<Utc>,
}

/// Statement kinds the analyzer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Select,
    Update,
    Delete,
}

/// One attribution of a column occurrence to a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Resolved table name
    pub table: String,
    /// Column name without quoting
    pub column: String,
    /// Alias (or table name) the reference was written with
    pub alias: String,
}

/// Structured view of a single statement, built fresh for every query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryShape {
    /// Leading statement keyword
    pub query_type: QueryType,
    /// Table named by FROM / UPDATE / DELETE FROM
    pub main_table: String,
    /// Alias of the main table (the table name when none was given)
    pub main_alias: String,
    /// Lower-cased alias to table name, in declaration order
    pub alias_to_table: IndexMap<String, String>,
    /// Columns taking part in JOIN ... ON / USING
    pub join_columns: Vec<ColumnRef>,
    /// Columns referenced by WHERE predicates
    pub where_columns: Vec<ColumnRef>,
    /// Columns referenced by HAVING predicates and aggregates
    pub having_columns: Vec<ColumnRef>,
    /// Columns named by GROUP BY
    pub group_by_columns: Vec<ColumnRef>,
    /// Columns named by ORDER BY
    pub order_by_columns: Vec<ColumnRef>,
    /// Columns tested with IN / NOT IN
    pub in_clause_columns: Vec<ColumnRef>,
    /// Columns tested inside CASE WHEN / IF conditions
    pub case_when_columns: Vec<ColumnRef>,
    /// Qualified columns in the SELECT list
    pub select_columns: Vec<ColumnRef>,
    /// Synthetic subquery and CTE names, never suggestion targets
    pub subquery_tables: IndexSet<String>,
    /// Shapes of nested SELECTs (subqueries, CTE bodies, set-operation branches)
    pub nested: Vec<QueryShape>,
}

/// An index reported by the index catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingIndex {
    /// Index name
    pub name: String,
    /// Table the index belongs to
    pub table: String,
    /// Indexed columns in key order
    pub columns: Vec<String>,
}

/// A recommended index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Target table
    pub table: String,
    /// Index columns in key order, unique and non-empty
    pub columns: Vec<String>,
    /// Generated index name
    pub index_name: String,
    /// Number of queries that produced this access pattern
    pub query_count: u32,
    /// Mean execution time of those queries in milliseconds
    pub avg_time_ms: f64,
    /// Whether this suggestion was synthesized from several single-column ones
    pub composite: bool,
    /// Whether the pattern came from cross-table (join/group/order) accumulation
    pub join_related: bool,
    /// Statement kind of the grouped queries, when known
    pub query_type: Option<QueryType>,
}

/// Size and distribution figures for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Storage used by the table in bytes
    pub size_bytes: u64,
    /// Total number of rows
    pub row_count: u64,
    /// Number of distinct values in the column
    pub distinct_count: u64,
}

impl CapturedQuery {
    /// Create a captured query stamped with the current time
    pub fn new(sql: impl Into<String>, elapsed_ms: f64) -> Self {
        Self {
            sql: sql.into(),
            elapsed_ms,
            captured_at: Utc::now(),
        }
    }

    /// Set the capture timestamp
    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }
}

impl QueryType {
    /// Detect the statement kind from its leading keyword
    pub fn from_keyword(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("SELECT") {
            Some(QueryType::Select)
        } else if word.eq_ignore_ascii_case("UPDATE") {
            Some(QueryType::Update)
        } else if word.eq_ignore_ascii_case("DELETE") {
            Some(QueryType::Delete)
        } else {
            None
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            QueryType::Select => "SELECT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
        };
        f.write_str(keyword)
    }
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            alias: alias.into(),
        }
    }
}

impl QueryShape {
    /// Create an empty shape for a statement whose target is already known
    pub fn new(query_type: QueryType, main_table: impl Into<String>, main_alias: impl Into<String>) -> Self {
        Self {
            query_type,
            main_table: main_table.into(),
            main_alias: main_alias.into(),
            alias_to_table: IndexMap::new(),
            join_columns: Vec::new(),
            where_columns: Vec::new(),
            having_columns: Vec::new(),
            group_by_columns: Vec::new(),
            order_by_columns: Vec::new(),
            in_clause_columns: Vec::new(),
            case_when_columns: Vec::new(),
            select_columns: Vec::new(),
            subquery_tables: IndexSet::new(),
            nested: Vec::new(),
        }
    }

    /// Register an alias for a table
    pub fn add_alias(&mut self, alias: &str, table: &str) {
        self.alias_to_table.insert(alias.to_lowercase(), table.to_string());
    }

    /// Resolve an alias, falling back to a table name registered under any alias
    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        if let Some(table) = self.alias_to_table.get(&alias.to_lowercase()) {
            return Some(table.as_str());
        }
        self.alias_to_table
            .values()
            .find(|table| table.eq_ignore_ascii_case(alias))
            .map(String::as_str)
    }

    /// Whether the table is a synthetic subquery or CTE name
    pub fn is_subquery_table(&self, table: &str) -> bool {
        self.subquery_tables.contains(table)
    }

    /// Whether the main table is itself a subquery
    pub fn main_is_subquery(&self) -> bool {
        self.is_subquery_table(&self.main_table)
    }

    /// Every column attribution of this statement, excluding nested shapes
    pub fn column_refs(&self, include_select: bool) -> impl Iterator<Item = &ColumnRef> {
        let select: &[ColumnRef] = if include_select { &self.select_columns } else { &[] };
        self.join_columns
            .iter()
            .chain(&self.where_columns)
            .chain(&self.having_columns)
            .chain(&self.group_by_columns)
            .chain(&self.order_by_columns)
            .chain(&self.in_clause_columns)
            .chain(&self.case_when_columns)
            .chain(select)
    }

    /// Distinct tables of the alias map, in declaration order
    pub fn tables(&self) -> Vec<&str> {
        let mut seen = IndexSet::new();
        for table in self.alias_to_table.values() {
            seen.insert(table.as_str());
        }
        seen.into_iter().collect()
    }
}

impl ExistingIndex {
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns,
        }
    }
}

impl Suggestion {
    /// Columns rendered as a comma separated list
    pub fn column_list(&self) -> String {
        self.columns.join(", ")
    }
}

impl ColumnStats {
    /// Distinct values as a percentage of rows, 0 for empty tables
    pub fn cardinality(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.distinct_count as f64 / self.row_count as f64 * 100.0
        }
    }
}
