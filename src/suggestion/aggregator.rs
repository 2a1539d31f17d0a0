use crate::types::QueryShape;
use indexmap::{IndexMap, IndexSet};

/// Candidate columns per table, accumulated across every query of one
/// analysis run. Created at the start of a run and dropped at its end.
#[derive(Debug, Clone, Default)]
pub struct TableSuggestionAccumulator {
    tables: IndexMap<String, IndexSet<String>>,
}

impl TableSuggestionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the column attributions of a statement and all of its nested
    /// statements. Subquery and CTE tables are skipped.
    pub fn absorb(&mut self, shape: &QueryShape, include_select: bool) {
        let tables = shape.tables();
        for column in shape.column_refs(include_select) {
            if shape.is_subquery_table(&column.table) || !tables.contains(&column.table.as_str()) {
                continue;
            }
            let columns = self.tables.entry(column.table.clone()).or_default();
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(&column.column)) {
                columns.insert(column.column.clone());
            }
        }

        for nested in &shape.nested {
            self.absorb(nested, include_select);
        }
    }

    /// Accumulated tables with their columns, in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> {
        self.tables.iter().map(|(table, columns)| (table.as_str(), columns))
    }

    pub fn columns(&self, table: &str) -> Option<&IndexSet<String>> {
        self.tables.get(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Columns of the statement's own main table, de-duplicated in first-seen order
pub fn primary_candidates(shape: &QueryShape, include_select: bool) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for column in shape.column_refs(include_select) {
        if column.table == shape.main_table
            && !columns.iter().any(|c| c.eq_ignore_ascii_case(&column.column))
        {
            columns.push(column.column.clone());
        }
    }
    columns
}

/// Grouping key: the table plus its sorted, de-duplicated column set
pub fn group_key(table: &str, columns: &[String]) -> String {
    let mut sorted: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    sorted.sort();
    sorted.dedup();
    format!("{}:{}", table, sorted.join(","))
}
