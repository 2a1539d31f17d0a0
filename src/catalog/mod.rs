// Catalog module: index, schema and statistics lookups
pub mod snapshot;


pub use snapshot::*;

use crate::error::AdvisorResult;
use crate::types::{ColumnStats, ExistingIndex};
use std::collections::HashMap;
use tracing::warn;

/// Source of the secondary indexes that already exist on a table.
/// Primary-key indexes are never reported.
pub trait IndexCatalog {
    fn indexes(&self, table: &str) -> AdvisorResult<Vec<ExistingIndex>>;
}

/// Existence checks against the live schema
pub trait SchemaCatalog {
    fn has_table(&self, table: &str) -> AdvisorResult<bool>;
    fn has_column(&self, table: &str, column: &str) -> AdvisorResult<bool>;
}

/// Size and distribution figures for a column
pub trait TableStatsProvider {
    fn column_stats(&self, table: &str, column: &str) -> AdvisorResult<ColumnStats>;
}

/// Schema that accepts every table and column
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSchema;

impl SchemaCatalog for OpenSchema {
    fn has_table(&self, _table: &str) -> AdvisorResult<bool> {
        Ok(true)
    }

    fn has_column(&self, _table: &str, _column: &str) -> AdvisorResult<bool> {
        Ok(true)
    }
}

/// Per-run memo of index lookups.
///
/// A failed lookup is logged and remembered as "no indexes" so the table is
/// not queried again during the same run.
pub struct IndexCache<'a> {
    catalog: &'a dyn IndexCatalog,
    tables: HashMap<String, Vec<ExistingIndex>>,
}

impl<'a> IndexCache<'a> {
    pub fn new(catalog: &'a dyn IndexCatalog) -> Self {
        Self {
            catalog,
            tables: HashMap::new(),
        }
    }

    pub fn indexes(&mut self, table: &str) -> &[ExistingIndex] {
        let catalog = self.catalog;
        self.tables.entry(table.to_string()).or_insert_with(|| {
            catalog.indexes(table).unwrap_or_else(|e| {
                warn!(table = %table, error = %e, "Index lookup failed, assuming no indexes");
                Vec::new()
            })
        })
    }

    /// Number of distinct tables looked up so far
    pub fn lookups(&self) -> usize {
        self.tables.len()
    }
}

/// Per-run memo of schema existence checks; failures count as "absent"
pub struct SchemaCache<'a> {
    catalog: &'a dyn SchemaCatalog,
    tables: HashMap<String, bool>,
    columns: HashMap<(String, String), bool>,
}

impl<'a> SchemaCache<'a> {
    pub fn new(catalog: &'a dyn SchemaCatalog) -> Self {
        Self {
            catalog,
            tables: HashMap::new(),
            columns: HashMap::new(),
        }
    }

    pub fn has_table(&mut self, table: &str) -> bool {
        let catalog = self.catalog;
        *self.tables.entry(table.to_string()).or_insert_with(|| {
            catalog.has_table(table).unwrap_or_else(|e| {
                warn!(table = %table, error = %e, "Schema lookup failed, treating table as absent");
                false
            })
        })
    }

    pub fn has_column(&mut self, table: &str, column: &str) -> bool {
        let catalog = self.catalog;
        *self
            .columns
            .entry((table.to_string(), column.to_string()))
            .or_insert_with(|| {
                catalog.has_column(table, column).unwrap_or_else(|e| {
                    warn!(table = %table, column = %column, error = %e, "Schema lookup failed, treating column as absent");
                    false
                })
            })
    }
}
