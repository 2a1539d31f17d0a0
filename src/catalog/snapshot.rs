use super::{IndexCatalog, SchemaCatalog, TableStatsProvider};
use crate::error::{AdvisorError, AdvisorResult};
use crate::types::{ColumnStats, ExistingIndex};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// In-memory catalog loaded from a JSON export of the database schema.
///
/// ```json
/// {"tables": {"users": {
///     "columns": ["id", "email"],
///     "indexes": [{"name": "PRIMARY", "columns": ["id"], "primary": true}],
///     "stats": {"email": {"size_bytes": 65536, "row_count": 1000, "distinct_count": 990}}
/// }}}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub tables: IndexMap<String, TableSnapshot>,
}

/// One table of a [`CatalogSnapshot`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Column names
    #[serde(default)]
    pub columns: Vec<String>,
    /// All indexes, including the primary key
    #[serde(default)]
    pub indexes: Vec<IndexSnapshot>,
    /// Per-column statistics
    #[serde(default)]
    pub stats: IndexMap<String, ColumnStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    /// Indexed columns in key order
    pub columns: Vec<String>,
    /// Whether this is the primary-key index
    #[serde(default)]
    pub primary: bool,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> AdvisorResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|e| AdvisorError::catalog(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> AdvisorResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Case-insensitive table lookup
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name).or_else(|| {
            self.tables
                .iter()
                .find(|(table, _)| table.eq_ignore_ascii_case(name))
                .map(|(_, snapshot)| snapshot)
        })
    }

    fn table_mut(&mut self, name: &str) -> &mut TableSnapshot {
        self.tables.entry(name.to_string()).or_default()
    }

    /// Add (or extend) a table with the given columns
    pub fn with_table(mut self, name: &str, columns: &[&str]) -> Self {
        let table = self.table_mut(name);
        for column in columns {
            if !table.columns.iter().any(|c| c == column) {
                table.columns.push(column.to_string());
            }
        }
        self
    }

    pub fn with_index(mut self, table: &str, name: &str, columns: &[&str]) -> Self {
        self.table_mut(table).indexes.push(IndexSnapshot {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary: false,
        });
        self
    }

    pub fn with_primary_key(mut self, table: &str, columns: &[&str]) -> Self {
        self.table_mut(table).indexes.push(IndexSnapshot {
            name: "PRIMARY".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary: true,
        });
        self
    }

    pub fn with_stats(mut self, table: &str, column: &str, stats: ColumnStats) -> Self {
        self.table_mut(table).stats.insert(column.to_string(), stats);
        self
    }
}

impl IndexCatalog for CatalogSnapshot {
    fn indexes(&self, table: &str) -> AdvisorResult<Vec<ExistingIndex>> {
        let Some(snapshot) = self.table(table) else {
            return Ok(Vec::new());
        };
        Ok(snapshot
            .indexes
            .iter()
            .filter(|index| !index.primary)
            .map(|index| ExistingIndex::new(index.name.clone(), table, index.columns.clone()))
            .collect())
    }
}

impl SchemaCatalog for CatalogSnapshot {
    fn has_table(&self, table: &str) -> AdvisorResult<bool> {
        Ok(self.table(table).is_some())
    }

    fn has_column(&self, table: &str, column: &str) -> AdvisorResult<bool> {
        Ok(self
            .table(table)
            .map_or(false, |t| t.columns.iter().any(|c| c.eq_ignore_ascii_case(column))))
    }
}

impl TableStatsProvider for CatalogSnapshot {
    fn column_stats(&self, table: &str, column: &str) -> AdvisorResult<ColumnStats> {
        let snapshot = self
            .table(table)
            .ok_or_else(|| AdvisorError::catalog(format!("unknown table '{}'", table)))?;
        snapshot
            .stats
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, stats)| *stats)
            .ok_or_else(|| AdvisorError::catalog(format!("no statistics for {}.{}", table, column)))
    }
}
