use crate::catalog::TableStatsProvider;
use crate::types::{ColumnStats, Suggestion};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Cardinality above which a column is worth a unique index
pub const UNIQUE_CANDIDATE_CARDINALITY: f64 = 90.0;

/// Classification of a suggested column by its cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactClass {
    UniqueCandidate,
    LowCardinality,
    Normal,
    /// Statistics could not be read for the column
    AnalysisError,
}

impl fmt::Display for ImpactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImpactClass::UniqueCandidate => "UNIQUE-candidate",
            ImpactClass::LowCardinality => "LOW-CARDINALITY-warning",
            ImpactClass::Normal => "NORMAL",
            ImpactClass::AnalysisError => "ANALYSIS ERROR",
        })
    }
}

/// Impact figures for one suggested column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRow {
    pub table: String,
    pub column: String,
    /// Raw statistics, absent when the lookup failed
    pub stats: Option<ColumnStats>,
    /// Distinct values as a percentage of rows
    pub cardinality: Option<f64>,
    pub class: ImpactClass,
    /// Lookup failure message for `AnalysisError` rows
    pub error: Option<String>,
}

/// Computes cardinality and size statistics for suggested columns
#[derive(Debug, Clone)]
pub struct ImpactAnalyzer {
    /// Columns below this cardinality percentage are flagged
    cardinality_threshold: f64,
}

impl Default for ImpactAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImpactAnalyzer {
    pub fn new() -> Self {
        Self {
            cardinality_threshold: 25.0,
        }
    }

    pub fn with_threshold(cardinality_threshold: f64) -> Self {
        Self { cardinality_threshold }
    }

    pub fn classify(&self, cardinality: f64) -> ImpactClass {
        if cardinality > UNIQUE_CANDIDATE_CARDINALITY {
            ImpactClass::UniqueCandidate
        } else if cardinality < self.cardinality_threshold {
            ImpactClass::LowCardinality
        } else {
            ImpactClass::Normal
        }
    }

    /// One row per distinct (table, column) across the suggestions. A failed
    /// lookup yields an `AnalysisError` row and the batch continues.
    pub fn analyze(&self, suggestions: &[Suggestion], stats: &dyn TableStatsProvider) -> Vec<ImpactRow> {
        let mut seen = IndexSet::new();
        let mut rows = Vec::new();

        for suggestion in suggestions {
            for column in &suggestion.columns {
                if !seen.insert((suggestion.table.to_lowercase(), column.to_lowercase())) {
                    continue;
                }
                rows.push(self.analyze_column(&suggestion.table, column, stats));
            }
        }

        let errors = rows.iter().filter(|r| r.class == ImpactClass::AnalysisError).count();
        info!(columns = rows.len(), errors, "Impact analysis complete");
        rows
    }

    fn analyze_column(&self, table: &str, column: &str, stats: &dyn TableStatsProvider) -> ImpactRow {
        match stats.column_stats(table, column) {
            Ok(figures) => {
                let cardinality = figures.cardinality();
                ImpactRow {
                    table: table.to_string(),
                    column: column.to_string(),
                    stats: Some(figures),
                    cardinality: Some(cardinality),
                    class: self.classify(cardinality),
                    error: None,
                }
            }
            Err(e) => {
                warn!(table = %table, column = %column, error = %e, "Statistics lookup failed");
                ImpactRow {
                    table: table.to_string(),
                    column: column.to_string(),
                    stats: None,
                    cardinality: None,
                    class: ImpactClass::AnalysisError,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
