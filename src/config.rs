use crate::error::{AdvisorError, AdvisorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration surface of the advisor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Thresholds and filters applied while grouping queries
    pub suggestions: SuggestionConfig,
    /// Composite index synthesis
    pub composite: CompositeConfig,
    /// Cardinality / size impact analysis
    pub impact: ImpactConfig,
    /// Filters applied while reading captured query logs
    pub capture: CaptureConfig,
}

/// How an existing index is judged to already serve a candidate column set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// Index columns, taken as an unordered set, contain every candidate column
    #[default]
    Superset,
    /// The leading index columns are exactly the candidate set
    LeftmostPrefix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Tables that never receive suggestions
    pub ignore_tables: Vec<String>,
    /// Queries faster than this are skipped (0 disables the filter)
    pub min_query_time_ms: f64,
    /// Groups seen fewer times than this are dropped
    pub min_query_count: u32,
    /// Whether qualified SELECT-list columns count as candidates
    pub include_select_columns: bool,
    /// Coverage test against existing indexes
    pub coverage: CoverageMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub enabled: bool,
    /// Columns below this cardinality percentage get a warning
    pub cardinality_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Regexes; matching statements are dropped from the log
    pub ignore_patterns: Vec<String>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            ignore_tables: vec!["migrations".to_string()],
            min_query_time_ms: 0.0,
            min_query_count: 1,
            include_select_columns: false,
            coverage: CoverageMode::Superset,
        }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cardinality_threshold: 25.0,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                "(?i)information_schema".to_string(),
                "(?i)pg_catalog".to_string(),
            ],
        }
    }
}

impl SuggestionConfig {
    /// Whether a table is on the ignore list (case-insensitive)
    pub fn is_ignored(&self, table: &str) -> bool {
        self.ignore_tables
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(table))
    }
}

impl AdvisorConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> AdvisorResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|e| AdvisorError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from JSON text
    pub fn from_json(raw: &str) -> AdvisorResult<Self> {
        let config: AdvisorConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> AdvisorResult<()> {
        if self.suggestions.min_query_time_ms < 0.0 {
            return Err(AdvisorError::config("min_query_time_ms must not be negative"));
        }
        if !(0.0..=100.0).contains(&self.impact.cardinality_threshold) {
            return Err(AdvisorError::config(
                "cardinality_threshold must be a percentage between 0 and 100",
            ));
        }
        for pattern in &self.capture.ignore_patterns {
            regex::Regex::new(pattern)?;
        }
        Ok(())
    }
}
