use super::aggregator::{group_key, primary_candidates, TableSuggestionAccumulator};
use crate::catalog::{IndexCache, IndexCatalog};
use crate::config::{CoverageMode, SuggestionConfig};
use crate::ddl::index_name;
use crate::error::AdvisorError;
use crate::query_parser::ClauseExtractor;
use crate::types::{CapturedQuery, ExistingIndex, QueryType, Suggestion};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A candidate access pattern that an existing index already serves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoveredPattern {
    pub table: String,
    pub columns: Vec<String>,
    /// Name of the existing index that covers the pattern
    pub index_name: String,
    pub query_count: u32,
}

/// Counters for one analysis run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub received: usize,
    pub below_time_threshold: usize,
    pub parse_failures: usize,
    pub ignored: usize,
    pub analyzed: usize,
}

/// Everything an analysis run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub suggestions: Vec<Suggestion>,
    pub covered: Vec<CoveredPattern>,
    pub stats: RunStats,
}

/// Queries sharing one table and candidate column set
#[derive(Debug, Clone)]
struct QueryGroup {
    table: String,
    columns: Vec<String>,
    count: u32,
    total_time_ms: f64,
    join_related: bool,
    query_type: Option<QueryType>,
}

/// Mutable state of a single `analyze` call. Never outlives the call.
struct AnalysisRun<'a> {
    groups: IndexMap<String, QueryGroup>,
    accumulator: TableSuggestionAccumulator,
    indexes: IndexCache<'a>,
    stats: RunStats,
}

/// Groups captured queries by access pattern and checks them against the
/// existing indexes
#[derive(Debug, Clone, Default)]
pub struct SuggestionEngine {
    config: SuggestionConfig,
    extractor: ClauseExtractor,
}

impl SuggestionEngine {
    pub fn new() -> Self {
        Self::with_config(SuggestionConfig::default())
    }

    pub fn with_config(config: SuggestionConfig) -> Self {
        Self {
            config,
            extractor: ClauseExtractor::new(),
        }
    }

    pub fn config(&self) -> &SuggestionConfig {
        &self.config
    }

    /// Suggestions in grouping order
    pub fn analyze(&self, queries: &[CapturedQuery], catalog: &dyn IndexCatalog) -> Vec<Suggestion> {
        self.analyze_detailed(queries, catalog).suggestions
    }

    pub fn analyze_detailed(&self, queries: &[CapturedQuery], catalog: &dyn IndexCatalog) -> AnalysisOutcome {
        let mut run = AnalysisRun {
            groups: IndexMap::new(),
            accumulator: TableSuggestionAccumulator::new(),
            indexes: IndexCache::new(catalog),
            stats: RunStats::default(),
        };

        for query in queries {
            self.group_query(&mut run, query);
        }
        self.add_cross_table_groups(&mut run);

        let mut outcome = AnalysisOutcome::default();
        let groups = std::mem::take(&mut run.groups);
        for group in groups.into_values() {
            if group.count < self.config.min_query_count || group.columns.is_empty() {
                continue;
            }

            let existing = run.indexes.indexes(&group.table);
            if let Some(index) = covering_index(self.config.coverage, existing, &group.columns) {
                debug!(table = %group.table, columns = ?group.columns, index = %index.name, "Pattern already covered");
                outcome.covered.push(CoveredPattern {
                    table: group.table,
                    columns: group.columns,
                    index_name: index.name.clone(),
                    query_count: group.count,
                });
                continue;
            }

            outcome.suggestions.push(Suggestion {
                index_name: index_name(&group.table, &group.columns),
                avg_time_ms: group.total_time_ms / f64::from(group.count),
                table: group.table,
                columns: group.columns,
                query_count: group.count,
                composite: false,
                join_related: group.join_related,
                query_type: group.query_type,
            });
        }

        outcome.stats = run.stats;
        info!(
            received = outcome.stats.received,
            analyzed = outcome.stats.analyzed,
            parse_failures = outcome.stats.parse_failures,
            suggestions = outcome.suggestions.len(),
            covered = outcome.covered.len(),
            index_lookups = run.indexes.lookups(),
            "Query analysis complete"
        );
        outcome
    }

    /// Whether no existing index on `table` covers `columns`.
    /// An empty column set never needs an index.
    pub fn is_index_needed(&self, table: &str, columns: &[String], catalog: &dyn IndexCatalog) -> bool {
        if columns.is_empty() {
            return false;
        }
        let mut cache = IndexCache::new(catalog);
        covering_index(self.config.coverage, cache.indexes(table), columns).is_none()
    }

    fn group_query(&self, run: &mut AnalysisRun<'_>, query: &CapturedQuery) {
        run.stats.received += 1;

        let min_time = self.config.min_query_time_ms;
        if min_time > 0.0 && query.elapsed_ms < min_time {
            run.stats.below_time_threshold += 1;
            return;
        }

        let shape = match self.extractor.extract(&query.sql) {
            Ok(shape) => shape,
            Err(e @ AdvisorError::NestingTooDeep { .. }) => {
                warn!(error = %e, "Skipping query");
                run.stats.parse_failures += 1;
                return;
            }
            Err(e) => {
                debug!(error = %e, "Skipping unparseable query");
                run.stats.parse_failures += 1;
                return;
            }
        };

        let include_select = self.config.include_select_columns;
        run.accumulator.absorb(&shape, include_select);

        if self.config.is_ignored(&shape.main_table) || shape.main_is_subquery() {
            run.stats.ignored += 1;
            return;
        }
        run.stats.analyzed += 1;

        let columns = primary_candidates(&shape, include_select);
        if columns.is_empty() {
            return;
        }

        let group = run
            .groups
            .entry(group_key(&shape.main_table, &columns))
            .or_insert_with(|| QueryGroup {
                table: shape.main_table.clone(),
                columns,
                count: 0,
                total_time_ms: 0.0,
                join_related: false,
                query_type: Some(shape.query_type),
            });
        group.count += 1;
        group.total_time_ms += query.elapsed_ms;
    }

    /// One group per accumulated table pattern the per-query grouping missed
    fn add_cross_table_groups(&self, run: &mut AnalysisRun<'_>) {
        for (table, columns) in run.accumulator.iter() {
            if columns.is_empty() || self.config.is_ignored(table) {
                continue;
            }
            let columns: Vec<String> = columns.iter().cloned().collect();
            let key = group_key(table, &columns);
            if run.groups.contains_key(&key) {
                continue;
            }
            run.groups.insert(
                key,
                QueryGroup {
                    table: table.to_string(),
                    columns,
                    count: 1,
                    total_time_ms: 0.0,
                    join_related: true,
                    query_type: None,
                },
            );
        }
    }
}

/// Whether an existing index's columns serve the candidate set
pub fn covers(mode: CoverageMode, index_columns: &[String], candidate: &[String]) -> bool {
    let contains = |columns: &[String], column: &String| columns.iter().any(|c| c.eq_ignore_ascii_case(column));
    match mode {
        CoverageMode::Superset => candidate.iter().all(|column| contains(index_columns, column)),
        CoverageMode::LeftmostPrefix => {
            index_columns.len() >= candidate.len()
                && candidate
                    .iter()
                    .all(|column| contains(&index_columns[..candidate.len()], column))
        }
    }
}

fn covering_index<'i>(mode: CoverageMode, indexes: &'i [ExistingIndex], candidate: &[String]) -> Option<&'i ExistingIndex> {
    indexes.iter().find(|index| covers(mode, &index.columns, candidate))
}
