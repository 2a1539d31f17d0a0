// End-to-end advisor pipeline
use crate::catalog::{IndexCatalog, SchemaCatalog, TableStatsProvider};
use crate::config::AdvisorConfig;
use crate::ddl::{build_report, rank, IndexStatement, ReportRow, StatementBuilder};
use crate::monitoring::{AuditOperationType, AuditResult, MonitoringConfig, MonitoringSystem};
use crate::suggestion::{
    CompositeIndexSynthesizer, CoveredPattern, ImpactAnalyzer, ImpactRow, RunStats, SuggestionEngine,
};
use crate::types::{CapturedQuery, Suggestion};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// External collaborators consulted during a run
#[derive(Clone, Copy)]
pub struct Catalogs<'a> {
    pub indexes: &'a dyn IndexCatalog,
    pub schema: &'a dyn SchemaCatalog,
    /// Only needed when impact analysis is enabled
    pub stats: Option<&'a dyn TableStatsProvider>,
}

/// Result of one advisor run
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdvisorReport {
    /// Ranked suggestions, composites included
    pub suggestions: Vec<Suggestion>,
    pub covered: Vec<CoveredPattern>,
    pub stats: RunStats,
    pub impact: Vec<ImpactRow>,
    /// Validated, de-duplicated statements in rank order
    pub statements: Vec<IndexStatement>,
    pub rows: Vec<ReportRow>,
}

/// Runs analysis, optional composite and impact passes, and statement building
pub struct IndexAdvisor {
    config: AdvisorConfig,
    monitoring: Arc<MonitoringSystem>,
}

impl IndexAdvisor {
    pub fn new(config: AdvisorConfig) -> Self {
        Self::with_monitoring(config, MonitoringSystem::new(MonitoringConfig::default()))
    }

    pub fn with_monitoring(config: AdvisorConfig, monitoring: Arc<MonitoringSystem>) -> Self {
        Self { config, monitoring }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn monitoring(&self) -> &Arc<MonitoringSystem> {
        &self.monitoring
    }

    pub fn run(&self, queries: &[CapturedQuery], catalogs: Catalogs<'_>) -> AdvisorReport {
        let tracker = self.monitoring.start_operation("analyze_queries");
        let engine = SuggestionEngine::with_config(self.config.suggestions.clone());
        let outcome = engine.analyze_detailed(queries, catalogs.indexes);
        tracker.complete_success(outcome.stats.received as u64);

        let mut suggestions = outcome.suggestions;
        if self.config.composite.enabled {
            let composites = CompositeIndexSynthesizer::new().synthesize(&suggestions);
            info!(composites = composites.len(), "Composite synthesis complete");
            suggestions.extend(composites);
        }
        rank(&mut suggestions);

        let impact = match (self.config.impact.enabled, catalogs.stats) {
            (true, Some(stats)) => {
                let tracker = self.monitoring.start_operation("impact_analysis");
                let rows = ImpactAnalyzer::with_threshold(self.config.impact.cardinality_threshold)
                    .analyze(&suggestions, stats);
                tracker.complete_success(rows.len() as u64);
                rows
            }
            (true, None) => {
                warn!("Impact analysis requested without a statistics source");
                Vec::new()
            }
            (false, _) => Vec::new(),
        };

        let tracker = self.monitoring.start_operation("build_statements");
        let statements = StatementBuilder::new().build_all(&suggestions, catalogs.schema);
        let rows = build_report(&suggestions, &impact, catalogs.schema);
        tracker.complete_success(statements.len() as u64);

        let mut details = HashMap::new();
        details.insert("queries".to_string(), outcome.stats.received.to_string());
        details.insert("suggestions".to_string(), suggestions.len().to_string());
        details.insert("statements".to_string(), statements.len().to_string());
        self.monitoring.log_audit_entry(
            AuditOperationType::Analysis,
            "query_log",
            "suggest_indexes",
            AuditResult::Success,
            details,
        );

        AdvisorReport {
            suggestions,
            covered: outcome.covered,
            stats: outcome.stats,
            impact,
            statements,
            rows,
        }
    }
}
