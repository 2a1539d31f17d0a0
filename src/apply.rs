// Applying generated index statements
use crate::ddl::IndexStatement;
use crate::error::{AdvisorError, AdvisorResult};
use crate::monitoring::{AuditOperationType, AuditResult, MonitoringSystem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use tracing::{info, warn};

/// Something that can run a DDL statement against a store
pub trait StatementExecutor {
    fn execute(&mut self, sql: &str) -> AdvisorResult<()>;
}

/// Outcome of one statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApplyStatus {
    Applied,
    DryRun,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementOutcome {
    pub table: String,
    pub index_name: String,
    pub sql: String,
    pub status: ApplyStatus,
}

/// Per-statement results of a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub outcomes: Vec<StatementOutcome>,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ApplyReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Run every statement through the executor. A failure is recorded and the
/// batch continues; a dry run executes nothing.
pub fn apply_statements(
    executor: &mut dyn StatementExecutor,
    statements: &[IndexStatement],
    dry_run: bool,
    monitoring: Option<&MonitoringSystem>,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    for statement in statements {
        let status = if dry_run {
            report.skipped += 1;
            ApplyStatus::DryRun
        } else {
            match executor.execute(&statement.sql) {
                Ok(()) => {
                    report.applied += 1;
                    ApplyStatus::Applied
                }
                Err(e) => {
                    warn!(table = %statement.table, index = %statement.index_name, error = %e, "Statement failed");
                    report.failed += 1;
                    ApplyStatus::Failed(e.to_string())
                }
            }
        };

        if let Some(monitoring) = monitoring {
            let result = match &status {
                ApplyStatus::Applied => AuditResult::Success,
                ApplyStatus::DryRun => AuditResult::Skipped("dry run".to_string()),
                ApplyStatus::Failed(message) => AuditResult::Failure(message.clone()),
            };
            let mut details = HashMap::new();
            details.insert("index_name".to_string(), statement.index_name.clone());
            details.insert("sql".to_string(), statement.sql.clone());
            monitoring.log_audit_entry(AuditOperationType::SchemaChange, &statement.table, "add_index", result, details);
        }

        report.outcomes.push(StatementOutcome {
            table: statement.table.clone(),
            index_name: statement.index_name.clone(),
            sql: statement.sql.clone(),
            status,
        });
    }

    info!(
        applied = report.applied,
        failed = report.failed,
        skipped = report.skipped,
        "Statement batch finished"
    );
    report
}

/// Executor that appends each statement as a line of an SQL script
pub struct ScriptWriter<W: Write> {
    out: W,
}

impl<W: Write> ScriptWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatementExecutor for ScriptWriter<W> {
    fn execute(&mut self, sql: &str) -> AdvisorResult<()> {
        writeln!(self.out, "{}", sql).map_err(|e| AdvisorError::apply(format!("cannot write statement: {}", e)))
    }
}
