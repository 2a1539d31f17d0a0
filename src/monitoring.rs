// Operation tracking and audit logging for advisor runs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the monitoring system
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub enable_performance_tracking: bool,
    pub enable_audit_logging: bool,
    pub max_completed_operations: usize,
    pub max_audit_entries: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_performance_tracking: true,
            enable_audit_logging: true,
            max_completed_operations: 1000,
            max_audit_entries: 10000,
        }
    }
}

/// Kinds of audited actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOperationType {
    /// Reading a captured query log
    QueryLogRead,
    /// Producing suggestions from captured queries
    Analysis,
    /// Creating (or exporting) an index statement
    SchemaChange,
}

/// Results of audit operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuditResult {
    Success,
    Skipped(String),
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    InProgress,
    Completed,
    Failed,
}

/// Timing and volume of one pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub operation_id: String,
    pub operation_name: String,
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub records_processed: Option<u64>,
    pub throughput: Option<f64>, // records per second
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_type: AuditOperationType,
    /// Table, file or statement the action touched
    pub resource_id: String,
    pub action: String,
    pub result: AuditResult,
    pub details: HashMap<String, String>,
}

/// Summary over everything the monitoring system has recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub active_operations: usize,
    pub completed_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub avg_duration_ms: f64,
    pub total_records_processed: u64,
    pub audit_entries: usize,
}

/// Handle for one tracked operation
pub struct OperationTracker {
    pub operation_id: String,
    pub operation_name: String,
    pub start_time: DateTime<Utc>,
    monitoring_system: Arc<MonitoringSystem>,
}

impl OperationTracker {
    fn elapsed_ms(&self) -> u64 {
        Utc::now()
            .signed_duration_since(self.start_time)
            .num_milliseconds()
            .max(0) as u64
    }

    /// Mark operation as successfully completed
    pub fn complete_success(self, records_processed: u64) {
        let duration_ms = self.elapsed_ms();

        info!(
            operation_id = %self.operation_id,
            operation_name = %self.operation_name,
            duration_ms = duration_ms,
            records_processed = records_processed,
            "Operation completed successfully"
        );

        self.monitoring_system.complete_operation(
            &self.operation_id,
            OperationStatus::Completed,
            duration_ms,
            Some(records_processed),
        );
    }

    /// Mark operation as failed
    pub fn complete_failure(self, error: &str) {
        let duration_ms = self.elapsed_ms();

        error!(
            operation_id = %self.operation_id,
            operation_name = %self.operation_name,
            duration_ms = duration_ms,
            error = error,
            "Operation failed"
        );

        self.monitoring_system.complete_operation(
            &self.operation_id,
            OperationStatus::Failed,
            duration_ms,
            None,
        );
    }
}

/// In-process record of stage timings and audited actions.
/// One instance per run; share it through `Arc`.
pub struct MonitoringSystem {
    config: MonitoringConfig,
    active_operations: Mutex<HashMap<String, PerformanceMetric>>,
    completed_operations: Mutex<Vec<PerformanceMetric>>,
    audit_log: Mutex<Vec<AuditEntry>>,
}

impl MonitoringSystem {
    pub fn new(config: MonitoringConfig) -> Arc<Self> {
        debug!("Initializing monitoring system with config: {:?}", config);

        Arc::new(Self {
            config,
            active_operations: Mutex::new(HashMap::new()),
            completed_operations: Mutex::new(Vec::new()),
            audit_log: Mutex::new(Vec::new()),
        })
    }

    /// Start tracking a new operation
    pub fn start_operation(self: &Arc<Self>, operation_name: &str) -> OperationTracker {
        let operation_id = Uuid::new_v4().to_string();
        let start_time = Utc::now();

        if self.config.enable_performance_tracking {
            let metric = PerformanceMetric {
                operation_id: operation_id.clone(),
                operation_name: operation_name.to_string(),
                status: OperationStatus::InProgress,
                start_time,
                end_time: None,
                duration_ms: None,
                records_processed: None,
                throughput: None,
            };

            if let Ok(mut active) = self.active_operations.lock() {
                active.insert(operation_id.clone(), metric);
            }
        }

        debug!(
            operation_id = %operation_id,
            operation_name = operation_name,
            "Started operation tracking"
        );

        OperationTracker {
            operation_id,
            operation_name: operation_name.to_string(),
            start_time,
            monitoring_system: Arc::clone(self),
        }
    }

    fn complete_operation(
        &self,
        operation_id: &str,
        status: OperationStatus,
        duration_ms: u64,
        records_processed: Option<u64>,
    ) {
        if !self.config.enable_performance_tracking {
            return;
        }

        let metric = match self.active_operations.lock() {
            Ok(mut active) => active.remove(operation_id),
            Err(_) => None,
        };

        if let Some(mut metric) = metric {
            metric.status = status;
            metric.end_time = Some(Utc::now());
            metric.duration_ms = Some(duration_ms);
            metric.records_processed = records_processed;

            if let Some(records) = records_processed {
                if duration_ms > 0 {
                    metric.throughput = Some((records as f64) / (duration_ms as f64 / 1000.0));
                }
            }

            if let Ok(mut completed) = self.completed_operations.lock() {
                completed.push(metric);
                if completed.len() > self.config.max_completed_operations {
                    completed.remove(0);
                }
            }
        }
    }

    /// Log an audit entry
    pub fn log_audit_entry(
        &self,
        operation_type: AuditOperationType,
        resource_id: &str,
        action: &str,
        result: AuditResult,
        details: HashMap<String, String>,
    ) {
        if !self.config.enable_audit_logging {
            return;
        }

        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation_type,
            resource_id: resource_id.to_string(),
            action: action.to_string(),
            result: result.clone(),
            details,
        };

        match &result {
            AuditResult::Success => {
                info!(
                    audit_id = %entry.id,
                    operation_type = ?operation_type,
                    resource_id = resource_id,
                    action = action,
                    "Audit: {} on {} - SUCCESS", action, resource_id
                );
            }
            AuditResult::Skipped(reason) => {
                info!(
                    audit_id = %entry.id,
                    operation_type = ?operation_type,
                    resource_id = resource_id,
                    action = action,
                    reason = %reason,
                    "Audit: {} on {} - SKIPPED: {}", action, resource_id, reason
                );
            }
            AuditResult::Failure(msg) => {
                error!(
                    audit_id = %entry.id,
                    operation_type = ?operation_type,
                    resource_id = resource_id,
                    action = action,
                    error = %msg,
                    "Audit: {} on {} - FAILURE: {}", action, resource_id, msg
                );
            }
        }

        if let Ok(mut audit_log) = self.audit_log.lock() {
            audit_log.push(entry);
            if audit_log.len() > self.config.max_audit_entries {
                audit_log.remove(0);
            }
        }
    }

    pub fn system_stats(&self) -> SystemStats {
        let active_operations = self.active_operations.lock().map(|a| a.len()).unwrap_or(0);
        let completed = self.performance_metrics(None);
        let audit_entries = self.audit_log.lock().map(|log| log.len()).unwrap_or(0);

        let successful_operations = completed
            .iter()
            .filter(|op| op.status == OperationStatus::Completed)
            .count();
        let avg_duration_ms = if completed.is_empty() {
            0.0
        } else {
            completed
                .iter()
                .filter_map(|op| op.duration_ms)
                .map(|d| d as f64)
                .sum::<f64>()
                / completed.len() as f64
        };

        SystemStats {
            active_operations,
            completed_operations: completed.len(),
            successful_operations,
            failed_operations: completed.len() - successful_operations,
            avg_duration_ms,
            total_records_processed: completed.iter().filter_map(|op| op.records_processed).sum(),
            audit_entries,
        }
    }

    /// Completed operations whose name contains `operation_filter`
    pub fn performance_metrics(&self, operation_filter: Option<&str>) -> Vec<PerformanceMetric> {
        let completed = match self.completed_operations.lock() {
            Ok(completed) => completed.clone(),
            Err(_) => {
                warn!("Failed to lock completed operations for metrics");
                return Vec::new();
            }
        };

        completed
            .into_iter()
            .filter(|metric| operation_filter.map_or(true, |filter| metric.operation_name.contains(filter)))
            .collect()
    }

    /// Most recent audit entries, newest first
    pub fn recent_audit_entries(&self, limit: usize) -> Vec<AuditEntry> {
        match self.audit_log.lock() {
            Ok(audit_log) => audit_log.iter().rev().take(limit).cloned().collect(),
            Err(_) => {
                warn!("Failed to lock audit log for recent entries");
                Vec::new()
            }
        }
    }
}
