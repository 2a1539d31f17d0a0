// Captured query log reader
use crate::config::CaptureConfig;
use crate::error::AdvisorResult;
use crate::monitoring::{AuditOperationType, AuditResult, MonitoringSystem};
use crate::types::CapturedQuery;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One record as written by the capture layer
#[derive(Debug, Deserialize)]
struct LogRecord {
    sql: String,
    /// Execution time in milliseconds
    #[serde(alias = "elapsed_ms")]
    time: Option<f64>,
    /// Epoch seconds with fractional part
    timestamp: Option<f64>,
    captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    bindings: Vec<Value>,
}

/// Turns query log text into captured queries, dropping ignored statements
#[derive(Debug, Clone)]
pub struct QueryLogReader {
    ignore_patterns: Vec<Regex>,
}

impl QueryLogReader {
    pub fn new(config: &CaptureConfig) -> AdvisorResult<Self> {
        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ignore_patterns })
    }

    /// Read a log file, either JSON lines or a single JSON array
    pub async fn read(&self, path: impl AsRef<Path>) -> AdvisorResult<Vec<CapturedQuery>> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let queries = self.parse(&text)?;
        info!(path = %path.display(), queries = queries.len(), "Loaded query log");
        Ok(queries)
    }

    /// Parse log text. A malformed array is an error; malformed lines and
    /// array elements are skipped.
    pub fn parse(&self, text: &str) -> AdvisorResult<Vec<CapturedQuery>> {
        let records: Vec<(usize, Value)> = if text.trim_start().starts_with('[') {
            let values: Vec<Value> = serde_json::from_str(text)?;
            values.into_iter().enumerate().map(|(i, v)| (i + 1, v)).collect()
        } else {
            text.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .filter_map(|(i, line)| match serde_json::from_str::<Value>(line) {
                    Ok(value) => Some((i + 1, value)),
                    Err(e) => {
                        warn!(line = i + 1, error = %e, "Skipping malformed log line");
                        None
                    }
                })
                .collect()
        };

        let mut queries = Vec::with_capacity(records.len());
        for (position, value) in records {
            let record: LogRecord = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    warn!(record = position, error = %e, "Skipping malformed log record");
                    continue;
                }
            };
            if let Some(query) = self.to_query(record) {
                queries.push(query);
            }
        }
        Ok(queries)
    }

    fn to_query(&self, record: LogRecord) -> Option<CapturedQuery> {
        let sql = if record.bindings.is_empty() {
            record.sql
        } else {
            substitute_bindings(&record.sql, &record.bindings)
        };

        if let Some(pattern) = self.ignore_patterns.iter().find(|p| p.is_match(&sql)) {
            debug!(pattern = %pattern, "Ignoring captured query");
            return None;
        }

        let captured_at = record
            .captured_at
            .or_else(|| record.timestamp.and_then(from_epoch_seconds))
            .unwrap_or_else(Utc::now);

        Some(CapturedQuery {
            sql,
            elapsed_ms: record.time.unwrap_or(0.0),
            captured_at,
        })
    }
}

/// Read a query log with the given capture settings
pub async fn read_log(path: impl AsRef<Path>, config: &CaptureConfig) -> AdvisorResult<Vec<CapturedQuery>> {
    QueryLogReader::new(config)?.read(path).await
}

/// Read a query log, tracking the read and recording it in the audit log
pub async fn read_log_monitored(
    path: impl AsRef<Path>,
    config: &CaptureConfig,
    monitoring: &Arc<MonitoringSystem>,
) -> AdvisorResult<Vec<CapturedQuery>> {
    let path = path.as_ref();
    let tracker = monitoring.start_operation("read_query_log");
    let result = read_log(path, config).await;

    let mut details = HashMap::new();
    let audit_result = match &result {
        Ok(queries) => {
            tracker.complete_success(queries.len() as u64);
            details.insert("queries".to_string(), queries.len().to_string());
            AuditResult::Success
        }
        Err(e) => {
            tracker.complete_failure(&e.to_string());
            AuditResult::Failure(e.to_string())
        }
    };
    monitoring.log_audit_entry(
        AuditOperationType::QueryLogRead,
        &path.display().to_string(),
        "read_query_log",
        audit_result,
        details,
    );
    result
}

fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos).single()
}

/// Replace `?` placeholders outside quoted text with bound values, in order.
/// Placeholders without a matching value are left alone.
pub fn substitute_bindings(sql: &str, bindings: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut values = bindings.iter();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) => {
                out.push(ch);
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => match values.next() {
                    Some(value) => out.push_str(&render_binding(value)),
                    None => out.push(ch),
                },
                _ => out.push(ch),
            },
        }
    }
    out
}

fn render_binding(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}

fn quote_literal(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('\'');
    for ch in raw.chars() {
        if ch == '\'' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}
