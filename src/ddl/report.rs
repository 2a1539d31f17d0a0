use super::statement_builder::StatementBuilder;
use crate::catalog::{SchemaCache, SchemaCatalog};
use crate::suggestion::impact::{ImpactClass, ImpactRow};
use crate::types::Suggestion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display category of a report row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexKind {
    Normal,
    Unique,
    Composite,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexKind::Normal => "NORMAL",
            IndexKind::Unique => "UNIQUE",
            IndexKind::Composite => "COMPOSITE",
        })
    }
}

/// One line of the tabular suggestion report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub table: String,
    pub columns: Vec<String>,
    /// Number of queries behind the suggestion
    pub usage_count: u32,
    pub kind: IndexKind,
    /// Statement to create the index; `None` when schema validation rejected it
    pub sql: Option<String>,
}

/// Order suggestions by query count, highest first; ties keep their order
pub fn rank(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| b.query_count.cmp(&a.query_count));
}

/// Build report rows for ranked suggestions
pub fn build_report(suggestions: &[Suggestion], impact: &[ImpactRow], schema: &dyn SchemaCatalog) -> Vec<ReportRow> {
    let builder = StatementBuilder::new();
    let mut cache = SchemaCache::new(schema);

    suggestions
        .iter()
        .map(|suggestion| ReportRow {
            table: suggestion.table.clone(),
            columns: suggestion.columns.clone(),
            usage_count: suggestion.query_count,
            kind: kind_of(suggestion, impact),
            sql: builder
                .build_cached(suggestion, &mut cache)
                .map(|statement| statement.sql),
        })
        .collect()
}

fn kind_of(suggestion: &Suggestion, impact: &[ImpactRow]) -> IndexKind {
    if suggestion.composite {
        return IndexKind::Composite;
    }
    let unique = match suggestion.columns.as_slice() {
        [column] => impact.iter().any(|row| {
            row.class == ImpactClass::UniqueCandidate
                && row.table.eq_ignore_ascii_case(&suggestion.table)
                && row.column.eq_ignore_ascii_case(column)
        }),
        _ => false,
    };
    if unique {
        IndexKind::Unique
    } else {
        IndexKind::Normal
    }
}

/// Plain-text table of report rows
pub fn render_text(rows: &[ReportRow]) -> String {
    let headers = ["Table", "Columns", "Usage", "Type", "SQL"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            [
                row.table.clone(),
                row.columns.join(", "),
                row.usage_count.to_string(),
                row.kind.to_string(),
                row.sql.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_line = |values: Vec<&str>| {
        values
            .iter()
            .zip(widths.iter())
            .map(|(value, width)| format!("{:<width$}", value, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&format_line(headers.to_vec()));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for line in &cells {
        out.push_str(&format_line(line.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}
