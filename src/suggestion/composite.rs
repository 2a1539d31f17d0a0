use crate::ddl::index_name;
use crate::types::Suggestion;
use indexmap::IndexMap;
use tracing::debug;

/// Most columns a synthesized composite index may span
pub const MAX_COMPOSITE_COLUMNS: usize = 3;
/// Fewest queries a column needs before it joins a composite index
pub const MIN_MEMBER_QUERY_COUNT: u32 = 2;

/// Merges frequent single-column suggestions on a table into one composite
#[derive(Debug, Clone, Default)]
pub struct CompositeIndexSynthesizer;

impl CompositeIndexSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// One composite suggestion per table with at least two qualifying
    /// single-column suggestions, columns ordered by query count
    pub fn synthesize(&self, suggestions: &[Suggestion]) -> Vec<Suggestion> {
        let mut by_table: IndexMap<&str, Vec<&Suggestion>> = IndexMap::new();
        for suggestion in suggestions {
            if suggestion.composite
                || suggestion.columns.len() != 1
                || suggestion.query_count < MIN_MEMBER_QUERY_COUNT
            {
                continue;
            }
            by_table.entry(suggestion.table.as_str()).or_default().push(suggestion);
        }

        let mut composites = Vec::new();
        for (table, mut members) in by_table {
            members.sort_by(|a, b| b.query_count.cmp(&a.query_count));

            let mut chosen: Vec<&Suggestion> = Vec::new();
            for member in members {
                let column = &member.columns[0];
                if !chosen.iter().any(|c| c.columns[0].eq_ignore_ascii_case(column)) {
                    chosen.push(member);
                }
                if chosen.len() == MAX_COMPOSITE_COLUMNS {
                    break;
                }
            }
            if chosen.len() < 2 {
                continue;
            }

            let columns: Vec<String> = chosen.iter().map(|s| s.columns[0].clone()).collect();
            let query_count: u32 = chosen.iter().map(|s| s.query_count).sum();
            let total_time: f64 = chosen
                .iter()
                .map(|s| s.avg_time_ms * f64::from(s.query_count))
                .sum();
            let query_type = chosen[0].query_type.filter(|qt| chosen.iter().all(|s| s.query_type == Some(*qt)));

            debug!(table = %table, columns = ?columns, query_count, "Synthesized composite index");
            composites.push(Suggestion {
                table: table.to_string(),
                index_name: index_name(table, &columns),
                columns,
                query_count,
                avg_time_ms: total_time / f64::from(query_count),
                composite: true,
                join_related: chosen.iter().any(|s| s.join_related),
                query_type,
            });
        }

        composites
    }
}
