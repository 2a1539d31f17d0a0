use super::*;
use crate::catalog::{CatalogSnapshot, IndexCatalog};
use crate::config::{CoverageMode, SuggestionConfig};
use crate::error::{AdvisorError, AdvisorResult};
use crate::query_parser::parse;
use crate::types::{CapturedQuery, ColumnStats, ExistingIndex, QueryType, Suggestion};

fn query(sql: &str, elapsed_ms: f64) -> CapturedQuery {
    CapturedQuery::new(sql, elapsed_ms)
}

fn columns(suggestion: &Suggestion) -> Vec<&str> {
    suggestion.columns.iter().map(String::as_str).collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn single(table: &str, column: &str, query_count: u32, avg_time_ms: f64) -> Suggestion {
    Suggestion {
        table: table.to_string(),
        columns: vec![column.to_string()],
        index_name: format!("{}_{}_idx", table, column),
        query_count,
        avg_time_ms,
        composite: false,
        join_related: false,
        query_type: Some(QueryType::Select),
    }
}

struct FailingCatalog;

impl IndexCatalog for FailingCatalog {
    fn indexes(&self, table: &str) -> AdvisorResult<Vec<ExistingIndex>> {
        Err(AdvisorError::catalog(format!("cannot read indexes of {}", table)))
    }
}

#[cfg(test)]
mod aggregator_tests {
    use super::*;

    #[test]
    fn test_primary_candidates_only_main_table() {
        let shape = parse(
            "SELECT * FROM orders o JOIN customers c ON o.customer_id = c.id WHERE o.status = 'paid' AND c.region = 'eu'",
        )
        .unwrap();
        assert_eq!(primary_candidates(&shape, false), strings(&["customer_id", "status"]));
    }

    #[test]
    fn test_accumulator_covers_every_table() {
        let mut accumulator = TableSuggestionAccumulator::new();
        accumulator.absorb(
            &parse("SELECT * FROM users WHERE id IN (SELECT user_id FROM orders WHERE total > 100)").unwrap(),
            false,
        );
        accumulator.absorb(&parse("SELECT * FROM orders WHERE TOTAL > 5 ORDER BY placed_at").unwrap(), false);

        assert_eq!(accumulator.len(), 2);
        let users: Vec<&str> = accumulator.columns("users").unwrap().iter().map(String::as_str).collect();
        assert_eq!(users, vec!["id"]);
        let orders: Vec<&str> = accumulator.columns("orders").unwrap().iter().map(String::as_str).collect();
        assert_eq!(orders, vec!["total", "placed_at"]);
    }

    #[test]
    fn test_accumulator_skips_derived_tables() {
        let mut accumulator = TableSuggestionAccumulator::new();
        accumulator.absorb(
            &parse("SELECT r.user_id FROM (SELECT user_id FROM orders WHERE status = 'open') AS r WHERE r.user_id > 10")
                .unwrap(),
            false,
        );
        let tables: Vec<&str> = accumulator.iter().map(|(table, _)| table).collect();
        assert_eq!(tables, vec!["orders"]);
    }

    #[test]
    fn test_group_key_ignores_order_and_case() {
        assert_eq!(
            group_key("users", &strings(&["Status", "email"])),
            group_key("users", &strings(&["email", "status"]))
        );
        assert_eq!(group_key("users", &strings(&["email"])), "users:email");
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let engine = SuggestionEngine::new();
        let outcome = engine.analyze_detailed(&[], &CatalogSnapshot::new());
        assert!(outcome.suggestions.is_empty());
        assert!(outcome.covered.is_empty());
        assert_eq!(outcome.stats, RunStats::default());
    }

    #[test]
    fn test_single_equality_predicate() {
        let engine = SuggestionEngine::new();
        let queries = vec![
            query("SELECT * FROM users WHERE email = 'a@example.com'", 4.0),
            query("SELECT * FROM users WHERE email = 'b@example.com'", 8.0),
        ];

        let suggestions = engine.analyze(&queries, &CatalogSnapshot::new());
        assert_eq!(suggestions.len(), 1);
        let suggestion = &suggestions[0];
        assert_eq!(suggestion.table, "users");
        assert_eq!(columns(suggestion), vec!["email"]);
        assert_eq!(suggestion.index_name, "users_email_idx");
        assert_eq!(suggestion.query_count, 2);
        assert_eq!(suggestion.avg_time_ms, 6.0);
        assert!(!suggestion.join_related);
        assert_eq!(suggestion.query_type, Some(QueryType::Select));
    }

    #[test]
    fn test_join_adds_cross_table_group() {
        let engine = SuggestionEngine::new();
        let suggestions = engine.analyze(
            &[query(
                "SELECT * FROM orders o JOIN customers c ON o.customer_id = c.id WHERE o.status = 'paid'",
                12.0,
            )],
            &CatalogSnapshot::new(),
        );

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].table, "orders");
        assert_eq!(columns(&suggestions[0]), vec!["customer_id", "status"]);
        assert!(!suggestions[0].join_related);

        assert_eq!(suggestions[1].table, "customers");
        assert_eq!(columns(&suggestions[1]), vec!["id"]);
        assert_eq!(suggestions[1].query_count, 1);
        assert_eq!(suggestions[1].avg_time_ms, 0.0);
        assert!(suggestions[1].join_related);
        assert_eq!(suggestions[1].query_type, None);
    }

    #[test]
    fn test_ignored_tables_never_suggested() {
        let engine = SuggestionEngine::new();
        let queries: Vec<CapturedQuery> = (0..50)
            .map(|i| query(&format!("SELECT * FROM migrations WHERE batch = {}", i), 30.0))
            .chain(std::iter::once(query(
                "SELECT * FROM users u JOIN migrations m ON m.user_id = u.id WHERE u.active = 1",
                3.0,
            )))
            .collect();

        let outcome = engine.analyze_detailed(&queries, &CatalogSnapshot::new());
        assert!(outcome.suggestions.iter().all(|s| s.table != "migrations"));
        assert_eq!(outcome.stats.ignored, 50);
        assert_eq!(outcome.suggestions.len(), 1);
        assert_eq!(columns(&outcome.suggestions[0]), vec!["id", "active"]);
    }

    #[test]
    fn test_thresholds_and_stats() {
        let config = SuggestionConfig {
            min_query_time_ms: 10.0,
            min_query_count: 2,
            ..SuggestionConfig::default()
        };
        let engine = SuggestionEngine::with_config(config);
        let queries = vec![
            query("SELECT * FROM users WHERE email = 'a'", 20.0),
            query("SELECT * FROM users WHERE email = 'b'", 40.0),
            query("SELECT * FROM users WHERE email = 'c'", 5.0),
            query("SELECT * FROM users WHERE status = 1", 15.0),
            query("INSERT INTO users (email) VALUES ('x')", 50.0),
            query("SELECT 1", 50.0),
        ];

        let outcome = engine.analyze_detailed(&queries, &CatalogSnapshot::new());
        assert_eq!(outcome.suggestions.len(), 1);
        assert_eq!(columns(&outcome.suggestions[0]), vec!["email"]);
        assert_eq!(outcome.suggestions[0].avg_time_ms, 30.0);
        assert_eq!(
            outcome.stats,
            RunStats {
                received: 6,
                below_time_threshold: 1,
                parse_failures: 2,
                ignored: 0,
                analyzed: 3,
            }
        );
    }

    #[test]
    fn test_superset_coverage_any_order() {
        let catalog = CatalogSnapshot::new()
            .with_table("users", &["id", "email", "status"])
            .with_index("users", "users_status_email_idx", &["status", "email"]);
        let engine = SuggestionEngine::new();

        let outcome = engine.analyze_detailed(
            &[
                query("SELECT * FROM users WHERE email = 'a' AND status = 1", 2.0),
                query("SELECT * FROM users WHERE email = 'a'", 2.0),
            ],
            &catalog,
        );
        assert!(outcome.suggestions.is_empty());
        assert_eq!(outcome.covered.len(), 2);
        assert_eq!(outcome.covered[0].index_name, "users_status_email_idx");
        assert_eq!(outcome.covered[0].columns, strings(&["email", "status"]));

        assert!(!engine.is_index_needed("users", &strings(&["email", "status"]), &catalog));
        assert!(!engine.is_index_needed("users", &strings(&["EMAIL"]), &catalog));
        assert!(engine.is_index_needed("users", &strings(&["email", "id"]), &catalog));
    }

    #[test]
    fn test_leftmost_prefix_coverage() {
        let catalog = CatalogSnapshot::new()
            .with_table("users", &["id", "email", "status"])
            .with_index("users", "users_status_email_idx", &["status", "email"]);
        let engine = SuggestionEngine::with_config(SuggestionConfig {
            coverage: CoverageMode::LeftmostPrefix,
            ..SuggestionConfig::default()
        });

        let outcome = engine.analyze_detailed(
            &[
                query("SELECT * FROM users WHERE email = 'a'", 2.0),
                query("SELECT * FROM users WHERE status = 1", 2.0),
            ],
            &catalog,
        );
        let suggested: Vec<Vec<&str>> = outcome.suggestions.iter().map(columns).collect();
        assert!(suggested.contains(&vec!["email"]));
        assert!(!suggested.contains(&vec!["status"]));
        assert_eq!(outcome.covered[0].columns, strings(&["status"]));
    }

    #[test]
    fn test_covers() {
        let index = strings(&["a", "b", "c"]);
        assert!(covers(CoverageMode::Superset, &index, &strings(&["c", "a"])));
        assert!(!covers(CoverageMode::Superset, &index, &strings(&["d"])));
        assert!(covers(CoverageMode::LeftmostPrefix, &index, &strings(&["b", "a"])));
        assert!(!covers(CoverageMode::LeftmostPrefix, &index, &strings(&["a", "c"])));
        assert!(!covers(CoverageMode::LeftmostPrefix, &index, &strings(&["a", "b", "c", "d"])));
    }

    #[test]
    fn test_empty_column_set_needs_no_index() {
        let engine = SuggestionEngine::new();
        assert!(!engine.is_index_needed("users", &[], &CatalogSnapshot::new()));
        assert!(!engine.is_index_needed("users", &[], &FailingCatalog));
        assert!(engine.is_index_needed("users", &strings(&["email"]), &CatalogSnapshot::new()));
    }

    #[test]
    fn test_malformed_statements_are_skipped() {
        let malformed = [
            "SELECT * FROM users AS WHERE id = 1",
            "SELECT * FROM users AS LIMIT 1",
            "SELECT * FROM orders AS",
            "FROM t AS",
            "JOIN t AS",
            "WITH x AS (",
            "SELECT * FROM (SELECT id FROM users WHERE id = 1",
            "SELECT * FROM (((",
            ")) SELECT",
            "'",
            "SELECT * FROM '",
        ];
        let engine = SuggestionEngine::new();
        let queries: Vec<CapturedQuery> = std::iter::once(query("SELECT * FROM users WHERE email = 'a'", 4.0))
            .chain(malformed.iter().map(|sql| query(sql, 4.0)))
            .chain(std::iter::once(query("SELECT * FROM users AS offset WHERE status = 1", 4.0)))
            .collect();

        let outcome = engine.analyze_detailed(&queries, &CatalogSnapshot::new());
        assert_eq!(outcome.stats.received, queries.len());
        assert_eq!(outcome.stats.parse_failures, malformed.len());
        assert_eq!(outcome.stats.analyzed, 2);

        let suggested: Vec<Vec<&str>> = outcome.suggestions.iter().map(columns).collect();
        assert_eq!(suggested, vec![vec!["email"], vec!["status"]]);
    }

    #[test]
    fn test_catalog_failure_degrades() {
        let engine = SuggestionEngine::new();
        let suggestions = engine.analyze(&[query("SELECT * FROM users WHERE email = 'a'", 1.0)], &FailingCatalog);
        assert_eq!(suggestions.len(), 1);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let engine = SuggestionEngine::new();
        let catalog = CatalogSnapshot::new().with_index("orders", "orders_status_idx", &["status"]);
        let queries = vec![
            query("SELECT * FROM orders o JOIN customers c ON o.customer_id = c.id WHERE o.status = 'paid'", 9.0),
            query("SELECT * FROM orders WHERE status = 'open' ORDER BY placed_at", 3.0),
            query("UPDATE customers SET name = 'x' WHERE email = 'y'", 1.0),
            query("DELETE FROM sessions WHERE expires_at < NOW()", 7.0),
        ];

        let first = engine.analyze_detailed(&queries, &catalog);
        let second = engine.analyze_detailed(&queries, &catalog);
        assert_eq!(first.suggestions, second.suggestions);
        assert_eq!(first.covered, second.covered);
        assert_eq!(first.stats, second.stats);
    }
}

#[cfg(test)]
mod composite_tests {
    use super::*;

    #[test]
    fn test_top_three_columns() {
        let suggestions = vec![
            single("users", "email", 5, 10.0),
            single("users", "status", 3, 20.0),
            single("users", "created_at", 2, 1.0),
            single("users", "name", 4, 5.0),
            single("users", "nickname", 1, 1.0),
            single("orders", "user_id", 3, 1.0),
        ];

        let composites = CompositeIndexSynthesizer::new().synthesize(&suggestions);
        assert_eq!(composites.len(), 1);
        let composite = &composites[0];
        assert_eq!(composite.table, "users");
        assert_eq!(columns(composite), vec!["email", "name", "status"]);
        assert_eq!(composite.query_count, 12);
        assert_eq!(composite.avg_time_ms, (50.0 + 20.0 + 60.0) / 12.0);
        assert_eq!(composite.index_name, "users_email_name_status_idx");
        assert!(composite.composite);
    }

    #[test]
    fn test_members_need_two_queries() {
        let suggestions = vec![
            single("users", "email", 2, 1.0),
            single("users", "status", 1, 1.0),
            single("users", "name", 1, 1.0),
        ];
        assert!(CompositeIndexSynthesizer::new().synthesize(&suggestions).is_empty());
    }

    #[test]
    fn test_multi_column_suggestions_are_not_members() {
        let mut pair = single("users", "email", 9, 1.0);
        pair.columns.push("status".to_string());
        let suggestions = vec![pair, single("users", "name", 2, 1.0)];
        assert!(CompositeIndexSynthesizer::new().synthesize(&suggestions).is_empty());
    }

    #[test]
    fn test_never_more_than_three_columns() {
        let suggestions: Vec<Suggestion> = (0..8)
            .map(|i| single("events", &format!("c{}", i), 2 + i, 1.0))
            .collect();
        for composite in CompositeIndexSynthesizer::new().synthesize(&suggestions) {
            assert!(composite.columns.len() <= MAX_COMPOSITE_COLUMNS);
            assert_eq!(columns(&composite), vec!["c7", "c6", "c5"]);
        }
    }
}

#[cfg(test)]
mod impact_tests {
    use super::*;

    fn stats(row_count: u64, distinct_count: u64) -> ColumnStats {
        ColumnStats {
            size_bytes: 16384,
            row_count,
            distinct_count,
        }
    }

    #[test]
    fn test_classification() {
        let analyzer = ImpactAnalyzer::new();
        assert_eq!(analyzer.classify(99.5), ImpactClass::UniqueCandidate);
        assert_eq!(analyzer.classify(90.0), ImpactClass::Normal);
        assert_eq!(analyzer.classify(25.0), ImpactClass::Normal);
        assert_eq!(analyzer.classify(24.9), ImpactClass::LowCardinality);
        assert_eq!(ImpactAnalyzer::with_threshold(60.0).classify(50.0), ImpactClass::LowCardinality);
    }

    #[test]
    fn test_rows_per_column() {
        let catalog = CatalogSnapshot::new()
            .with_table("users", &["email", "status", "city"])
            .with_stats("users", "email", stats(200, 200))
            .with_stats("users", "status", stats(200, 3))
            .with_stats("users", "city", stats(200, 100));
        let mut pair = single("users", "email", 3, 1.0);
        pair.columns.push("city".to_string());
        let suggestions = vec![
            single("users", "email", 3, 1.0),
            single("users", "status", 2, 1.0),
            pair,
            single("users", "ghost", 1, 1.0),
        ];

        let rows = ImpactAnalyzer::new().analyze(&suggestions, &catalog);
        let classes: Vec<(&str, ImpactClass)> = rows.iter().map(|r| (r.column.as_str(), r.class)).collect();
        assert_eq!(
            classes,
            vec![
                ("email", ImpactClass::UniqueCandidate),
                ("status", ImpactClass::LowCardinality),
                ("city", ImpactClass::Normal),
                ("ghost", ImpactClass::AnalysisError),
            ]
        );
        assert_eq!(rows[0].cardinality, Some(100.0));
        assert_eq!(rows[2].stats.map(|s| s.size_bytes), Some(16384));
        assert!(rows[3].error.is_some());
        assert!(rows[3].cardinality.is_none());
        assert_eq!(rows[3].class.to_string(), "ANALYSIS ERROR");
    }

    #[test]
    fn test_empty_table_has_zero_cardinality() {
        let catalog = CatalogSnapshot::new().with_stats("logs", "level", stats(0, 0));
        let rows = ImpactAnalyzer::new().analyze(&[single("logs", "level", 1, 1.0)], &catalog);
        assert_eq!(rows[0].cardinality, Some(0.0));
        assert_eq!(rows[0].class, ImpactClass::LowCardinality);
    }
}
