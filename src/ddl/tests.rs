use super::*;
use crate::catalog::{CatalogSnapshot, OpenSchema};
use crate::suggestion::impact::{ImpactClass, ImpactRow};
use crate::types::{QueryType, Suggestion};

fn suggestion(table: &str, columns: &[&str], query_count: u32) -> Suggestion {
    let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    Suggestion {
        table: table.to_string(),
        index_name: index_name(table, &columns),
        columns,
        query_count,
        avg_time_ms: 1.0,
        composite: false,
        join_related: false,
        query_type: Some(QueryType::Select),
    }
}

fn schema() -> CatalogSnapshot {
    CatalogSnapshot::new()
        .with_table("users", &["id", "email", "status", "created_at"])
        .with_table("orders", &["id", "user_id"])
}

#[cfg(test)]
mod naming_tests {
    use super::*;

    #[test]
    fn test_default_name() {
        let columns = vec!["email".to_string(), "status".to_string()];
        assert_eq!(index_name("users", &columns), "users_email_status_idx");
    }

    #[test]
    fn test_long_name_is_hashed() {
        let columns: Vec<String> = (0..6).map(|i| format!("a_rather_long_column_{}", i)).collect();
        let name = index_name("customer_subscription_events", &columns);

        let digest = format!("{:x}", md5::compute(columns.join("_").as_bytes()));
        assert_eq!(name, format!("customer_s_{}_idx", &digest[..15]));
        assert!(name.len() <= MAX_INDEX_NAME_LEN);
    }

    #[test]
    fn test_name_never_exceeds_limit() {
        for table_len in [1usize, 10, 30, 63, 64] {
            let table = "t".repeat(table_len);
            for column_count in 1..=10 {
                let columns: Vec<String> = (0..column_count).map(|i| format!("column_number_{}", i)).collect();
                let name = index_name(&table, &columns);
                assert!(name.chars().count() <= MAX_INDEX_NAME_LEN, "{} is too long", name);
                assert!(name.ends_with("_idx"));
            }
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }
}

#[cfg(test)]
mod builder_tests {
    use super::*;

    #[test]
    fn test_build_statement() {
        let builder = StatementBuilder::new();
        let sql = builder.build(&suggestion("users", &["email", "status"], 3), &schema());
        assert_eq!(
            sql.as_deref(),
            Some("ALTER TABLE `users` ADD INDEX `users_email_status_idx` (`email`,`status`);")
        );
    }

    #[test]
    fn test_missing_columns_are_dropped() {
        let builder = StatementBuilder::new();
        let sql = builder.build(&suggestion("users", &["email", "nickname"], 1), &schema());
        assert_eq!(
            sql.as_deref(),
            Some("ALTER TABLE `users` ADD INDEX `users_email_idx` (`email`);")
        );

        assert!(builder.build(&suggestion("users", &["nickname"], 1), &schema()).is_none());
        assert!(builder.build(&suggestion("ghosts", &["id"], 1), &schema()).is_none());
    }

    #[test]
    fn test_build_all_deduplicates() {
        let builder = StatementBuilder::new();
        let statements = builder.build_all(
            &[
                suggestion("users", &["email"], 5),
                suggestion("users", &["email", "nickname"], 2),
                suggestion("orders", &["user_id"], 1),
            ],
            &schema(),
        );

        let names: Vec<&str> = statements.iter().map(|s| s.index_name.as_str()).collect();
        assert_eq!(names, vec!["users_email_idx", "orders_user_id_idx"]);
    }

    #[test]
    fn test_supplied_name_is_rederived() {
        let mut oversized = suggestion("users", &["email", "status"], 3);
        oversized.index_name = "x".repeat(MAX_INDEX_NAME_LEN + 20);
        let statements = StatementBuilder::new().build_all(&[oversized], &schema());
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].index_name, "users_email_status_idx");
        assert!(statements[0].sql.contains("`users_email_status_idx`"));
    }

    #[test]
    fn test_open_schema_accepts_everything() {
        let builder = StatementBuilder::new();
        assert!(builder.build(&suggestion("anything", &["x"], 1), &OpenSchema).is_some());
    }
}

#[cfg(test)]
mod report_tests {
    use super::*;

    #[test]
    fn test_rank_is_stable() {
        let mut suggestions = vec![
            suggestion("users", &["email"], 2),
            suggestion("orders", &["user_id"], 7),
            suggestion("users", &["status"], 2),
        ];
        rank(&mut suggestions);
        let order: Vec<&str> = suggestions.iter().map(|s| s.columns[0].as_str()).collect();
        assert_eq!(order, vec!["user_id", "email", "status"]);
    }

    #[test]
    fn test_report_kinds() {
        let mut composite = suggestion("users", &["email", "status"], 4);
        composite.composite = true;
        let suggestions = vec![
            suggestion("users", &["email"], 3),
            suggestion("users", &["status"], 2),
            composite,
            suggestion("users", &["nickname"], 1),
        ];
        let impact = vec![ImpactRow {
            table: "users".to_string(),
            column: "email".to_string(),
            stats: None,
            cardinality: Some(99.0),
            class: ImpactClass::UniqueCandidate,
            error: None,
        }];

        let rows = build_report(&suggestions, &impact, &schema());
        let kinds: Vec<IndexKind> = rows.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![IndexKind::Unique, IndexKind::Normal, IndexKind::Composite, IndexKind::Normal]);
        assert_eq!(rows[0].usage_count, 3);
        assert!(rows[3].sql.is_none());

        let text = render_text(&rows);
        assert!(text.starts_with("Table"));
        assert!(text.contains("COMPOSITE"));
        assert_eq!(text.lines().count(), 2 + rows.len());
    }
}
