use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use index_advisor::advisor::{AdvisorReport, Catalogs, IndexAdvisor};
use index_advisor::apply::{apply_statements, ScriptWriter};
use index_advisor::catalog::{CatalogSnapshot, OpenSchema, SchemaCatalog, TableStatsProvider};
use index_advisor::config::AdvisorConfig;
use index_advisor::ddl::render_text;
use index_advisor::monitoring::{MonitoringConfig, MonitoringSystem};
use index_advisor::query_log::read_log_monitored;
use index_advisor::query_parser::parse;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "index-advisor")]
#[command(about = "Recommends missing indexes from a log of executed SQL statements")]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Suggest indexes from a captured query log
    index-advisor analyze -q queries.jsonl

    # Check suggestions against a catalog snapshot and export the statements
    index-advisor analyze -q queries.jsonl -c catalog.json --composite --impact --sql indexes.sql

    # Show how a single statement is attributed to tables
    index-advisor parse \"SELECT * FROM orders o JOIN customers c ON o.customer_id = c.id\"")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Set log level explicitly
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a captured query log and suggest indexes
    Analyze {
        /// Query log (JSON lines or a JSON array)
        #[arg(short, long, value_name = "FILE")]
        queries: PathBuf,

        /// Catalog snapshot with tables, indexes and column statistics
        #[arg(short, long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Advisor configuration file (JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Table that never receives suggestions (repeatable)
        #[arg(long, value_name = "TABLE")]
        ignore_table: Vec<String>,

        /// Skip queries faster than this many milliseconds
        #[arg(long, value_name = "MS")]
        min_query_time: Option<f64>,

        /// Drop access patterns seen fewer times than this
        #[arg(long, value_name = "N")]
        min_query_count: Option<u32>,

        /// Synthesize composite indexes from frequent single-column suggestions
        #[arg(long)]
        composite: bool,

        /// Classify suggested columns by cardinality (needs --catalog)
        #[arg(long)]
        impact: bool,

        /// Cardinality percentage below which a column is flagged
        #[arg(long, value_name = "PERCENT")]
        cardinality_threshold: Option<f64>,

        /// Output format for the report
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Write the generated statements to this SQL file
        #[arg(long, value_name = "FILE")]
        sql: Option<PathBuf>,

        /// Report what would be written without writing the SQL file
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse one SQL statement and print its structure as JSON
    Parse {
        /// Statement to parse
        sql: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

/// Options of the analyze command
struct AnalyzeArgs {
    queries: PathBuf,
    catalog: Option<PathBuf>,
    config: AdvisorConfig,
    format: OutputFormat,
    sql: Option<PathBuf>,
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    info!("Starting index-advisor v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze {
            queries,
            catalog,
            config,
            ignore_table,
            min_query_time,
            min_query_count,
            composite,
            impact,
            cardinality_threshold,
            format,
            sql,
            dry_run,
        } => {
            let mut advisor_config = match &config {
                Some(path) => AdvisorConfig::from_file(path)
                    .with_context(|| format!("failed to load configuration from {}", path.display()))?,
                None => AdvisorConfig::default(),
            };

            advisor_config.suggestions.ignore_tables.extend(ignore_table);
            if let Some(ms) = min_query_time {
                advisor_config.suggestions.min_query_time_ms = ms;
            }
            if let Some(count) = min_query_count {
                advisor_config.suggestions.min_query_count = count;
            }
            if composite {
                advisor_config.composite.enabled = true;
            }
            if impact {
                advisor_config.impact.enabled = true;
            }
            if let Some(threshold) = cardinality_threshold {
                advisor_config.impact.cardinality_threshold = threshold;
            }
            advisor_config.validate()?;

            execute_analyze(AnalyzeArgs {
                queries,
                catalog,
                config: advisor_config,
                format,
                sql,
                dry_run,
            })
            .await?;
        }
        Commands::Parse { sql } => {
            let shape = parse(&sql).context("statement could not be parsed")?;
            println!("{}", serde_json::to_string_pretty(&shape)?);
        }
    }

    Ok(())
}

async fn execute_analyze(args: AnalyzeArgs) -> Result<()> {
    let monitoring = MonitoringSystem::new(MonitoringConfig::default());

    let queries = read_log_monitored(&args.queries, &args.config.capture, &monitoring)
        .await
        .with_context(|| format!("failed to read {}", args.queries.display()))?;

    let snapshot = match &args.catalog {
        Some(path) => CatalogSnapshot::from_file(path)
            .with_context(|| format!("failed to load catalog from {}", path.display()))?,
        None => CatalogSnapshot::new(),
    };
    let schema: &dyn SchemaCatalog = if args.catalog.is_some() { &snapshot } else { &OpenSchema };
    let stats: Option<&dyn TableStatsProvider> = if args.catalog.is_some() { Some(&snapshot) } else { None };
    let catalogs = Catalogs {
        indexes: &snapshot,
        schema,
        stats,
    };

    let advisor = IndexAdvisor::with_monitoring(args.config, monitoring.clone());
    let report = advisor.run(&queries, catalogs);

    match args.format {
        OutputFormat::Text => print_text_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(path) = &args.sql {
        let mut writer = ScriptWriter::new(Vec::new());
        let outcome = apply_statements(&mut writer, &report.statements, args.dry_run, Some(&*monitoring));
        if args.dry_run {
            info!(statements = outcome.skipped, path = %path.display(), "Dry run, SQL file not written");
        } else {
            tokio::fs::write(path, writer.into_inner())
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(statements = outcome.applied, path = %path.display(), "SQL statements written");
        }
    }

    let stats = monitoring.system_stats();
    info!(
        operations = stats.completed_operations,
        avg_duration_ms = stats.avg_duration_ms,
        "Analysis finished"
    );
    Ok(())
}

fn print_text_report(report: &AdvisorReport) {
    if report.rows.is_empty() {
        println!("No missing indexes found ({} queries analyzed).", report.stats.analyzed);
    } else {
        print!("{}", render_text(&report.rows));
    }

    if !report.covered.is_empty() {
        println!();
        println!("Already covered by existing indexes:");
        for pattern in &report.covered {
            println!(
                "  {}({}) by {} [{} queries]",
                pattern.table,
                pattern.columns.join(", "),
                pattern.index_name,
                pattern.query_count
            );
        }
    }

    if !report.impact.is_empty() {
        println!();
        println!("Column impact:");
        for row in &report.impact {
            match row.cardinality {
                Some(cardinality) => println!("  {}.{}: {:.1}% {}", row.table, row.column, cardinality, row.class),
                None => println!(
                    "  {}.{}: {} ({})",
                    row.table,
                    row.column,
                    row.class,
                    row.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }
}

/// Initialize logging based on CLI configuration
fn initialize_logging(cli: &Cli) -> Result<()> {
    let log_level: Level = if let Some(level) = &cli.log_level {
        level.clone().into()
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));

    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(cli.verbose)
            .with_line_number(cli.verbose)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(cli.verbose)
            .with_line_number(cli.verbose)
            .init();
    }

    Ok(())
}
