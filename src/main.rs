use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trip_expenses::{db, generate_report, open_database, AnalyticsFacade, AppConfig};

#[derive(Parser)]
#[command(name = "trip-expenses", version, about = "Business trip expenses and analytics")]
struct Cli {
    /// SQLite database file (overrides configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema and show table sizes
    Init,

    /// Print every analytics metric as JSON
    Analytics,

    /// Render a report: REPORT_TYPE is text|json, DATA_TYPE a metric name or "all"
    Report {
        report_type: String,
        data_type: String,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so reports on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    config.validate()?;

    match cli.command {
        Command::Init => run_init(&config),
        Command::Analytics => run_analytics(&config),
        Command::Report {
            report_type,
            data_type,
            output,
        } => run_report(&config, &report_type, &data_type, output),
    }
}

fn run_init(config: &AppConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    let conn = open_database(&config.database.path)
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;
    println!("✓ Database ready: {}", config.database.path.display());

    for table in db::Table::ALL {
        println!("  {:<15} {}", table.as_str(), db::count_rows(&conn, table)?);
    }

    Ok(())
}

fn run_analytics(config: &AppConfig) -> Result<()> {
    let conn = open_database(&config.database.path)?;
    let bundle = AnalyticsFacade::new(&conn).get_all_analytics_data()?;

    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

fn run_report(
    config: &AppConfig,
    report_type: &str,
    data_type: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let conn = open_database(&config.database.path)?;
    let report = generate_report(&conn, report_type, data_type)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &report)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Report written to {}", path.display());
        }
        None => print!("{}", report),
    }

    Ok(())
}
