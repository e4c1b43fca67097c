//! amelia-import - CLI tool to load a table export into the database
//!
//! Reads a JSON export of the backend tables and upserts every row into the
//! local amelia database. Importing the same file twice is a no-op.

use amelia_core::ingest::import_file;
use amelia_core::{Config, Database};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "amelia-import")]
#[command(about = "Import a JSON table export into the amelia database")]
#[command(version)]
struct Args {
    /// Export file to import
    file: PathBuf,

    /// Exit with an error if any row failed to import
    #[arg(long)]
    strict: bool,

    /// Print every row error instead of the first few
    #[arg(short, long)]
    verbose: bool,
}

/// Row errors shown without --verbose
const SHOWN_ERRORS: usize = 5;

const TABLES: [&str; 8] = [
    "profiles",
    "insight_types",
    "conversations",
    "messages",
    "conversation_insights",
    "patient_context",
    "therapist_patient_assignments",
    "conversation_config",
];

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        amelia_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(file = %args.file.display(), "amelia-import starting");

    let db_path = config.database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    println!("Database: {}", db_path.display());

    let result = import_file(&db, &args.file)
        .with_context(|| format!("failed to import {}", args.file.display()))?;

    println!("\nImport complete:");
    for table in TABLES {
        let count = result.count(table);
        if count > 0 {
            println!("  {:<31} {}", format!("{}:", table), count);
        }
    }
    println!("  {:<31} {}", "Total rows:", result.total());

    if !result.errors.is_empty() {
        println!("\n{} row(s) failed:", result.errors.len());
        let shown = if args.verbose {
            result.errors.len()
        } else {
            SHOWN_ERRORS
        };
        for error in result.errors.iter().take(shown) {
            println!("  - {}", error);
        }
        if result.errors.len() > shown {
            println!("  ... {} more (use --verbose)", result.errors.len() - shown);
        }

        if args.strict {
            anyhow::bail!("{} row(s) failed to import", result.errors.len());
        }
    }

    Ok(())
}
