//! Parser CLI - Runs the workbook pipeline on a file from disk
//!
//! Processes every sheet of a departure or base workbook, persists the
//! analyses (or keeps them in memory with --dry-run) and prints one line per
//! sheet with its doc id or error.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use airlink_parser::store::connect_store;
use airlink_parser::{
    process_workbook, telemetry, Config, DocumentStore, FileType, MemoryDocumentStore, Persister,
    ProcessingRun, SheetOutcome, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Processes airport-operations workbooks into stored analyses")]
struct Args {
    /// Workbook to process (.xlsx / .xls)
    #[arg(long)]
    file: PathBuf,

    /// Which layout the workbook follows
    #[arg(long, value_enum, default_value_t = FileType::Departure)]
    file_type: FileType,

    /// Dry run - keep results in memory instead of the database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init("info");
    let args = Args::parse();

    println!("=== Airlink Parser ===");
    println!("File: {}", args.file.display());
    println!("Type: {}", args.file_type);
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let bytes = fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let store: Arc<dyn DocumentStore> = if args.dry_run {
        Arc::new(MemoryDocumentStore::new())
    } else {
        let config = Config::from_env().context("Invalid configuration")?;
        connect_store(&config)
            .await
            .context("Failed to connect to document store")?
    };
    let retry = Config::retry_from_env().context("Invalid retry settings")?;
    let persister = Persister::new(store, retry);

    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let run = ProcessingRun::start(&SystemClock);

    let report = process_workbook(&bytes, args.file_type, &filename, &run, &persister)
        .await
        .context("Workbook processing failed")?;

    println!();
    for (sheet, outcome) in &report.sheets {
        match outcome {
            SheetOutcome::Processed(sheet_report) => println!(
                "  ✓ {:<24} {} ({} columns)",
                sheet,
                sheet_report.doc_id,
                sheet_report.columns.len()
            ),
            SheetOutcome::Failed { error } => println!("  ✗ {:<24} {}", sheet, error),
        }
    }

    if let Some(doc_id) = report.first_doc_id() {
        println!("\nFirst doc id: {}", doc_id);
    }
    if report.has_errors() {
        anyhow::bail!("One or more sheets failed to process");
    }

    println!("\n✓ Done");
    Ok(())
}
