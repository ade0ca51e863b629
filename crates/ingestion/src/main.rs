//! ReceiptBox batch importer
//!
//! Imports a directory of receipt photos:
//! 1. Picks up every image file in the directory
//! 2. Stores it and runs OCR + LLM extraction
//! 3. Persists the receipt and its items
//! 4. Prints a summary of imported, failed and skipped files

mod errors;
mod processor;

use anyhow::Context as _;
use clap::Parser;
use processor::{ImportSummary, ReceiptImporter};
use receiptbox_common::{
    config::{AppConfig, ObservabilityConfig},
    db::DbPool,
    extraction::ReceiptExtractor,
    llm::create_chat_client,
    ocr::create_ocr_provider,
    services::ReceiptService,
    storage::create_storage,
    Repository, VERSION,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Import receipt images into ReceiptBox
#[derive(Parser, Debug)]
#[command(name = "ingestion", version, about, long_about = None)]
struct Args {
    /// Directory containing receipt images
    #[arg(short, long)]
    dir: PathBuf,

    /// Configuration file (defaults to config/default + APP__ environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load configuration
    let mut config = match args.config {
        Some(ref path) => AppConfig::from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(url) = args.database_url {
        config.database.url = url;
    }

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting ReceiptBox importer v{}", VERSION);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    db.migrate().await?;

    let extractor = ReceiptExtractor::new(
        create_ocr_provider(&config.ocr)?,
        create_chat_client(&config.llm)?,
    );
    let receipts = ReceiptService::new(
        Repository::new(db),
        create_storage(&config.storage),
        extractor,
        config.server.max_upload_bytes,
    );

    let summary = ReceiptImporter::new(receipts)
        .import_directory(&args.dir)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if !summary.failed.is_empty() {
        anyhow::bail!(
            "{} of {} receipts failed to import",
            summary.failed.len(),
            summary.failed.len() + summary.imported.len()
        );
    }

    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_summary(summary: &ImportSummary) {
    for receipt in &summary.imported {
        println!(
            "imported  {}  {} ({} items)  id={}",
            receipt.file, receipt.store_name, receipt.items, receipt.receipt_id
        );
    }
    for failure in &summary.failed {
        println!("failed    {}  {}", failure.file, failure.error);
    }
    for file in &summary.skipped {
        println!("skipped   {}", file);
    }

    println!(
        "\n{} imported, {} failed, {} skipped",
        summary.imported.len(),
        summary.failed.len(),
        summary.skipped.len()
    );
}
