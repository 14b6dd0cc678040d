use anyhow::Context;
use clap::Parser;
use docsync::{
    CollectionOutcome, FileCheckpointStore, HttpDocumentStore, SyncConfig, SyncEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(about = "Incrementally sync remote document collections into local snapshots", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "docsync.json")]
    config: PathBuf,

    /// Checkpoint directory (overrides the config file)
    #[arg(long)]
    checkpoint_dir: Option<String>,

    /// Document store base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Document store secret (overrides the config file)
    #[arg(long)]
    secret: Option<String>,

    /// Directory to write emitted snapshots to, one JSON file per collection
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Delay before retrying a failed collection (e.g. "500ms", "2s")
    #[arg(long, value_parser = humantime::parse_duration)]
    retry_delay: Option<Duration>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("docsync={}", log_level))
        .init();

    let mut config = SyncConfig::from_file(&args.config)?;
    if let Some(dir) = args.checkpoint_dir {
        config.checkpoint_dir = dir;
    }
    if let Some(url) = args.base_url {
        config.base_url = url;
    }
    if args.secret.is_some() {
        config.secret = args.secret;
    }
    if let Some(delay) = args.retry_delay {
        config.retry_delay_ms = delay.as_millis() as u64;
    }
    config.validate()?;

    info!("🚀 Docsync");
    info!("Store: {}", config.base_url);
    info!("Checkpoints: {}", config.checkpoint_dir);
    info!(
        "Collections: {:?}",
        config.collections.iter().map(|c| &c.name).collect::<Vec<_>>()
    );

    let progress = indicatif::ProgressBar::new(config.collections.len() as u64);
    progress.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed")
            .context("invalid progress template")?
            .progress_chars("█▓▒░ "),
    );

    let store = Arc::new(HttpDocumentStore::new(&config)?);
    let checkpoints = Arc::new(FileCheckpointStore::new(&config.checkpoint_dir));
    let collections = config.collections.clone();
    let engine = SyncEngine::new(store, checkpoints, config).with_progress(progress);

    let report = engine.sync(&collections).await?;

    for entry in &report.collections {
        match &entry.outcome {
            CollectionOutcome::Synced {
                mode,
                snapshot,
                checkpoint_written,
            } => {
                info!(
                    "✅ {}: {} documents ({:?} fetch, watermark {:?}, checkpoint {})",
                    entry.collection,
                    snapshot.len(),
                    mode,
                    snapshot.watermark,
                    if *checkpoint_written { "updated" } else { "kept" }
                );
                if let Some(dir) = &args.output {
                    snapshot.write_to(dir).await?;
                }
            }
            CollectionOutcome::Failed { error: e, stale } => {
                error!("❌ {}: {}", entry.collection, e);
                if let (Some(dir), Some(stale)) = (&args.output, stale) {
                    stale.write_to(dir).await?;
                }
            }
        }
    }

    if !report.is_success() {
        error!("{} collection(s) failed to sync", report.failures().len());
        std::process::exit(2);
    }
    info!("✅ Sync completed successfully!");
    Ok(())
}
