use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dealsync_sync::{run_sync, RunMode, SyncConfig, SyncRunSummary, SyncSettings};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "dealsync")]
#[command(about = "Mirror HubSpot deals into a Notion project database")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile the destination with the current deals.
    Sync(SyncArgs),
    /// Read both sides and report what a sync would do, writing nothing.
    Plan(CommonArgs),
}

#[derive(Debug, Default, Args)]
struct CommonArgs {
    /// YAML file with the column layout and batching settings.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Read deals from a JSON fixture instead of HubSpot.
    #[arg(long)]
    source_fixture: Option<PathBuf>,
    /// Load environment variables from this file instead of `./.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Log destination writes instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn load_env(env_file: Option<&PathBuf>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("loading env file {}", path.display()))?;
        }
        None => allow_missing(dotenvy::dotenv()).context("loading .env")?,
    }
    Ok(())
}

/// `./.env` is optional, but one that exists must parse.
fn allow_missing<T>(result: Result<T, dotenvy::Error>) -> Result<(), dotenvy::Error> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err),
    }
}

fn load_config(args: &CommonArgs) -> Result<SyncConfig> {
    load_env(args.env_file.as_ref())?;
    let settings = match &args.settings {
        Some(path) => SyncSettings::load(path)?,
        None => SyncSettings::default(),
    };
    SyncConfig::from_env(settings).context("reading configuration from the environment")
}

fn print_summary(summary: &SyncRunSummary, json: bool, dry_run: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    let prefix = if dry_run { "dry run complete" } else { "sync complete" };
    println!(
        "{prefix}: run_id={} source={} records={} rows={} schema_updated={} archived={} collisions={} updated={} created={} skipped_writes={}",
        summary.run_id,
        summary.source,
        summary.source_records,
        summary.destination_rows,
        summary.schema_updated,
        summary.archived.len(),
        summary.collisions.len(),
        summary.updates.written,
        summary.creates.written,
        summary.skipped_writes,
    );
    Ok(())
}

async fn execute(common: CommonArgs, dry_run: bool) -> Result<()> {
    let config = load_config(&common)?;
    info!(?config, dry_run, "starting sync");
    let mode = RunMode {
        dry_run,
        source_fixture: common.source_fixture.clone(),
    };
    let summary = run_sync(&config, &mode).await.context("sync run failed")?;
    print_summary(&summary, common.json, dry_run)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => execute(args.common, args.dry_run).await,
        Commands::Plan(common) => execute(common, true).await,
    }
}
