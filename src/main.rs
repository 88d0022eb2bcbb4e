//! Courier CLI entry point.
//!
//! Provides `start`, `status`, and `backup` subcommands for running the bot,
//! printing the persisted counters, or taking a one-shot backup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use courier::config::{self, Config, RuntimePaths};
use courier::engine::Engine;
use courier::maintenance::{self, MaintenanceSchedule};
use courier::store::{JsonStore, LogStore};

/// Courier — conversational message dispatch over Telegram.
#[derive(Parser)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Courier root directory (default `~/.courier`).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default `<root>/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot and maintenance tasks.
    Start,
    /// Print the persisted counters and latest health sample.
    Status,
    /// Take a one-shot backup of every collection.
    Backup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let root = match cli.root {
        Some(root) => root,
        None => config::config_dir()?,
    };
    let config_path = cli.config.unwrap_or_else(|| root.join("config.toml"));
    let config = config::load_or_default(&config_path)?;
    let paths = RuntimePaths::from_root(&root, &config.storage);

    match cli.command {
        Command::Start => handle_start(config, paths).await,
        Command::Status => handle_status(&config, &paths).await,
        Command::Backup => handle_backup(&config, &paths).await,
    }
}

async fn open_store(config: &Config, paths: &RuntimePaths) -> anyhow::Result<JsonStore> {
    JsonStore::open(
        &paths.data_dir,
        config.storage.transmission_log_cap,
        config.storage.health_log_cap,
    )
    .await
    .with_context(|| format!("failed to open store at {}", paths.data_dir.display()))
}

/// Run the bot until Ctrl+C.
async fn handle_start(config: Config, paths: RuntimePaths) -> anyhow::Result<()> {
    std::fs::create_dir_all(&paths.root)
        .with_context(|| format!("failed to create {}", paths.root.display()))?;

    let _logging_guard = courier::logging::init_production(&paths.logs_dir, config.logging.verbose)?;

    if paths.env_file.exists() {
        if let Err(e) = dotenvy::from_path(&paths.env_file) {
            warn!(path = %paths.env_file.display(), error = %e, "failed to load .env");
        }
    } else {
        dotenvy::dotenv().ok();
    }

    let token = match config::bot_token(&config.telegram) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn LogStore> = Arc::new(open_store(&config, &paths).await?);

    let (notices_tx, notices_rx) = mpsc::channel(64);
    let engine = Arc::new(Engine::from_config(&config, Arc::clone(&store)).with_notices(notices_tx));
    engine.restore_stats().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let schedule = MaintenanceSchedule::from_config(
        &config,
        paths.health_json.clone(),
        paths.backups_dir.clone(),
    );
    let maintenance_handle = tokio::spawn(maintenance::run_maintenance(
        Arc::clone(&engine),
        schedule,
        shutdown_rx,
    ));

    info!(
        root = %paths.root.display(),
        data = %paths.data_dir.display(),
        "courier started"
    );

    let config = Arc::new(config);
    let result = courier::telegram::run_telegram(&token, config, engine, notices_rx).await;

    if shutdown_tx.send(true).is_err() {
        debug!("maintenance already stopped before shutdown signal");
    }
    if let Err(e) = maintenance_handle.await {
        warn!(error = %e, "maintenance task ended abnormally");
    }
    info!("courier stopped");
    result
}

/// Print the persisted counters.
async fn handle_status(config: &Config, paths: &RuntimePaths) -> anyhow::Result<()> {
    courier::logging::init_cli(config.logging.verbose);

    let store = open_store(config, paths).await?;
    match store.load_stats().await {
        Some(stats) => {
            let rate = stats
                .success_rate()
                .map_or_else(|| "n/a".to_owned(), |r| format!("{r:.1}%"));
            println!("total:        {}", stats.total);
            println!("successful:   {}", stats.successful);
            println!("failed:       {}", stats.failed);
            println!("success rate: {rate}");
            println!("since:        {}", stats.start_time.to_rfc3339());
        }
        None => println!("no transmissions recorded"),
    }
    println!("logged:       {}", store.transmission_count().await);
    println!("users:        {}", store.users().await.len());
    println!("scheduled:    {}", store.scheduled().await.len());

    match maintenance::health::read_health_file(&paths.health_json).await {
        Ok(sample) => println!(
            "health:       {} at {} (uptime {}s)",
            sample.status,
            sample.timestamp.to_rfc3339(),
            sample.uptime_secs
        ),
        Err(_) => println!("health:       no sample yet"),
    }
    Ok(())
}

/// Take a one-shot backup.
async fn handle_backup(config: &Config, paths: &RuntimePaths) -> anyhow::Result<()> {
    courier::logging::init_cli(config.logging.verbose);

    let store = open_store(config, paths).await?;
    let result = maintenance::backup::create_backup(&store, &paths.backups_dir).await?;
    println!(
        "backup written to {} ({} bytes)",
        result.backup_dir.display(),
        result.total_size_bytes
    );
    Ok(())
}
