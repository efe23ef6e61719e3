//! shopsync - Shopware to MailBluster synchronisation service
//!
//! # Usage
//!
//! ```bash
//! # Run all enabled streams
//! shopsync -c shopsync.yaml
//!
//! # Validate configuration
//! shopsync -c shopsync.yaml validate
//!
//! # Print the JSON schema of the configuration file
//! shopsync schema
//!
//! # Show the persisted cursor of each stream
//! shopsync -c shopsync.yaml cursor
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shopsync::config::SyncConfig;
use shopsync::sync_service::{self, SyncService};

#[derive(Parser)]
#[command(name = "shopsync")]
#[command(version, about = "Streams Shopware orders and customers into MailBluster")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shopsync.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all enabled streams (default)
    Run,
    /// Validate configuration file
    Validate,
    /// Print the JSON schema of the configuration file
    Schema,
    /// Show the persisted cursor of each stream
    Cursor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't need config
    if let Some(Commands::Schema) = &cli.command {
        let schema = serde_json::to_string_pretty(&SyncConfig::json_schema())?;
        println!("{}", schema);
        return Ok(());
    }

    let config = SyncConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    init_logging(cli.verbose, &config.settings.log_level);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Validate => validate_config(&config),
        Commands::Cursor => show_cursors(&config).await,
        Commands::Schema => unreachable!(), // handled above
    }
}

fn init_logging(verbose: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn run(config: SyncConfig) -> Result<()> {
    let service = SyncService::from_config(&config).context("Failed to set up streams")?;
    let cancel = CancellationToken::new();

    let mut task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { service.run(cancel).await })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        result = &mut task => {
            return result.context("sync task panicked")?.map_err(Into::into);
        }
    }

    info!("Initiating graceful shutdown...");
    cancel.cancel();

    let shutdown_timeout = Duration::from_secs(10);
    match tokio::time::timeout(shutdown_timeout, task).await {
        Ok(result) => result.context("sync task panicked")??,
        Err(_) => warn!("Shutdown timeout reached, some streams may not have stopped cleanly"),
    }

    info!("Shutdown complete");
    Ok(())
}

fn validate_config(config: &SyncConfig) -> Result<()> {
    println!("Configuration is valid");
    println!("  Shopware:    {}", config.shopware.base_url);
    println!(
        "  MailBluster: {} ({} requests per {} ms)",
        config.mailbluster.base_url,
        config.mailbluster.requests_per_minute,
        config.mailbluster.rate_limit_period_ms
    );
    for (name, stream) in [
        ("orders", &config.streams.orders),
        ("customers", &config.streams.customers),
    ] {
        let state = if stream.enabled { "enabled" } else { "disabled" };
        println!("  Stream {:<10} {}", name, state);
    }
    println!("  State dir:   {}", config.settings.state_dir.display());
    Ok(())
}

async fn show_cursors(config: &SyncConfig) -> Result<()> {
    for (name, path, cursor) in sync_service::stored_cursors(&config.settings.state_dir).await {
        match cursor {
            Some(cursor) if cursor.is_empty() => {
                println!("{:<10} (unset)  {}", name, path.display())
            }
            Some(cursor) => println!("{:<10} {}  {}", name, cursor, path.display()),
            None => println!("{:<10} (none)   {}", name, path.display()),
        }
    }
    Ok(())
}
