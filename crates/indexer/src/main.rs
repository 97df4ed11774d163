//! tzmeta Indexer - token metadata ingestion and resolution
//!
//! This binary provides:
//! - Big-map update polling from TzKT (`token_metadata` paths)
//! - Token metadata record storage in SQLite
//! - Off-chain link resolution with bounded retries

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use tzmeta_core::UpdateIdCounter;
use tzmeta_indexer::config::Config;
use tzmeta_indexer::listener::{SyncEngine, TzktClient};
use tzmeta_indexer::metrics::Metrics;
use tzmeta_indexer::resolver::LinkResolver;
use tzmeta_indexer::storage::Storage;
use tzmeta_indexer::worker::{MetadataWorker, ResolutionService};

#[derive(Parser)]
#[command(name = "tzmeta-indexer")]
#[command(version, about = "Token metadata indexer for Tezos networks", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tzmeta.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer service (sync + resolution)
    Run,

    /// Show indexer status and sync progress
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://tzmeta.db")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug)?;

    info!("tzmeta indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_indexer(&cli.config).await?,
        Commands::Status => show_status(&cli.config).await?,
        Commands::InitDb { database_url } => init_database(&database_url).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("tzmeta_indexer=debug,tzmeta_core=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tzmeta_indexer=info,tzmeta_core=info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .init();

    Ok(())
}

/// Main indexer service - runs update sync and link resolution
async fn run_indexer(config_path: &str) -> Result<()> {
    info!("Starting indexer service with config: {}", config_path);

    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Network: {}", config.network.name);
    info!("  TzKT URL: {}", config.network.tzkt_url);
    info!("  Database: {}", config.database.url);

    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    info!("Database initialized");

    // Bind the cursor to this network on a fresh database.
    let sync_state = storage.get_sync_state().await?;
    if sync_state.network.is_empty() {
        info!(
            "Fresh database detected, initializing sync state for network {}",
            config.network.name
        );
        storage
            .initialize_sync_state(&config.network.name, 0)
            .await
            .context("Failed to initialize sync state")?;
    } else if sync_state.network != config.network.name {
        anyhow::bail!(
            "Database belongs to network '{}' but config says '{}'",
            sync_state.network,
            config.network.name
        );
    } else {
        info!(
            "Existing sync state found: network={} last_update_id={}",
            sync_state.network, sync_state.last_update_id
        );
    }

    // Seed the update-id sequence past everything already stored.
    let max_update_id = storage.max_update_id().await?;
    let update_ids = Arc::new(UpdateIdCounter::starting_at(max_update_id));
    info!("Update-id sequence resumes after {}", max_update_id);

    let metrics = Arc::new(Metrics::new());

    let resolver = LinkResolver::new(&config.resolver, &config.network.tzkt_url)
        .context("Failed to create link resolver")?;

    let worker = Arc::new(MetadataWorker::new(
        &config.network.name,
        storage.clone(),
        resolver,
        Arc::clone(&metrics),
        update_ids,
        &config.resolver,
    ));

    let tzkt = TzktClient::new(
        &config.network.tzkt_url,
        std::time::Duration::from_secs(config.resolver.request_timeout_secs),
    )
    .context("Failed to create TzKT client")?;

    let sync_engine = SyncEngine::new(
        tzkt,
        storage.clone(),
        Arc::clone(&worker),
        config.sync.clone(),
    );
    let sync_handle = tokio::spawn(async move { sync_engine.run().await });

    info!("Sync engine started");

    let resolution_service = ResolutionService::new(worker, storage.clone(), &config.resolver);
    let resolution_handle = tokio::spawn(async move { resolution_service.run().await });

    info!(
        "Resolution service started (interval: {}s)",
        config.resolver.resolve_interval_secs
    );

    info!("Indexer is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = sync_handle => {
            storage.close().await;
            match result {
                Ok(Ok(())) => {
                    warn!("Sync engine exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Sync engine failed"),
                Err(e) => Err(anyhow::anyhow!("Sync task panicked: {}", e)),
            }
        }
        result = resolution_handle => {
            storage.close().await;
            match result {
                Ok(Ok(())) => {
                    warn!("Resolution service exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Resolution service failed"),
                Err(e) => Err(anyhow::anyhow!("Resolution task panicked: {}", e)),
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            storage.close().await;
            Ok(())
        }
    }
}

/// Show indexer status and sync progress
async fn show_status(config_path: &str) -> Result<()> {
    info!("Checking indexer status");

    // Fall back to the default database only when the config file is absent.
    let (database_url, max_conn, min_conn) = match Config::from_file(config_path) {
        Ok(config) => {
            info!("Using database from config: {}", config.database.url);
            (
                config.database.url,
                Some(config.database.max_connections),
                Some(config.database.min_connections),
            )
        }
        Err(e) => {
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
            });

            if is_not_found {
                info!("Config file not found, using default database: sqlite://tzmeta.db");
                ("sqlite://tzmeta.db".to_string(), None, None)
            } else {
                return Err(e).context("Failed to load config file");
            }
        }
    };

    let storage = Storage::new(&database_url, max_conn, min_conn)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let sync_state = storage.get_sync_state().await?;
    let stats = storage.stats().await?;

    println!("\n=== tzmeta Indexer Status ===\n");
    println!("Sync Progress:");
    println!("  Network: {}", sync_state.network);
    println!("  Last Update Id: {}", sync_state.last_update_id);
    println!(
        "  Last Updated: {}",
        chrono::DateTime::from_timestamp(sync_state.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nToken Metadata:");
    println!("  Total Records: {}", stats.token_count);
    println!("  Pending (new): {}", stats.new_count);
    println!("  Applied: {}", stats.applied_count);
    println!("  Failed: {}", stats.failed_count);

    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Records: {}", stats.token_count);
    info!("  Last update id: {}", stats.last_update_id);

    storage.close().await;

    Ok(())
}
