//! Storage layer for the tzmeta indexer.
//!
//! This module provides database operations for:
//! - Token metadata records (upsert + atomic partial updates)
//! - Sync state (big-map update cursor tracking)

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod sync;
pub mod token;
pub mod types;

pub use types::*;

/// Database storage for the indexer.
///
/// Provides async access to SQLite with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// Creates the database file if it doesn't exist; call
    /// [`run_migrations`](Self::run_migrations) before first use.
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance backed by a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let token_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token_metadata")
            .fetch_one(&self.pool)
            .await?;

        let new_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM token_metadata WHERE status = 'new'")
                .fetch_one(&self.pool)
                .await?;

        let applied_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM token_metadata WHERE status = 'applied'")
                .fetch_one(&self.pool)
                .await?;

        let failed_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM token_metadata WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;

        let sync_state = self.get_sync_state().await?;

        Ok(DatabaseStats {
            token_count: token_count as u64,
            new_count: new_count as u64,
            applied_count: applied_count as u64,
            failed_count: failed_count as u64,
            last_update_id: sync_state.last_update_id,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of token metadata records
    pub token_count: u64,

    /// Records awaiting resolution
    pub new_count: u64,

    /// Records resolved successfully
    pub applied_count: u64,

    /// Records failed permanently
    pub failed_count: u64,

    /// Last processed big-map update id
    pub last_update_id: u64,
}
