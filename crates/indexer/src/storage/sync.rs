//! Sync state storage operations.

use super::{Storage, SyncState};
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Get the current sync cursor.
    pub async fn get_sync_state(&self) -> Result<SyncState> {
        let row = sqlx::query(
            r#"
            SELECT network, last_update_id, updated_at
            FROM sync_state
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch sync state")?;

        Ok(SyncState {
            network: row.get("network"),
            last_update_id: row.get::<i64, _>("last_update_id") as u64,
            updated_at: row.get("updated_at"),
        })
    }

    /// Advance the sync cursor past the given big-map update id.
    pub async fn update_sync_state(&self, last_update_id: u64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_update_id = ?,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(last_update_id as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to update sync state")?;

        Ok(())
    }

    /// Initialize the sync cursor for a network on a fresh database.
    pub async fn initialize_sync_state(&self, network: &str, start_update_id: u64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_state
            SET network = ?,
                last_update_id = ?,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(network)
        .bind(start_update_id as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to initialize sync state")?;

        Ok(())
    }
}
