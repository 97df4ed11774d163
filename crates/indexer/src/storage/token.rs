//! Token metadata storage operations.

use super::{Storage, TokenMetadataRecord};
use anyhow::{Context, Result};
use sqlx::Row;
use tzmeta_core::MetadataStatus;

impl Storage {
    /// Insert or replace a token metadata record.
    ///
    /// A re-observed token (a later big-map update for the same identity)
    /// replaces the stored pointer data and restarts resolution.
    pub async fn save_token_metadata(&self, token: &TokenMetadataRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO token_metadata (
                network, contract, token_id,
                status, metadata, link, retry_count, update_id,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(network, contract, token_id)
            DO UPDATE SET
                status = excluded.status,
                metadata = excluded.metadata,
                link = excluded.link,
                retry_count = excluded.retry_count,
                update_id = excluded.update_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&token.network)
        .bind(&token.contract)
        .bind(token.token_id as i64)
        .bind(token.status.as_str())
        .bind(&token.metadata)
        .bind(&token.link)
        .bind(token.retry_count as i64)
        .bind(token.update_id as i64)
        .bind(token.created_at)
        .bind(token.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save token metadata")?;

        Ok(())
    }

    /// Apply one resolution attempt's outcome as an atomic partial update.
    ///
    /// Only `status`, `metadata`, `retry_count`, `update_id` (and the
    /// write timestamp) change; identity columns and `link` stay as
    /// stored. Fails loudly if the row does not exist.
    pub async fn update_token_metadata(&self, token: &TokenMetadataRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE token_metadata
            SET status = ?,
                metadata = ?,
                retry_count = ?,
                update_id = ?,
                updated_at = ?
            WHERE network = ? AND contract = ? AND token_id = ?
            "#,
        )
        .bind(token.status.as_str())
        .bind(&token.metadata)
        .bind(token.retry_count as i64)
        .bind(token.update_id as i64)
        .bind(chrono::Utc::now().timestamp())
        .bind(&token.network)
        .bind(&token.contract)
        .bind(token.token_id as i64)
        .execute(&self.pool)
        .await
        .context("Failed to update token metadata")?;

        if result.rows_affected() == 0 {
            anyhow::bail!(
                "No token metadata row for {}/{}/{}",
                token.network,
                token.contract,
                token.token_id
            );
        }

        Ok(())
    }

    /// Fetch one token metadata record by identity.
    pub async fn get_token_metadata(
        &self,
        network: &str,
        contract: &str,
        token_id: u64,
    ) -> Result<Option<TokenMetadataRecord>> {
        let row = sqlx::query(
            r#"
            SELECT network, contract, token_id,
                   status, metadata, link, retry_count, update_id,
                   created_at, updated_at
            FROM token_metadata
            WHERE network = ? AND contract = ? AND token_id = ?
            "#,
        )
        .bind(network)
        .bind(contract)
        .bind(token_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_token_record(row)?)),
            None => Ok(None),
        }
    }

    /// Fetch records awaiting resolution, oldest mutation first.
    pub async fn get_unresolved(&self, limit: u32) -> Result<Vec<TokenMetadataRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT network, contract, token_id,
                   status, metadata, link, retry_count, update_id,
                   created_at, updated_at
            FROM token_metadata
            WHERE status = 'new' AND link <> ''
            ORDER BY update_id ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch unresolved token metadata")?;

        rows.into_iter().map(Self::row_to_token_record).collect()
    }

    /// Highest update id stamped on any record (0 on a fresh database).
    ///
    /// Seeds the update-id counter at startup so the process-wide
    /// sequence stays strictly increasing across restarts.
    pub async fn max_update_id(&self) -> Result<u64> {
        let max: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(update_id), 0) FROM token_metadata")
                .fetch_one(&self.pool)
                .await
                .context("Failed to fetch max update id")?;

        Ok(max as u64)
    }

    /// Helper to convert a database row to a TokenMetadataRecord.
    fn row_to_token_record(row: sqlx::sqlite::SqliteRow) -> Result<TokenMetadataRecord> {
        let status: String = row.get("status");
        let status: MetadataStatus = status
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("Invalid status in token_metadata row")?;

        Ok(TokenMetadataRecord {
            network: row.get("network"),
            contract: row.get("contract"),
            token_id: row.get::<i64, _>("token_id") as u64,
            status,
            metadata: row.get("metadata"),
            link: row.get("link"),
            retry_count: row.get::<i64, _>("retry_count") as u32,
            update_id: row.get::<i64, _>("update_id") as u64,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}
