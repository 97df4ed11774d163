//! Sync engine for big-map update ingestion.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::TzktClient;
use crate::config::SyncConfig;
use crate::resolver::Resolver;
use crate::storage::Storage;
use crate::worker::MetadataWorker;

/// Sync engine that polls TzKT and ingests new big-map updates.
pub struct SyncEngine<R> {
    client: TzktClient,
    storage: Storage,
    worker: Arc<MetadataWorker<R>>,
    config: SyncConfig,
}

impl<R: Resolver> SyncEngine<R> {
    /// Create a new sync engine.
    pub fn new(
        client: TzktClient,
        storage: Storage,
        worker: Arc<MetadataWorker<R>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            storage,
            worker,
            config,
        }
    }

    /// Run the sync loop.
    ///
    /// This method runs indefinitely, draining available updates in
    /// batches and sleeping for the poll interval once caught up.
    pub async fn run(&self) -> Result<()> {
        info!("Sync engine starting...");

        loop {
            let state = self.storage.get_sync_state().await?;

            let updates = match self
                .client
                .get_token_metadata_updates(state.last_update_id, self.config.batch_size)
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Failed to fetch big-map updates: {:#}", e);
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                    continue;
                }
            };

            if updates.is_empty() {
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                continue;
            }

            let batch_len = updates.len();
            info!(
                "Processing {} big-map updates after id {}",
                batch_len, state.last_update_id
            );

            let mut cursor = state.last_update_id;
            for update in &updates {
                match self.worker.process_big_map_update(update) {
                    Ok(Some(token)) => {
                        self.storage.save_token_metadata(&token).await?;
                    }
                    Ok(None) => {}
                    // A malformed update is dropped; the stream moves on.
                    Err(e) => {
                        warn!(
                            update_id = update.id,
                            contract = %update.contract.address,
                            "Dropping undecodable big-map update: {:#}", e
                        );
                    }
                }
                cursor = cursor.max(update.id);
            }

            self.storage.update_sync_state(cursor).await?;

            // A short batch means we are caught up.
            if batch_len < self.config.batch_size as usize {
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
            }
        }
    }
}
