//! Token metadata record construction and resolution.
//!
//! The worker drives one record through one resolution attempt: invoke
//! the resolver under a deadline, apply the status transition, merge the
//! resolved document with what is already stored, and hand the outcome
//! to storage as a partial update. The periodic [`ResolutionService`]
//! feeds it batches of unresolved records.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use tzmeta_core::{escape, merge, MetadataStatus, TokenInfo, UpdateIdCounter};

use crate::config::ResolverConfig;
use crate::listener::events::BigMapUpdate;
use crate::metrics::Metrics;
use crate::resolver::{Resolver, ResolvingError};
use crate::storage::{Storage, TokenMetadataRecord};

/// Entity tag for status counters.
const TOKEN_ENTITY: &str = "token";

/// Per-record resolution worker.
pub struct MetadataWorker<R> {
    network: String,
    storage: Storage,
    resolver: R,
    metrics: Arc<Metrics>,
    update_ids: Arc<UpdateIdCounter>,
    max_retry_count: u32,
    attempt_timeout: Duration,
}

impl<R: Resolver> MetadataWorker<R> {
    /// Create a worker for one network.
    pub fn new(
        network: &str,
        storage: Storage,
        resolver: R,
        metrics: Arc<Metrics>,
        update_ids: Arc<UpdateIdCounter>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            network: network.to_string(),
            storage,
            resolver,
            metrics,
            update_ids,
            max_retry_count: config.max_retry_count_on_error,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
        }
    }

    /// Decode a big-map update into an initial token metadata record.
    ///
    /// Updates without content are no-ops. A record whose link is not a
    /// syntactically valid absolute reference is complete at creation:
    /// status goes straight to `Applied` and the link is discarded.
    pub fn process_big_map_update(
        &self,
        update: &BigMapUpdate,
    ) -> Result<Option<TokenMetadataRecord>> {
        let Some(content) = &update.content else {
            return Ok(None);
        };

        let info = TokenInfo::from_value(&content.value)?;

        let metadata = serde_json::to_string(&info.token_info)
            .context("Failed to serialize token metadata mapping")?;

        let now = chrono::Utc::now().timestamp();
        let mut token = TokenMetadataRecord {
            network: self.network.clone(),
            contract: update.contract.address.clone(),
            token_id: info.token_id,
            status: MetadataStatus::New,
            metadata: escape(&metadata),
            link: String::new(),
            retry_count: 0,
            update_id: self.update_ids.increment(),
            created_at: now,
            updated_at: now,
        };

        match &info.link {
            Some(link) if Url::parse(link).is_ok() => token.link = link.clone(),
            _ => token.status = MetadataStatus::Applied,
        }

        self.metrics.increment_state(TOKEN_ENTITY, token.status);

        Ok(Some(token))
    }

    /// Apply one resolver outcome to the record.
    ///
    /// Transient failures (gateway silence, missing storage key)
    /// increment `retry_count` and leave the status retryable until the
    /// configured maximum is reached; every other failure is terminal.
    /// Success merges the fetched document into the stored one. The
    /// status counter fires and `update_id` is re-stamped on every path.
    async fn resolve_token(&self, token: &mut TokenMetadataRecord) -> Result<()> {
        info!(
            contract = %token.contract,
            token_id = token.token_id,
            link = %token.link,
            "Trying to resolve"
        );

        let outcome = match tokio::time::timeout(
            self.attempt_timeout,
            self.resolver
                .resolve(&token.network, &token.contract, &token.link),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ResolvingError::Timeout(self.attempt_timeout)),
        };

        match outcome {
            Err(err) => {
                if err.is_retryable() {
                    token.retry_count += 1;
                    if token.retry_count < self.max_retry_count {
                        warn!(
                            contract = %token.contract,
                            token_id = token.token_id,
                            link = %token.link,
                            "Retry: {}", err
                        );
                    } else {
                        token.status = MetadataStatus::Failed;
                        warn!(
                            contract = %token.contract,
                            token_id = token.token_id,
                            link = %token.link,
                            "Failed: {}", err
                        );
                    }
                } else {
                    token.status = MetadataStatus::Failed;
                    warn!(
                        contract = %token.contract,
                        token_id = token.token_id,
                        link = %token.link,
                        "Failed: {}", err
                    );
                }

                self.metrics.increment_error(&err);
            }
            Ok(data) => {
                let merged = merge(token.metadata.as_bytes(), &data)?;

                match std::str::from_utf8(&merged) {
                    Ok(document) => {
                        token.metadata = escape(document);
                        token.status = MetadataStatus::Applied;
                    }
                    // Merged bytes are not text; a retry cannot fix that.
                    Err(_) => token.status = MetadataStatus::Failed,
                }
            }
        }

        self.metrics.increment_state(TOKEN_ENTITY, token.status);
        token.update_id = self.update_ids.increment();

        Ok(())
    }

    /// Run one end-to-end resolution attempt and persist the outcome.
    ///
    /// A merge failure aborts the attempt before any write: the stored
    /// record stays as it was, available for a later cycle.
    pub async fn run(&self, mut token: TokenMetadataRecord) -> Result<()> {
        self.resolve_token(&mut token).await?;
        self.storage.update_token_metadata(&token).await
    }
}

/// Periodic driver that drains unresolved records.
pub struct ResolutionService<R> {
    worker: Arc<MetadataWorker<R>>,
    storage: Storage,
    interval: Duration,
    batch_size: u32,
}

impl<R: Resolver> ResolutionService<R> {
    /// Create a service around a shared worker.
    pub fn new(worker: Arc<MetadataWorker<R>>, storage: Storage, config: &ResolverConfig) -> Self {
        Self {
            worker,
            storage,
            interval: Duration::from_secs(config.resolve_interval_secs),
            batch_size: config.resolve_batch_size,
        }
    }

    /// Run the resolution loop.
    ///
    /// Runs indefinitely; spawn as a background task. A failed cycle is
    /// logged and retried on the next tick.
    pub async fn run(&self) -> Result<()> {
        info!("Resolution service starting with interval: {:?}", self.interval);

        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.resolve_pending().await {
                warn!("Resolution cycle failed: {:#}", e);
            }
        }
    }

    /// Resolve one batch of pending records.
    ///
    /// Records are processed one at a time within a cycle, so a token
    /// identity never has two attempts in flight.
    pub async fn resolve_pending(&self) -> Result<()> {
        let pending = self.storage.get_unresolved(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(());
        }

        info!("Resolving {} pending token records", pending.len());

        for token in pending {
            if let Err(e) = self.worker.run(token).await {
                warn!("Resolution attempt failed: {:#}", e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::events::{BigMapContent, ContractRef};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Resolver that replays scripted outcomes in order.
    struct MockResolver {
        outcomes: Mutex<VecDeque<Result<Vec<u8>, ResolvingError>>>,
    }

    impl MockResolver {
        fn new(outcomes: Vec<Result<Vec<u8>, ResolvingError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl Resolver for MockResolver {
        async fn resolve(
            &self,
            _network: &str,
            _contract: &str,
            _link: &str,
        ) -> Result<Vec<u8>, ResolvingError> {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("mock resolver exhausted")
        }
    }

    /// Resolver that never answers within a short deadline.
    struct SlowResolver;

    #[async_trait]
    impl Resolver for SlowResolver {
        async fn resolve(
            &self,
            _network: &str,
            _contract: &str,
            _link: &str,
        ) -> Result<Vec<u8>, ResolvingError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(b"{}".to_vec())
        }
    }

    fn no_ipfs(link: &str) -> ResolvingError {
        ResolvingError::NoIpfsResponse {
            link: link.to_string(),
        }
    }

    async fn setup<R: Resolver>(
        resolver: R,
        config: &ResolverConfig,
    ) -> (MetadataWorker<R>, Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();

        let worker = MetadataWorker::new(
            "mainnet",
            storage.clone(),
            resolver,
            Arc::new(Metrics::new()),
            Arc::new(UpdateIdCounter::new()),
            config,
        );

        (worker, storage, temp_db)
    }

    fn update_with_value(value: serde_json::Value) -> BigMapUpdate {
        BigMapUpdate {
            id: 1,
            level: 1000,
            contract: ContractRef {
                address: "KT1Contract".to_string(),
            },
            path: "assets.token_metadata".to_string(),
            action: "add_key".to_string(),
            content: Some(BigMapContent { value }),
        }
    }

    fn pending_record(metadata: &str, update_id: u64) -> TokenMetadataRecord {
        TokenMetadataRecord {
            network: "mainnet".to_string(),
            contract: "KT1Contract".to_string(),
            token_id: 1,
            status: MetadataStatus::New,
            metadata: metadata.to_string(),
            link: "ipfs://QmTest".to_string(),
            retry_count: 0,
            update_id,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_process_update_with_valid_link() {
        let (worker, storage, _tmp) =
            setup(MockResolver::new(vec![]), &ResolverConfig::default()).await;

        // "https://example.com/1.json" / "Token1"
        let update = update_with_value(json!({
            "1": {
                "": "68747470733a2f2f6578616d706c652e636f6d2f312e6a736f6e",
                "name": "546f6b656e31"
            }
        }));

        let token = worker.process_big_map_update(&update).unwrap().unwrap();
        assert_eq!(token.token_id, 1);
        assert_eq!(token.status, MetadataStatus::New);
        assert_eq!(token.link, "https://example.com/1.json");
        assert_eq!(token.metadata, r#"{"name":"Token1"}"#);
        assert_eq!(token.update_id, 1);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_process_update_without_resolvable_link() {
        let (worker, storage, _tmp) =
            setup(MockResolver::new(vec![]), &ResolverConfig::default()).await;

        // No link entry at all.
        let update = update_with_value(json!({"2": {"name": "546f6b656e32"}}));
        let token = worker.process_big_map_update(&update).unwrap().unwrap();
        assert_eq!(token.status, MetadataStatus::Applied);
        assert_eq!(token.link, "");

        // A link that is not an absolute reference is discarded.
        // "not a uri" in hex
        let update = update_with_value(json!({"3": {"": "6e6f7420612075726921"}}));
        let token = worker.process_big_map_update(&update).unwrap().unwrap();
        assert_eq!(token.status, MetadataStatus::Applied);
        assert_eq!(token.link, "");

        storage.close().await;
    }

    #[tokio::test]
    async fn test_process_update_without_content_is_noop() {
        let (worker, storage, _tmp) =
            setup(MockResolver::new(vec![]), &ResolverConfig::default()).await;

        let mut update = update_with_value(json!({}));
        update.content = None;
        assert!(worker.process_big_map_update(&update).unwrap().is_none());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_process_update_bad_payload_fails() {
        let (worker, storage, _tmp) =
            setup(MockResolver::new(vec![]), &ResolverConfig::default()).await;

        let update = update_with_value(json!({"abc": {"name": "546f6b656e31"}}));
        assert!(worker.process_big_map_update(&update).is_err());

        storage.close().await;
    }

    #[tokio::test]
    async fn test_transient_errors_until_exhaustion() {
        let outcomes = vec![
            Err(no_ipfs("ipfs://QmTest")),
            Err(no_ipfs("ipfs://QmTest")),
            Err(no_ipfs("ipfs://QmTest")),
        ];
        let config = ResolverConfig {
            max_retry_count_on_error: 3,
            ..Default::default()
        };
        let (worker, storage, _tmp) = setup(MockResolver::new(outcomes), &config).await;

        storage
            .save_token_metadata(&pending_record("{}", 0))
            .await
            .unwrap();

        let mut last_update_id = 0;
        for (attempt, expected_status) in [
            (1u32, MetadataStatus::New),
            (2, MetadataStatus::New),
            (3, MetadataStatus::Failed),
        ] {
            let token = storage
                .get_token_metadata("mainnet", "KT1Contract", 1)
                .await
                .unwrap()
                .unwrap();
            worker.run(token).await.unwrap();

            let stored = storage
                .get_token_metadata("mainnet", "KT1Contract", 1)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.retry_count, attempt);
            assert_eq!(stored.status, expected_status);
            assert!(stored.update_id > last_update_id);
            last_update_id = stored.update_id;
        }

        storage.close().await;
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let outcomes = vec![Err(ResolvingError::HttpStatus {
            status: 500,
            link: "ipfs://QmTest".to_string(),
        })];
        let (worker, storage, _tmp) =
            setup(MockResolver::new(outcomes), &ResolverConfig::default()).await;

        storage
            .save_token_metadata(&pending_record("{}", 1))
            .await
            .unwrap();

        let token = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        worker.run(token).await.unwrap();

        let stored = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MetadataStatus::Failed);
        assert_eq!(stored.retry_count, 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_success_merges_and_applies() {
        let outcomes = vec![Ok(br#"{"name":"Renamed","symbol":"TK"}"#.to_vec())];
        let (worker, storage, _tmp) =
            setup(MockResolver::new(outcomes), &ResolverConfig::default()).await;

        storage
            .save_token_metadata(&pending_record(r#"{"name":"Token1"}"#, 1))
            .await
            .unwrap();

        let token = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        worker.run(token).await.unwrap();

        let stored = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MetadataStatus::Applied);

        let document: serde_json::Value = serde_json::from_str(&stored.metadata).unwrap();
        assert_eq!(document["name"], "Token1");
        assert_eq!(document["symbol"], "TK");

        storage.close().await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_result_fails_without_replacing() {
        // Stored metadata is empty, so the merge passes the raw bytes
        // through and the UTF-8 check decides.
        let outcomes = vec![Ok(vec![0xff, 0xfe, 0x00])];
        let (worker, storage, _tmp) =
            setup(MockResolver::new(outcomes), &ResolverConfig::default()).await;

        storage
            .save_token_metadata(&pending_record("", 0))
            .await
            .unwrap();

        let token = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        worker.run(token).await.unwrap();

        let stored = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MetadataStatus::Failed);
        assert_eq!(stored.metadata, "");
        assert!(stored.update_id > 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_merge_error_aborts_without_write() {
        let outcomes = vec![Ok(b"not json at all".to_vec())];
        let (worker, storage, _tmp) =
            setup(MockResolver::new(outcomes), &ResolverConfig::default()).await;

        storage
            .save_token_metadata(&pending_record(r#"{"name":"Token1"}"#, 0))
            .await
            .unwrap();

        let token = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        assert!(worker.run(token).await.is_err());

        // Nothing was persisted: the record is untouched for a later cycle.
        let stored = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MetadataStatus::New);
        assert_eq!(stored.metadata, r#"{"name":"Token1"}"#);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.update_id, 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_timeout_is_terminal() {
        let config = ResolverConfig {
            attempt_timeout_secs: 1,
            ..Default::default()
        };
        let (worker, storage, _tmp) = setup(SlowResolver, &config).await;

        storage
            .save_token_metadata(&pending_record("{}", 1))
            .await
            .unwrap();

        let token = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        worker.run(token).await.unwrap();

        let stored = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MetadataStatus::Failed);
        assert_eq!(stored.retry_count, 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_resolution_service_drains_pending() {
        let outcomes = vec![Ok(br#"{"symbol":"TK"}"#.to_vec())];
        let config = ResolverConfig::default();
        let (worker, storage, _tmp) = setup(MockResolver::new(outcomes), &config).await;

        storage
            .save_token_metadata(&pending_record(r#"{"name":"Token1"}"#, 1))
            .await
            .unwrap();

        let service = ResolutionService::new(Arc::new(worker), storage.clone(), &config);
        service.resolve_pending().await.unwrap();

        let stored = storage
            .get_token_metadata("mainnet", "KT1Contract", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MetadataStatus::Applied);
        assert!(storage.get_unresolved(10).await.unwrap().is_empty());

        storage.close().await;
    }
}
