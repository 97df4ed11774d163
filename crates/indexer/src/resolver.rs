//! Off-chain metadata link resolution.
//!
//! Links come in three flavors: `ipfs://` content addresses fetched
//! through a gateway, plain `http(s)://` URLs, and `tezos-storage:`
//! references pointing back into the token contract's `%metadata`
//! big map (looked up through TzKT).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ResolverConfig;

/// Scheme prefix for content-addressed links.
pub const IPFS_SCHEME: &str = "ipfs://";

/// Scheme prefix for on-chain storage references.
pub const TEZOS_STORAGE_SCHEME: &str = "tezos-storage:";

/// A classified resolution failure.
///
/// The state machine switches on the classification, never on type
/// identity: [`is_retryable`](Self::is_retryable) marks the two
/// transient kinds, everything else is terminal for the record.
#[derive(Debug, Error)]
pub enum ResolvingError {
    /// The IPFS gateway did not answer (retryable).
    #[error("no response from IPFS gateway for {link}")]
    NoIpfsResponse {
        /// The link being resolved
        link: String,
    },

    /// The referenced on-chain storage key does not exist (retryable:
    /// the key may appear in a later block).
    #[error("tezos storage key `{key}` not found on {contract}")]
    StorageKeyNotFound {
        /// Contract whose metadata big map was queried
        contract: String,
        /// The missing key
        key: String,
    },

    /// The link uses a scheme this resolver cannot handle.
    #[error("unsupported link scheme in `{0}`")]
    UnsupportedScheme(String),

    /// The backend answered with a non-success HTTP status.
    #[error("unexpected HTTP status {status} for {link}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// The link being resolved
        link: String,
    },

    /// The resolution attempt exceeded its deadline.
    #[error("resolution timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP request itself failed.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The response body exceeded the configured size cap.
    #[error("response body exceeds {limit} bytes for {link}")]
    TooLarge {
        /// Configured maximum body size
        limit: usize,
        /// The link being resolved
        link: String,
    },

    /// An on-chain storage value was not valid hex.
    #[error("tezos storage value for `{key}` is not valid hex")]
    InvalidStorageValue {
        /// The key whose value failed to decode
        key: String,
    },
}

impl ResolvingError {
    /// Stable classification tag, used as the metrics counter key.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvingError::NoIpfsResponse { .. } => "no_ipfs_response",
            ResolvingError::StorageKeyNotFound { .. } => "storage_key_not_found",
            ResolvingError::UnsupportedScheme(_) => "unsupported_scheme",
            ResolvingError::HttpStatus { .. } => "http_status",
            ResolvingError::Timeout(_) => "timeout",
            ResolvingError::Request(_) => "request",
            ResolvingError::TooLarge { .. } => "too_large",
            ResolvingError::InvalidStorageValue { .. } => "invalid_storage_value",
        }
    }

    /// Whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolvingError::NoIpfsResponse { .. } | ResolvingError::StorageKeyNotFound { .. }
        )
    }
}

/// A pluggable off-chain link resolver.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Fetch the raw bytes behind `link` for the given token contract.
    async fn resolve(
        &self,
        network: &str,
        contract: &str,
        link: &str,
    ) -> Result<Vec<u8>, ResolvingError>;
}

/// Scheme-dispatching resolver over HTTP backends.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    http: reqwest::Client,
    ipfs_gateway: String,
    tzkt_url: String,
    max_body_bytes: usize,
}

/// Narrow view of a TzKT big-map key entry; only the value is consumed.
#[derive(Debug, Deserialize)]
struct BigMapKeyEntry {
    value: Option<String>,
}

impl LinkResolver {
    /// Build a resolver from configuration.
    pub fn new(config: &ResolverConfig, tzkt_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            ipfs_gateway: config.ipfs_gateway.trim_end_matches('/').to_string(),
            tzkt_url: tzkt_url.trim_end_matches('/').to_string(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    async fn fetch(&self, url: &str, link: &str) -> Result<Vec<u8>, ResolvingError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ResolvingError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolvingError::HttpStatus {
                status: status.as_u16(),
                link: link.to_string(),
            });
        }

        let body = response.bytes().await.map_err(ResolvingError::Request)?;
        if body.len() > self.max_body_bytes {
            return Err(ResolvingError::TooLarge {
                limit: self.max_body_bytes,
                link: link.to_string(),
            });
        }

        Ok(body.to_vec())
    }

    async fn resolve_ipfs(&self, link: &str) -> Result<Vec<u8>, ResolvingError> {
        let path = link.trim_start_matches(IPFS_SCHEME);
        let url = format!("{}/ipfs/{}", self.ipfs_gateway, path);

        self.fetch(&url, link).await.map_err(|err| match err {
            // Gateway unreachable is the transient case.
            ResolvingError::Request(_) => ResolvingError::NoIpfsResponse {
                link: link.to_string(),
            },
            other => other,
        })
    }

    async fn resolve_tezos_storage(
        &self,
        contract: &str,
        link: &str,
    ) -> Result<Vec<u8>, ResolvingError> {
        let reference = link
            .trim_start_matches(TEZOS_STORAGE_SCHEME)
            .trim_start_matches("//");

        // `tezos-storage://KT1.../key` addresses another contract's
        // metadata big map; a bare key stays on the token contract.
        let (contract, key) = match reference.split_once('/') {
            Some((host, key)) if host.starts_with("KT1") => (host, key),
            _ => (contract, reference),
        };

        let url = format!(
            "{}/v1/contracts/{}/bigmaps/metadata/keys/{}",
            self.tzkt_url, contract, key
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(ResolvingError::Request)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            return Err(ResolvingError::StorageKeyNotFound {
                contract: contract.to_string(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ResolvingError::HttpStatus {
                status: status.as_u16(),
                link: link.to_string(),
            });
        }

        let entry: BigMapKeyEntry = response.json().await.map_err(ResolvingError::Request)?;
        let Some(value) = entry.value else {
            return Err(ResolvingError::StorageKeyNotFound {
                contract: contract.to_string(),
                key: key.to_string(),
            });
        };

        let bytes = hex::decode(&value).map_err(|_| ResolvingError::InvalidStorageValue {
            key: key.to_string(),
        })?;
        if bytes.len() > self.max_body_bytes {
            return Err(ResolvingError::TooLarge {
                limit: self.max_body_bytes,
                link: link.to_string(),
            });
        }

        Ok(bytes)
    }
}

#[async_trait]
impl Resolver for LinkResolver {
    async fn resolve(
        &self,
        _network: &str,
        contract: &str,
        link: &str,
    ) -> Result<Vec<u8>, ResolvingError> {
        if link.starts_with(IPFS_SCHEME) {
            self.resolve_ipfs(link).await
        } else if link.starts_with("https://") || link.starts_with("http://") {
            self.fetch(link, link).await
        } else if link.starts_with(TEZOS_STORAGE_SCHEME) {
            self.resolve_tezos_storage(contract, link).await
        } else {
            Err(ResolvingError::UnsupportedScheme(link.to_string()))
        }
    }
}
