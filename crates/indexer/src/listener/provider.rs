//! TzKT REST client for big-map update polling.

use std::time::Duration;

use anyhow::{Context, Result};

use super::events::BigMapUpdate;

/// Thin client over the TzKT big-map updates endpoint.
#[derive(Debug, Clone)]
pub struct TzktClient {
    http: reqwest::Client,
    base_url: String,
}

impl TzktClient {
    /// Create a client for the given TzKT API base URL.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch `token_metadata` big-map updates after the given cursor.
    ///
    /// Results come back sorted by update id, so the highest id in the
    /// batch is the next cursor.
    pub async fn get_token_metadata_updates(
        &self,
        after_id: u64,
        limit: u32,
    ) -> Result<Vec<BigMapUpdate>> {
        let url = format!("{}/v1/bigmaps/updates", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("path.as", "*token_metadata"),
                ("action.in", "add_key,update_key"),
                ("sort.asc", "id"),
            ])
            .query(&[
                ("offset.cr", after_id.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("Failed to fetch big-map updates")?
            .error_for_status()
            .context("TzKT returned an error status")?;

        let updates: Vec<BigMapUpdate> = response
            .json()
            .await
            .context("Failed to parse big-map updates")?;

        Ok(updates)
    }
}
