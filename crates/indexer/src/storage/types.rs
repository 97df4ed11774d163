//! Database types for the indexer storage layer.

use tzmeta_core::MetadataStatus;

/// A token metadata record as stored in the database.
///
/// One row per `(network, contract, token_id)`. The resolution worker
/// mutates a borrowed copy per attempt and writes back `status`,
/// `metadata`, `retry_count`, and `update_id` as one atomic partial
/// update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadataRecord {
    /// Source network name (immutable after creation)
    pub network: String,

    /// Contract address owning the token (immutable)
    pub contract: String,

    /// Token id parsed from the big-map key (immutable)
    pub token_id: u64,

    /// Resolution status
    pub status: MetadataStatus,

    /// Canonical JSON metadata document (escaped for storage)
    pub metadata: String,

    /// Off-chain link to resolve; empty means no external work needed
    pub link: String,

    /// Count of failed resolution attempts
    pub retry_count: u32,

    /// Process-wide sequence number of the last mutation
    pub update_id: u64,

    /// Unix timestamp of record creation
    pub created_at: i64,

    /// Unix timestamp of the last write
    pub updated_at: i64,
}

impl TokenMetadataRecord {
    /// Whether this record still has off-chain work pending.
    pub fn needs_resolution(&self) -> bool {
        self.status == MetadataStatus::New && !self.link.is_empty()
    }
}

/// Sync cursor over the TzKT big-map update stream (singleton).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Network the cursor belongs to (for safety across config changes)
    pub network: String,

    /// Id of the last fully processed big-map update
    pub last_update_id: u64,

    /// Unix timestamp of last update
    pub updated_at: i64,
}
