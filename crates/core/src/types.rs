//! Core types for tzmeta.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution status of a token metadata record.
///
/// Transitions only move forward: `New -> {Applied, Failed}`. `Applied`
/// and `Failed` are terminal; downstream consumers treat a terminal
/// record as final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataStatus {
    /// Created from a big-map update, awaiting link resolution.
    New,

    /// Metadata fully resolved (or no external link to resolve).
    Applied,

    /// Resolution failed permanently (exhausted retries or a
    /// non-retryable error).
    Failed,
}

impl MetadataStatus {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataStatus::New => "new",
            MetadataStatus::Applied => "applied",
            MetadataStatus::Failed => "failed",
        }
    }

    /// Whether no further resolution attempts are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MetadataStatus::Applied | MetadataStatus::Failed)
    }
}

impl fmt::Display for MetadataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetadataStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(MetadataStatus::New),
            "applied" => Ok(MetadataStatus::Applied),
            "failed" => Ok(MetadataStatus::Failed),
            _ => Err(format!("Unknown metadata status: {}", s)),
        }
    }
}
