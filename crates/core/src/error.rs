//! Error types for the core crate.

use thiserror::Error;

/// Errors from decoding a raw big-map update payload.
///
/// Any of these is fatal to that single update: no record is produced.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The big-map key is not an unsigned decimal token id.
    #[error("invalid token id `{0}`: expected an unsigned decimal integer")]
    InvalidTokenId(String),

    /// The payload is not the expected single-entry object shape.
    #[error("malformed big-map value: {0}")]
    Malformed(String),

    /// The reserved link entry is present but not valid hex.
    #[error("link is not valid hex: {0}")]
    InvalidLinkHex(#[from] hex::FromHexError),
}

/// Errors from merging a stored metadata document with a resolved one.
///
/// Fatal to that single resolution attempt: the record is left unchanged.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The stored document is present but does not parse as a JSON object.
    #[error("stored metadata is not a JSON object: {0}")]
    Stored(#[source] serde_json::Error),

    /// The resolved document is present but does not parse as a JSON object.
    #[error("resolved metadata is not a JSON object: {0}")]
    Resolved(#[source] serde_json::Error),

    /// The merged document failed to serialize.
    #[error("failed to serialize merged metadata: {0}")]
    Serialize(#[source] serde_json::Error),
}
