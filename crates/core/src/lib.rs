//! # tzmeta Core
//!
//! Core types and pure logic for the tzmeta token-metadata indexer.
//!
//! This crate provides the building blocks shared by the indexer service:
//!
//! - **Codec**: decoding of raw `token_metadata` big-map values into typed
//!   token info (token id, metadata mapping, optional off-chain link)
//! - **Merger**: gap-filling reconciliation of metadata documents across
//!   resolution attempts
//! - **Status**: the per-token resolution status (`new`/`applied`/`failed`)
//! - **Update-id counter**: process-wide strictly increasing sequence
//!   stamped on every record mutation
//!
//! Everything here is synchronous, allocation-light computation over
//! in-memory values; network access and persistence live in the indexer.

#![warn(missing_docs)]

pub mod codec;
pub mod counter;
pub mod error;
pub mod escape;
pub mod merge;
pub mod types;

pub use codec::{decode_hex_text, TokenInfo};
pub use counter::UpdateIdCounter;
pub use error::{DecodeError, MergeError};
pub use escape::escape;
pub use merge::merge;
pub use types::MetadataStatus;
