//! Token metadata ingestion and resolution for tzmeta.
//!
//! This crate provides:
//! - A TzKT big-map update listener for `token_metadata` paths
//! - Decoding of raw updates into token metadata records
//! - Off-chain link resolution (IPFS, HTTP, tezos-storage) with bounded
//!   retries and error-classified failure transitions
//! - Token metadata storage with atomic partial updates
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │  tzmeta-indexer                  │
//! │                                  │
//! │  ┌─────────────────┐             │
//! │  │  Sync Engine    │ ← TzKT REST │
//! │  │  (tokio task)   │   big-map   │
//! │  └────────┬────────┘   updates   │
//! │           │ decode + construct   │
//! │      ┌────▼──────┐               │
//! │      │  Storage  │ ← SQLite      │
//! │      │ (tokens)  │               │
//! │      └────┬──────┘               │
//! │           │ status = new         │
//! │  ┌────────▼──────────┐           │
//! │  │ Resolution Service│           │
//! │  │   (tokio task)    │──► IPFS / │
//! │  │  merge + status   │    HTTP / │
//! │  └───────────────────┘    TzKT   │
//! └──────────────────────────────────┘
//! ```
//!
//! # Separation of concerns
//!
//! - **listener**: fetches big-map updates and advances the sync cursor
//! - **worker**: record construction, resolution state machine, service loop
//! - **resolver**: the pluggable link resolver and its error taxonomy
//! - **storage**: SQLite persistence with migrations
//! - **metrics**: in-process status/error counters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod listener;
pub mod metrics;
pub mod resolver;
pub mod storage;
pub mod worker;

pub use tzmeta_core::MetadataStatus;
