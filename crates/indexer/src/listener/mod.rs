//! Event listener for `token_metadata` big-map updates.
//!
//! This module provides:
//! - Big-map update type definitions and parsing
//! - A TzKT REST client for update polling
//! - A sync engine that advances the update cursor

pub mod events;
pub mod provider;
pub mod sync;

pub use events::BigMapUpdate;
pub use provider::TzktClient;
pub use sync::SyncEngine;
