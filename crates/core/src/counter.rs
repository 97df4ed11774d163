//! Process-wide update-id sequence.

use std::sync::atomic::{AtomicU64, Ordering};

/// Strictly increasing sequence stamped on every record mutation.
///
/// Shared (via `Arc`) by every component that mutates records, so the
/// produced values form a total order across the whole process: no two
/// calls ever observe the same value. Seed with [`starting_at`] from the
/// highest persisted update id so monotonicity survives restarts.
///
/// [`starting_at`]: UpdateIdCounter::starting_at
#[derive(Debug, Default)]
pub struct UpdateIdCounter(AtomicU64);

impl UpdateIdCounter {
    /// Counter starting at zero; the first `increment` returns 1.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Counter resuming after `value`; the next `increment` returns
    /// `value + 1`.
    pub fn starting_at(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Advance the sequence and return the new value.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last value handed out (0 if none yet).
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
