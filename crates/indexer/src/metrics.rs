//! In-process observability counters.

use std::collections::HashMap;
use std::sync::Mutex;

use tzmeta_core::MetadataStatus;

use crate::resolver::ResolvingError;

/// Counters keyed by `(entity, status)` and by resolver error kind.
///
/// Increments are fire-and-forget: they never block meaningfully and
/// never fail the caller. Shared across workers via `Arc`.
#[derive(Debug, Default)]
pub struct Metrics {
    states: Mutex<HashMap<(&'static str, MetadataStatus), u64>>,
    errors: Mutex<HashMap<&'static str, u64>>,
}

impl Metrics {
    /// Create an empty counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one record landing in `status`.
    pub fn increment_state(&self, entity: &'static str, status: MetadataStatus) {
        if let Ok(mut states) = self.states.lock() {
            *states.entry((entity, status)).or_insert(0) += 1;
        }
    }

    /// Count one classified resolver failure.
    pub fn increment_error(&self, error: &ResolvingError) {
        if let Ok(mut errors) = self.errors.lock() {
            *errors.entry(error.kind()).or_insert(0) += 1;
        }
    }

    /// Current `(entity, status)` counts, sorted for stable output.
    pub fn state_snapshot(&self) -> Vec<((&'static str, MetadataStatus), u64)> {
        let mut entries: Vec<_> = match self.states.lock() {
            Ok(states) => states.iter().map(|(k, v)| (*k, *v)).collect(),
            Err(_) => Vec::new(),
        };
        entries.sort_by_key(|((entity, status), _)| (*entity, status.as_str()));
        entries
    }

    /// Current error-kind counts, sorted for stable output.
    pub fn error_snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut entries: Vec<_> = match self.errors.lock() {
            Ok(errors) => errors.iter().map(|(k, v)| (*k, *v)).collect(),
            Err(_) => Vec::new(),
        };
        entries.sort_by_key(|(kind, _)| *kind);
        entries
    }
}
