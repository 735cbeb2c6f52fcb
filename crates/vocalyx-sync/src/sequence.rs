//! Stale-response guard for views refreshed by racing requests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out monotonically increasing request numbers for one view and
/// accepts a response only if nothing newer has been applied already.
#[derive(Debug, Default)]
pub struct SequenceGate {
    issued: AtomicU64,
    applied: AtomicU64,
}

impl SequenceGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new outgoing request.
    pub fn next(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record `seq` as applied. Returns `false` when a newer response already won.
    pub fn try_apply(&self, seq: u64) -> bool {
        self.applied.fetch_max(seq, Ordering::SeqCst) < seq
    }

    #[must_use]
    pub fn latest_applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }
}
