//! Last local-to-remote sync point.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::clock::SyncClock;

/// Stamp of the last sync, compared against the task store's last local
/// mutation to decide whether a flush is due.
#[derive(Debug, Clone)]
pub struct SyncCheckpoint {
    last_sync: Arc<AtomicI64>,
    clock: SyncClock,
}

impl SyncCheckpoint {
    /// Create a checkpoint that has never synced, drawing stamps from `clock`.
    #[must_use]
    pub fn new(clock: SyncClock) -> Self {
        Self {
            last_sync: Arc::new(AtomicI64::new(0)),
            clock,
        }
    }

    pub fn last_sync(&self) -> i64 {
        self.last_sync.load(Ordering::Acquire)
    }

    /// Record a sync at the current time and return its stamp.
    pub fn advance(&self) -> i64 {
        let stamp = self.clock.tick();
        self.last_sync.fetch_max(stamp, Ordering::AcqRel);
        stamp
    }

    /// Whether a local mutation stamped `last_update` has not been synced yet.
    pub fn is_due(&self, last_update: i64) -> bool {
        last_update > self.last_sync()
    }
}
