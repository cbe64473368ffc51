//! Monotonic millisecond stamps shared by the task store and the sync checkpoint.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Issues strictly increasing Unix-millisecond stamps.
///
/// Wall-clock time is used when it moves forward; otherwise the previous
/// stamp is bumped by one, so two stamps taken in the same millisecond still
/// compare strictly.
#[derive(Debug, Clone, Default)]
pub struct SyncClock {
    last: Arc<AtomicI64>,
}

impl SyncClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next stamp.
    pub fn tick(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(current.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Most recently issued stamp, or 0 when none has been issued.
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }
}
