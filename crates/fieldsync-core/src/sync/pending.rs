//! Identifiers whose local write is in flight.
//!
//! A remote notification for a pending identifier is the echo of our own
//! write and must not be applied back onto local state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::TaskId;

/// Shared set of task identifiers with an upsert in flight
///
/// Membership is counted, so overlapping writes of the same task keep it
/// pending until the last one settles.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    ids: Arc<Mutex<HashMap<TaskId, usize>>>,
}

impl PendingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as pending until the returned guard is dropped.
    pub fn acquire(&self, id: TaskId) -> PendingGuard {
        *self.lock().entry(id.clone()).or_insert(0) += 1;
        PendingGuard {
            set: self.clone(),
            id,
        }
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, id: &TaskId) {
        let mut ids = self.lock();
        if let Some(count) = ids.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                ids.remove(id);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, usize>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped pending marker; removes its identifier on drop, whatever the
/// outcome of the write it covers.
#[derive(Debug)]
pub struct PendingGuard {
    set: PendingSet,
    id: TaskId,
}

impl PendingGuard {
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.set.release(&self.id);
    }
}
