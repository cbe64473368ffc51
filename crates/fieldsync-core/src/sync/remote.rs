//! Remote task table contract and an in-memory implementation.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::models::{Task, TaskId, TaskPatch};
use crate::sync::change::{ChangeFilter, TaskChange};
use crate::{Error, Result};

/// Write side of the remote tasks table
#[allow(async_fn_in_trait)]
pub trait RemoteTaskTable {
    /// Insert or replace a row. The `origin` tag is never part of the row.
    async fn upsert(&self, task: &Task) -> Result<()>;
}

impl<T: RemoteTaskTable> RemoteTaskTable for &T {
    async fn upsert(&self, task: &Task) -> Result<()> {
        (**self).upsert(task).await
    }
}

impl<T: RemoteTaskTable> RemoteTaskTable for Arc<T> {
    async fn upsert(&self, task: &Task) -> Result<()> {
        (**self).upsert(task).await
    }
}

#[derive(Debug, Default)]
struct TableState {
    rows: BTreeMap<TaskId, Task>,
    upserts: Vec<Task>,
    subscribers: Vec<(ChangeFilter, mpsc::UnboundedSender<TaskChange>)>,
    failures: VecDeque<String>,
    failing_ids: HashSet<TaskId>,
}

impl TableState {
    fn broadcast(&mut self, change: &TaskChange) {
        self.subscribers.retain(|(filter, sender)| {
            !filter.matches(change.kind) || sender.send(change.clone()).is_ok()
        });
    }
}

/// In-process tasks table.
///
/// Every write is broadcast to subscribers, including writes made through
/// [`RemoteTaskTable::upsert`], so callers see the echo of their own
/// writes just like with a realtime backend. Upserts acknowledge only after
/// the echo has been delivered and the caller has yielded once.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskTable {
    state: Arc<Mutex<TableState>>,
}

impl InMemoryTaskTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive change notifications matching `filter`.
    pub fn subscribe(&self, filter: ChangeFilter) -> mpsc::UnboundedReceiver<TaskChange> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().subscribers.push((filter, sender));
        receiver
    }

    /// Current rows.
    pub fn rows(&self) -> Vec<Task> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn row(&self, id: &TaskId) -> Option<Task> {
        self.lock().rows.get(id).cloned()
    }

    /// Every payload received through `upsert`, in order (failed ones included).
    pub fn upserts(&self) -> Vec<Task> {
        self.lock().upserts.clone()
    }

    /// Make the next upsert fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.lock().failures.push_back(message.into());
    }

    /// Make every upsert of `id` fail until [`Self::heal`] is called.
    pub fn fail_for(&self, id: TaskId) {
        self.lock().failing_ids.insert(id);
    }

    pub fn heal(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.failing_ids.clear();
    }

    /// Simulate another client inserting a row.
    pub fn insert_remote(&self, task: Task) {
        let mut state = self.lock();
        let change = TaskChange::insert(&task);
        state.rows.insert(task.id.clone(), task);
        state.broadcast(&change);
    }

    /// Simulate another client updating a row with a partial payload.
    pub fn update_remote(&self, patch: TaskPatch) -> Result<()> {
        let mut state = self.lock();
        let id = patch
            .id
            .clone()
            .ok_or_else(|| Error::InvalidInput("update payload has no id".to_string()))?;
        let row = state
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        row.apply_patch(&patch);
        state.broadcast(&TaskChange::update(patch));
        Ok(())
    }

    /// Simulate another client deleting a row.
    pub fn delete_remote(&self, id: &TaskId) -> bool {
        let mut state = self.lock();
        if state.rows.remove(id).is_none() {
            return false;
        }
        state.broadcast(&TaskChange::delete(id.clone()));
        true
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteTaskTable for InMemoryTaskTable {
    async fn upsert(&self, task: &Task) -> Result<()> {
        {
            let mut state = self.lock();
            let mut row = task.clone();
            row.origin = None;
            state.upserts.push(row.clone());

            if let Some(message) = state.failures.pop_front() {
                return Err(Error::Remote(message));
            }
            if state.failing_ids.contains(&row.id) {
                return Err(Error::Remote(format!("upsert rejected for {}", row.id)));
            }

            let change = if state.rows.contains_key(&row.id) {
                TaskChange::update(TaskPatch::from(&row))
            } else {
                TaskChange::insert(&row)
            };
            state.rows.insert(row.id.clone(), row);
            state.broadcast(&change);
        }

        tokio::task::yield_now().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_task, Origin};
    use crate::sync::change::ChangeKind;

    #[tokio::test]
    async fn upsert_echoes_to_subscribers() {
        let table = InMemoryTaskTable::new();
        let mut all = table.subscribe(ChangeFilter::All);
        let mut deletes = table.subscribe(ChangeFilter::Only(ChangeKind::Delete));

        let mut task = sample_task("t1");
        task.origin = Some(Origin::Local);
        table.upsert(&task).await.unwrap();
        table.upsert(&task).await.unwrap();

        assert_eq!(all.recv().await.unwrap().kind, ChangeKind::Insert);
        assert_eq!(all.recv().await.unwrap().kind, ChangeKind::Update);
        assert!(deletes.try_recv().is_err());
        assert_eq!(table.row(&task.id).unwrap().origin, None);
    }

    #[tokio::test]
    async fn injected_failures_do_not_write_or_echo() {
        let table = InMemoryTaskTable::new();
        let mut changes = table.subscribe(ChangeFilter::All);
        table.fail_next("boom");

        let error = table.upsert(&sample_task("t1")).await.unwrap_err();
        assert!(error.is_transport());
        assert!(table.rows().is_empty());
        assert!(changes.try_recv().is_err());
        assert_eq!(table.upserts().len(), 1);

        table.upsert(&sample_task("t1")).await.unwrap();
        assert_eq!(table.rows().len(), 1);
    }

    #[test]
    fn remote_edits_are_broadcast() {
        let table = InMemoryTaskTable::new();
        let mut changes = table.subscribe(ChangeFilter::All);

        table.insert_remote(sample_task("r1"));
        table
            .update_remote(TaskPatch {
                id: Some(TaskId::new("r1")),
                status: Some("done".to_string()),
                ..TaskPatch::default()
            })
            .unwrap();
        assert!(table.delete_remote(&TaskId::new("r1")));
        assert!(!table.delete_remote(&TaskId::new("r1")));

        let kinds: Vec<_> = std::iter::from_fn(|| changes.try_recv().ok())
            .map(|change| change.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let table = InMemoryTaskTable::new();
        drop(table.subscribe(ChangeFilter::All));
        table.insert_remote(sample_task("r1"));
        assert!(table.lock().subscribers.is_empty());
    }
}
