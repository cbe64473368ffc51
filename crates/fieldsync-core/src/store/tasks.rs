//! Local task collection shared by the UI and the reconciliation loop.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::clock::SyncClock;
use crate::models::{Origin, Task, TaskId, TaskPatch};
use crate::sync::{ChangeKind, PushScope, TaskChange};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct TaskState {
    tasks: Vec<Task>,
    /// Locally mutated since the last flush
    changed: BTreeSet<TaskId>,
    last_update: i64,
}

impl TaskState {
    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }

    fn put(&mut self, task: Task) {
        match self.position(&task.id) {
            Some(index) => self.tasks[index] = task,
            None => self.tasks.push(task),
        }
    }
}

/// Cloneable handle over the task collection.
///
/// Local mutations advance `last_update` and are published on a watch
/// channel; remote applications do neither.
#[derive(Debug, Clone)]
pub struct TaskStore {
    state: Arc<Mutex<TaskState>>,
    mutations: Arc<watch::Sender<i64>>,
    clock: SyncClock,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(SyncClock::new())
    }
}

impl TaskStore {
    #[must_use]
    pub fn new(clock: SyncClock) -> Self {
        let (mutations, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(TaskState::default())),
            mutations: Arc::new(mutations),
            clock,
        }
    }

    #[must_use]
    pub const fn clock(&self) -> &SyncClock {
        &self.clock
    }

    /// Replace the collection with rows fetched from the remote table.
    pub fn hydrate_remote(&self, tasks: Vec<Task>) {
        let mut state = self.lock();
        state.tasks = tasks
            .into_iter()
            .map(|mut task| {
                task.origin = Some(Origin::Remote);
                task
            })
            .collect();
        state.changed.clear();
    }

    /// Add a locally authored task, replacing any task with the same id.
    pub fn add_task(&self, mut task: Task) -> Task {
        task.origin = Some(Origin::Local);
        let mut state = self.lock();
        state.changed.insert(task.id.clone());
        state.put(task.clone());
        self.touch(state);
        task
    }

    /// Merge a local edit into an existing task.
    pub fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        let mut state = self.lock();
        let index = state
            .position(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        let task = &mut state.tasks[index];
        task.apply_patch(patch);
        task.origin = Some(Origin::Local);
        let updated = task.clone();

        state.changed.insert(id.clone());
        self.touch(state);
        Ok(updated)
    }

    /// Remove a task locally.
    pub fn delete_task(&self, id: &TaskId) -> Result<Task> {
        let mut state = self.lock();
        let index = state
            .position(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        let removed = state.tasks.remove(index);
        state.changed.remove(id);
        self.touch(state);
        Ok(removed)
    }

    /// Apply a remote change tagged `origin = remote`.
    ///
    /// Returns whether local state changed. Last write wins: a pending local
    /// edit of the same task is overwritten and no longer pushed.
    pub fn apply_remote(&self, change: &TaskChange) -> bool {
        let (Some(id), Some(row)) = (change.identifier().cloned(), change.row()) else {
            return false;
        };

        let mut state = self.lock();
        let applied = match change.kind {
            ChangeKind::Insert => {
                let Some(mut task) = row.to_task() else {
                    tracing::warn!(task_id = %id, "Dropping incomplete remote insert");
                    return false;
                };
                task.origin = Some(Origin::Remote);
                state.put(task);
                true
            }
            ChangeKind::Update => {
                if let Some(index) = state.position(&id) {
                    let task = &mut state.tasks[index];
                    task.apply_patch(row);
                    task.origin = Some(Origin::Remote);
                    true
                } else if let Some(mut task) = row.to_task() {
                    task.origin = Some(Origin::Remote);
                    state.tasks.push(task);
                    true
                } else {
                    tracing::debug!(task_id = %id, "Ignoring partial update for unknown task");
                    false
                }
            }
            ChangeKind::Delete => match state.position(&id) {
                Some(index) => {
                    state.tasks.remove(index);
                    true
                }
                None => false,
            },
        };

        if applied {
            state.changed.remove(&id);
        }
        applied
    }

    /// Tasks to push for the given scope; resets the changed set.
    ///
    /// Remote-origin tasks are never candidates.
    pub fn take_push_candidates(&self, scope: PushScope) -> Vec<Task> {
        let mut state = self.lock();
        let changed = std::mem::take(&mut state.changed);
        state
            .tasks
            .iter()
            .filter(|task| task.is_local_origin())
            .filter(|task| match scope {
                PushScope::Changed => changed.contains(&task.id),
                PushScope::AllLocal => true,
            })
            .cloned()
            .collect()
    }

    /// Snapshot of every task.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        let state = self.lock();
        state.position(id).map(|index| state.tasks[index].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Stamp of the last local mutation (0 when there was none).
    pub fn last_update(&self) -> i64 {
        self.lock().last_update
    }

    /// Receiver notified with the new `last_update` after each local mutation.
    pub fn subscribe_mutations(&self) -> watch::Receiver<i64> {
        self.mutations.subscribe()
    }

    fn touch(&self, mut state: MutexGuard<'_, TaskState>) {
        let stamp = self.clock.tick();
        state.last_update = stamp;
        drop(state);
        self.mutations.send_replace(stamp);
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_task;
    use pretty_assertions::assert_eq;

    #[test]
    fn local_mutations_advance_last_update() {
        let store = TaskStore::default();
        assert_eq!(store.last_update(), 0);

        store.add_task(sample_task("t1"));
        let after_add = store.last_update();
        assert!(after_add > 0);

        store
            .update_task(&TaskId::new("t1"), &TaskPatch {
                status: Some("done".to_string()),
                ..TaskPatch::default()
            })
            .unwrap();
        assert!(store.last_update() > after_add);
        assert_eq!(store.get(&TaskId::new("t1")).unwrap().origin, Some(Origin::Local));
    }

    #[test]
    fn adding_an_existing_id_replaces_it() {
        let store = TaskStore::default();
        store.add_task(sample_task("t1"));
        let mut replacement = sample_task("t1");
        replacement.title = "Renamed".to_string();
        store.add_task(replacement);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&TaskId::new("t1")).unwrap().title, "Renamed");
    }

    #[test]
    fn update_and_delete_unknown_task_fail() {
        let store = TaskStore::default();
        let id = TaskId::new("missing");
        assert!(matches!(
            store.update_task(&id, &TaskPatch::default()),
            Err(Error::TaskNotFound(_))
        ));
        assert!(matches!(store.delete_task(&id), Err(Error::TaskNotFound(_))));
    }

    #[test]
    fn remote_changes_do_not_count_as_local_mutations() {
        let store = TaskStore::default();
        let mut mutations = store.subscribe_mutations();

        assert!(store.apply_remote(&TaskChange::insert(&sample_task("t1"))));
        assert_eq!(store.last_update(), 0);
        assert!(!mutations.has_changed().unwrap());
        assert_eq!(store.get(&TaskId::new("t1")).unwrap().origin, Some(Origin::Remote));
    }

    #[test]
    fn remote_update_merges_and_delete_removes() {
        let store = TaskStore::default();
        store.add_task(sample_task("t1"));

        let applied = store.apply_remote(&TaskChange::update(TaskPatch {
            id: Some(TaskId::new("t1")),
            priority: Some("low".to_string()),
            ..TaskPatch::default()
        }));
        assert!(applied);
        let task = store.get(&TaskId::new("t1")).unwrap();
        assert_eq!(task.priority, "low");
        assert_eq!(task.title, "Maintenance t1");
        assert_eq!(task.origin, Some(Origin::Remote));

        assert!(store.apply_remote(&TaskChange::delete(TaskId::new("t1"))));
        assert!(store.is_empty());
        assert!(!store.apply_remote(&TaskChange::delete(TaskId::new("t1"))));
    }

    #[test]
    fn incomplete_remote_insert_is_dropped() {
        let store = TaskStore::default();
        let change = TaskChange {
            kind: ChangeKind::Insert,
            new: Some(TaskPatch {
                id: Some(TaskId::new("t1")),
                title: Some("No date".to_string()),
                ..TaskPatch::default()
            }),
            old: None,
        };
        assert!(!store.apply_remote(&change));
        assert!(store.is_empty());
    }

    #[test]
    fn dropped_remote_change_keeps_pending_local_edit() {
        let store = TaskStore::default();
        store.add_task(sample_task("t1"));

        let incomplete = TaskChange {
            kind: ChangeKind::Insert,
            new: Some(TaskPatch {
                id: Some(TaskId::new("t1")),
                title: Some("No date".to_string()),
                ..TaskPatch::default()
            }),
            old: None,
        };
        assert!(!store.apply_remote(&incomplete));

        let candidates = store.take_push_candidates(PushScope::Changed);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Maintenance t1");
    }

    #[test]
    fn changed_scope_only_returns_mutated_local_tasks() {
        let store = TaskStore::default();
        store.add_task(sample_task("t1"));
        store.add_task(sample_task("t2"));
        store.apply_remote(&TaskChange::insert(&sample_task("r1")));

        let first: Vec<_> = store
            .take_push_candidates(PushScope::Changed)
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(first, vec![TaskId::new("t1"), TaskId::new("t2")]);

        store
            .update_task(&TaskId::new("t2"), &TaskPatch::default())
            .unwrap();
        let second: Vec<_> = store
            .take_push_candidates(PushScope::Changed)
            .into_iter()
            .map(|task| task.id)
            .collect();
        assert_eq!(second, vec![TaskId::new("t2")]);
    }

    #[test]
    fn all_local_scope_returns_every_non_remote_task() {
        let store = TaskStore::default();
        store.add_task(sample_task("t1"));
        store.add_task(sample_task("t2"));
        store.apply_remote(&TaskChange::insert(&sample_task("r1")));
        store.take_push_candidates(PushScope::Changed);

        let candidates = store.take_push_candidates(PushScope::AllLocal);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(Task::is_local_origin));
    }

    #[test]
    fn remote_write_supersedes_pending_local_edit() {
        let store = TaskStore::default();
        store.add_task(sample_task("t1"));
        store.apply_remote(&TaskChange::insert(&sample_task("t1")));

        assert!(store.take_push_candidates(PushScope::Changed).is_empty());
    }

    #[test]
    fn hydrate_marks_rows_remote() {
        let store = TaskStore::default();
        store.hydrate_remote(vec![sample_task("t1"), sample_task("t2")]);
        assert_eq!(store.len(), 2);
        assert!(store.take_push_candidates(PushScope::AllLocal).is_empty());
        assert_eq!(store.last_update(), 0);
    }
}
