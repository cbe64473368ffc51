//! Task reconciliation loop.
//!
//! Inbound: remote notifications are applied to the local store unless they
//! are echoes of our own in-flight writes. Outbound: when the store's last
//! local mutation is newer than the last sync, local tasks are upserted to
//! the remote table. Conflicts are not detected; the last applied write wins.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::BackendConfig;
use crate::models::{Task, TaskId};
use crate::state::SyncState;
use crate::store::{SyncCheckpoint, TaskStore};
use crate::sync::change::TaskChange;
use crate::sync::pending::{PendingGuard, PendingSet};
use crate::sync::remote::RemoteTaskTable;
use crate::sync::validate::{validate_task_dates, InvalidTaskDate};
use crate::{Error, Result};

/// Which local tasks a flush pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushScope {
    /// Only tasks mutated locally since the previous flush.
    #[default]
    Changed,
    /// Every task not last written by the remote side, on every flush.
    AllLocal,
}

impl PushScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::AllLocal => "all-local",
        }
    }
}

impl fmt::Display for PushScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushScope {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "changed" => Ok(Self::Changed),
            "all-local" | "all_local" | "all" => Ok(Self::AllLocal),
            other => Err(Error::Config(format!(
                "unknown push scope '{other}' (expected 'changed' or 'all-local')"
            ))),
        }
    }
}

/// What happened to an inbound notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Applied to the local store.
    Applied,
    /// Identifier is pending: presumed echo of our own write.
    Echo,
    /// No identifier, or nothing to apply.
    Ignored,
}

/// A task upsert that failed; the task stays committed locally.
#[derive(Debug)]
pub struct PushFailure {
    pub id: TaskId,
    pub error: Error,
}

/// Result of one outbound flush
#[derive(Debug, Default)]
pub struct PushSummary {
    pub pushed: Vec<TaskId>,
    pub failed: Vec<PushFailure>,
    /// Tasks flagged by the validation pass (pushed regardless)
    pub invalid_dates: Vec<InvalidTaskDate>,
}

impl PushSummary {
    /// Number of upsert attempts made.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.pushed.len() + self.failed.len()
    }

    /// Pushed ids, or the first transport error when any upsert failed.
    pub fn into_result(self) -> Result<Vec<TaskId>> {
        match self.failed.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.pushed),
        }
    }
}

/// Counters for the lifetime of a reconciler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub applied: usize,
    pub echoes: usize,
    pub ignored: usize,
    pub pushed: usize,
    pub failed: usize,
}

struct PushBatch {
    entries: Vec<(Task, PendingGuard)>,
    invalid_dates: Vec<InvalidTaskDate>,
}

/// Two-way task sync between a [`TaskStore`] and a remote table
pub struct TaskReconciler<R> {
    store: TaskStore,
    checkpoint: SyncCheckpoint,
    remote: R,
    pending: PendingSet,
    scope: PushScope,
    status: watch::Sender<SyncState>,
    stats: Mutex<SyncStats>,
}

impl<R: RemoteTaskTable> TaskReconciler<R> {
    pub fn new(store: TaskStore, checkpoint: SyncCheckpoint, remote: R) -> Self {
        let (status, _) = watch::channel(SyncState::Offline);
        Self {
            store,
            checkpoint,
            remote,
            pending: PendingSet::new(),
            scope: PushScope::default(),
            status,
            stats: Mutex::new(SyncStats::default()),
        }
    }

    #[must_use]
    pub fn with_push_scope(mut self, scope: PushScope) -> Self {
        self.scope = scope;
        self
    }

    /// Apply the push scope from backend configuration.
    #[must_use]
    pub fn with_config(self, config: &BackendConfig) -> Self {
        self.with_push_scope(config.push_scope)
    }

    pub const fn store(&self) -> &TaskStore {
        &self.store
    }

    pub const fn checkpoint(&self) -> &SyncCheckpoint {
        &self.checkpoint
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub const fn push_scope(&self) -> PushScope {
        self.scope
    }

    pub fn status(&self) -> watch::Receiver<SyncState> {
        self.status.subscribe()
    }

    pub fn stats(&self) -> SyncStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one inbound notification.
    pub fn handle_change(&self, change: &TaskChange) -> ChangeOutcome {
        let outcome = match change.identifier() {
            None => {
                tracing::debug!(kind = ?change.kind, "Ignoring change without identifier");
                ChangeOutcome::Ignored
            }
            Some(id) if self.pending.contains(id) => {
                tracing::debug!(task_id = %id, kind = ?change.kind, "Suppressing echo of local write");
                ChangeOutcome::Echo
            }
            Some(id) => {
                if self.store.apply_remote(change) {
                    self.checkpoint.advance();
                    tracing::debug!(task_id = %id, kind = ?change.kind, "Applied remote change");
                    ChangeOutcome::Applied
                } else {
                    ChangeOutcome::Ignored
                }
            }
        };

        self.record(|stats| match outcome {
            ChangeOutcome::Applied => stats.applied += 1,
            ChangeOutcome::Echo => stats.echoes += 1,
            ChangeOutcome::Ignored => stats.ignored += 1,
        });
        outcome
    }

    /// Run the date validation pass over the current tasks.
    pub fn validate(&self) -> Vec<InvalidTaskDate> {
        validate_task_dates(&self.store.tasks())
    }

    /// Whether the store holds local mutations newer than the last sync.
    pub fn is_flush_due(&self) -> bool {
        self.checkpoint.is_due(self.store.last_update())
    }

    /// Push local changes if a flush is due.
    ///
    /// Failed upserts are not retried. They leave the task committed locally
    /// and are reported in the summary.
    pub async fn push_local_changes(&self) -> PushSummary {
        match self.begin_push() {
            Some(batch) => {
                let summary = self.settle(batch).await;
                self.finish_push(&summary);
                summary
            }
            None => PushSummary::default(),
        }
    }

    /// Consume remote changes and push local ones until `shutdown` fires
    /// (or its sender is dropped) or the change stream closes.
    ///
    /// The change receiver is dropped on exit, which tears the subscription
    /// down. Upserts already in flight are awaited, not cancelled.
    pub async fn run(
        &self,
        mut changes: mpsc::UnboundedReceiver<TaskChange>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut mutations = self.store.subscribe_mutations();
        mutations.borrow_and_update();
        self.validate();
        self.status.send_replace(SyncState::Synced);
        tracing::info!(scope = %self.scope, "Task reconciliation started");

        let mut in_flight = FuturesUnordered::new();
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::debug!("Task reconciliation shutdown requested");
                    break;
                }
                change = changes.recv() => {
                    let Some(change) = change else {
                        tracing::debug!("Remote change stream closed");
                        break;
                    };
                    self.handle_change(&change);
                }
                changed = mutations.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(batch) = self.begin_push() {
                        in_flight.push(self.settle(batch));
                    }
                }
                Some(summary) = in_flight.next(), if !in_flight.is_empty() => {
                    self.finish_push(&summary);
                }
            }
        }

        drop(changes);
        while let Some(summary) = in_flight.next().await {
            self.finish_push(&summary);
        }
        self.status.send_replace(SyncState::Offline);
        tracing::info!("Task reconciliation stopped");
    }

    /// Select candidates and mark them pending, all before the first await,
    /// so an echo can never arrive ahead of its pending marker.
    fn begin_push(&self) -> Option<PushBatch> {
        if !self.is_flush_due() {
            return None;
        }

        let invalid_dates = self.validate();
        let entries: Vec<(Task, PendingGuard)> = self
            .store
            .take_push_candidates(self.scope)
            .into_iter()
            .map(|mut task| {
                task.origin = None;
                let guard = self.pending.acquire(task.id.clone());
                (task, guard)
            })
            .collect();
        self.checkpoint.advance();

        if entries.is_empty() {
            return None;
        }

        self.status.send_replace(SyncState::Syncing);
        tracing::debug!(count = entries.len(), "Pushing local task changes");
        Some(PushBatch {
            entries,
            invalid_dates,
        })
    }

    async fn settle(&self, batch: PushBatch) -> PushSummary {
        let results = futures::future::join_all(batch.entries.into_iter().map(
            |(task, guard)| async move {
                let result = self.remote.upsert(&task).await;
                drop(guard);
                (task.id, result)
            },
        ))
        .await;

        let mut summary = PushSummary {
            invalid_dates: batch.invalid_dates,
            ..PushSummary::default()
        };
        for (id, result) in results {
            match result {
                Ok(()) => summary.pushed.push(id),
                Err(error) => summary.failed.push(PushFailure { id, error }),
            }
        }
        summary
    }

    fn finish_push(&self, summary: &PushSummary) {
        for failure in &summary.failed {
            tracing::warn!(
                task_id = %failure.id,
                error = %failure.error,
                "Task upsert failed; change kept locally"
            );
        }

        self.record(|stats| {
            stats.pushed += summary.pushed.len();
            stats.failed += summary.failed.len();
        });

        let state = if summary.failed.is_empty() {
            SyncState::Synced
        } else {
            SyncState::Error
        };
        self.status.send_replace(state);
        tracing::info!(
            pushed = summary.pushed.len(),
            failed = summary.failed.len(),
            "Local task changes flushed"
        );
    }

    fn record(&self, update: impl FnOnce(&mut SyncStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut *stats);
    }
}
