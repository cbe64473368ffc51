//! Realtime reconciliation between the local task store and a remote table.

mod change;
mod pending;
mod reconcile;
mod remote;
mod validate;

pub use change::{ChangeFilter, ChangeKind, TaskChange};
pub use pending::{PendingGuard, PendingSet};
pub use reconcile::{
    ChangeOutcome, PushFailure, PushScope, PushSummary, SyncStats, TaskReconciler,
};
pub use remote::{InMemoryTaskTable, RemoteTaskTable};
pub use validate::{is_valid_task_date, validate_task_dates, InvalidTaskDate};
