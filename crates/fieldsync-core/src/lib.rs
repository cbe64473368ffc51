//! fieldsync-core - Core library for Fieldsync
//!
//! This crate contains the task and intervention report stores, the realtime
//! reconciliation loop between local and remote tasks, the report lifecycle,
//! and the backend adapters a field-service client embeds.

pub mod adapters;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use clock::SyncClock;
pub use config::BackendConfig;
pub use error::{Error, Result};
pub use lifecycle::{Eligibility, GuardViolation};
pub use models::{InterventionReport, ReportId, ReportStatus, Task, TaskId};
pub use state::SyncState;
pub use store::{ReportStore, SyncCheckpoint, TaskStore};
pub use sync::{PushScope, TaskChange, TaskReconciler};
