//! Local state stores, explicitly constructed and passed to their users.

mod checkpoint;
pub mod persist;
mod reports;
mod tasks;

pub use checkpoint::SyncCheckpoint;
pub use persist::{JsonFileStore, MemoryPersistence, ReportPersistence};
pub use reports::ReportStore;
pub use tasks::TaskStore;
