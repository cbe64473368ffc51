//! Data models for Fieldsync

mod report;
mod task;

pub use report::{InterventionReport, NewReport, ReportId, ReportPatch, ReportStatus};
pub use task::{Origin, Task, TaskId, TaskPatch};

#[cfg(test)]
pub(crate) use report::sample_new_report;
#[cfg(test)]
pub(crate) use task::sample_task;
