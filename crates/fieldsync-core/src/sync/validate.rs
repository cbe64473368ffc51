//! Observational date validation run before each reconciliation pass.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::{Task, TaskId};

/// A task whose `date` field does not parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTaskDate {
    pub id: TaskId,
    pub date: String,
}

/// Whether `value` is a well-formed ISO date or date-time.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 date-times and offset-less
/// `YYYY-MM-DDTHH:MM[:SS[.fff]]`. Calendar validity is enforced, so
/// `2024-13-45` is rejected.
pub fn is_valid_task_date(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
        || ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
}

/// Report tasks with malformed dates. Never blocks sync.
pub fn validate_task_dates(tasks: &[Task]) -> Vec<InvalidTaskDate> {
    let invalid: Vec<InvalidTaskDate> = tasks
        .iter()
        .filter(|task| !is_valid_task_date(&task.date))
        .map(|task| InvalidTaskDate {
            id: task.id.clone(),
            date: task.date.clone(),
        })
        .collect();

    if !invalid.is_empty() {
        tracing::warn!(
            count = invalid.len(),
            ids = ?invalid.iter().map(|task| task.id.as_str()).collect::<Vec<_>>(),
            "Invalid task dates detected"
        );
    }

    invalid
}
