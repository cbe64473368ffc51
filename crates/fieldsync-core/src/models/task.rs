//! Task model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::is_blank;

/// Opaque task identifier assigned by whichever side created the task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which side authored the latest state of a task.
///
/// Only used to route sync traffic; never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// A scheduled field-service task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Client reference
    pub client: String,
    /// ISO date (`YYYY-MM-DD`) or date-time
    pub date: String,
    pub start_time: String,
    pub status: String,
    pub priority: String,
    #[serde(skip)]
    pub origin: Option<Origin>,
}

impl Task {
    /// Whether every required field carries a value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [
            self.id.as_str(),
            self.title.as_str(),
            self.client.as_str(),
            self.date.as_str(),
            self.start_time.as_str(),
            self.status.as_str(),
            self.priority.as_str(),
        ]
        .iter()
        .all(|value| !is_blank(value))
    }

    /// True unless the task was last written by the remote side.
    #[must_use]
    pub fn is_local_origin(&self) -> bool {
        self.origin != Some(Origin::Remote)
    }

    /// Merge provided patch fields into this task, leaving the rest untouched.
    ///
    /// The identifier is never changed by a patch.
    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(client) = &patch.client {
            self.client.clone_from(client);
        }
        if let Some(date) = &patch.date {
            self.date.clone_from(date);
        }
        if let Some(start_time) = &patch.start_time {
            self.start_time.clone_from(start_time);
        }
        if let Some(status) = &patch.status {
            self.status.clone_from(status);
        }
        if let Some(priority) = &patch.priority {
            self.priority.clone_from(priority);
        }
    }
}

/// Partial task payload, as carried by remote change rows and local edits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl TaskPatch {
    /// Build a full task from this patch when every required field is present.
    #[must_use]
    pub fn to_task(&self) -> Option<Task> {
        let task = Task {
            id: self.id.clone()?,
            title: self.title.clone()?,
            client: self.client.clone()?,
            date: self.date.clone()?,
            start_time: self.start_time.clone()?,
            status: self.status.clone()?,
            priority: self.priority.clone()?,
            origin: None,
        };
        task.is_complete().then_some(task)
    }

    /// True when no field is set (realtime sends `{}` for absent rows).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<&Task> for TaskPatch {
    fn from(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: Some(task.title.clone()),
            client: Some(task.client.clone()),
            date: Some(task.date.clone()),
            start_time: Some(task.start_time.clone()),
            status: Some(task.status.clone()),
            priority: Some(task.priority.clone()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_task(id: &str) -> Task {
    Task {
        id: TaskId::new(id),
        title: format!("Maintenance {id}"),
        client: "client-1".to_string(),
        date: "2024-05-14".to_string(),
        start_time: "09:00".to_string(),
        status: "pending".to_string(),
        priority: "high".to_string(),
        origin: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn origin_is_never_serialized() {
        let mut task = sample_task("t1");
        task.origin = Some(Origin::Local);

        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("origin").is_none());
        assert_eq!(json["id"], "t1");
        assert_eq!(json["start_time"], "09:00");
    }

    #[test]
    fn deserialized_task_has_no_origin() {
        let json = serde_json::to_string(&sample_task("t1")).unwrap();
        let task: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(task.origin, None);
        assert!(task.is_local_origin());
    }

    #[test]
    fn is_complete_rejects_blank_fields() {
        let mut task = sample_task("t1");
        assert!(task.is_complete());

        task.client = "  ".to_string();
        assert!(!task.is_complete());
    }

    #[test]
    fn apply_patch_keeps_unspecified_fields() {
        let mut task = sample_task("t1");
        task.apply_patch(&TaskPatch {
            id: Some(TaskId::new("other")),
            status: Some("done".to_string()),
            ..TaskPatch::default()
        });

        assert_eq!(task.id.as_str(), "t1");
        assert_eq!(task.status, "done");
        assert_eq!(task.title, "Maintenance t1");
    }

    #[test]
    fn patch_to_task_requires_every_field() {
        let full = TaskPatch::from(&sample_task("t1"));
        assert_eq!(full.to_task(), Some(sample_task("t1")));

        let partial = TaskPatch {
            id: Some(TaskId::new("t1")),
            title: Some("Only a title".to_string()),
            ..TaskPatch::default()
        };
        assert_eq!(partial.to_task(), None);
    }

    #[test]
    fn empty_object_decodes_as_empty_patch() {
        let patch: TaskPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
    }
}
