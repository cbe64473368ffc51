//! Remote change notifications for the tasks table.

use serde::{Deserialize, Serialize};

use crate::models::{Task, TaskId, TaskPatch};
use crate::Result;

/// Row-level event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which event types a subscriber wants (`*` means all)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl ChangeFilter {
    #[must_use]
    pub fn matches(self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == kind,
        }
    }
}

/// One change notification: the event type plus new and/or old row images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChange {
    pub kind: ChangeKind,
    pub new: Option<TaskPatch>,
    pub old: Option<TaskPatch>,
}

impl TaskChange {
    #[must_use]
    pub fn insert(task: &Task) -> Self {
        Self {
            kind: ChangeKind::Insert,
            new: Some(TaskPatch::from(task)),
            old: None,
        }
    }

    #[must_use]
    pub fn update(patch: TaskPatch) -> Self {
        Self {
            kind: ChangeKind::Update,
            new: Some(patch),
            old: None,
        }
    }

    #[must_use]
    pub fn delete(id: TaskId) -> Self {
        Self {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(TaskPatch {
                id: Some(id),
                ..TaskPatch::default()
            }),
        }
    }

    /// The row identifier: the new image's id, falling back to the old one.
    #[must_use]
    pub fn identifier(&self) -> Option<&TaskId> {
        self.new
            .as_ref()
            .and_then(|row| row.id.as_ref())
            .or_else(|| self.old.as_ref().and_then(|row| row.id.as_ref()))
    }

    /// The row image to apply: new for inserts/updates, old for deletes.
    #[must_use]
    pub fn row(&self) -> Option<&TaskPatch> {
        self.new.as_ref().or(self.old.as_ref())
    }

    /// Decode a realtime `postgres_changes` payload.
    ///
    /// Realtime sends `{}` for the missing image (no `old` on inserts, no
    /// `new` on deletes); those are normalized to `None`.
    pub fn from_realtime_json(payload: &str) -> Result<Self> {
        let payload: RealtimePayload = serde_json::from_str(payload)?;
        Ok(payload.into())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealtimePayload {
    event_type: ChangeKind,
    #[serde(default)]
    new: Option<TaskPatch>,
    #[serde(default)]
    old: Option<TaskPatch>,
}

impl From<RealtimePayload> for TaskChange {
    fn from(payload: RealtimePayload) -> Self {
        Self {
            kind: payload.event_type,
            new: payload.new.filter(|row| !row.is_empty()),
            old: payload.old.filter(|row| !row.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_task;

    #[test]
    fn decodes_insert_payload() {
        let payload = r#"
        {
          "schema": "public",
          "table": "tasks",
          "commit_timestamp": "2024-05-14T08:00:00Z",
          "eventType": "INSERT",
          "new": {
            "id": "t1",
            "title": "Contrôle annuel",
            "client": "c-9",
            "date": "2024-05-14",
            "start_time": "09:00",
            "status": "pending",
            "priority": "low",
            "created_at": "2024-05-01T10:00:00Z"
          },
          "old": {},
          "errors": null
        }
        "#;

        let change = TaskChange::from_realtime_json(payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert!(change.old.is_none());
        assert_eq!(change.identifier().map(TaskId::as_str), Some("t1"));
        assert!(change.row().and_then(TaskPatch::to_task).is_some());
    }

    #[test]
    fn delete_payload_uses_old_identifier() {
        let payload = r#"{"eventType":"DELETE","new":{},"old":{"id":"t9"}}"#;

        let change = TaskChange::from_realtime_json(payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert!(change.new.is_none());
        assert_eq!(change.identifier().map(TaskId::as_str), Some("t9"));
    }

    #[test]
    fn unknown_event_type_is_an_error() {
        let payload = r#"{"eventType":"TRUNCATE","new":{},"old":{}}"#;
        assert!(TaskChange::from_realtime_json(payload).is_err());
    }

    #[test]
    fn payload_without_rows_has_no_identifier() {
        let change = TaskChange::from_realtime_json(r#"{"eventType":"UPDATE"}"#).unwrap();
        assert!(change.identifier().is_none());
    }

    #[test]
    fn filter_matches_kinds() {
        assert!(ChangeFilter::All.matches(ChangeKind::Delete));
        assert!(ChangeFilter::Only(ChangeKind::Insert).matches(ChangeKind::Insert));
        assert!(!ChangeFilter::Only(ChangeKind::Insert).matches(ChangeKind::Update));
    }

    #[test]
    fn constructors_carry_identifier() {
        let task = sample_task("t3");
        assert_eq!(
            TaskChange::insert(&task).identifier(),
            Some(&TaskId::new("t3"))
        );
        assert_eq!(
            TaskChange::delete(TaskId::new("t3")).identifier(),
            Some(&TaskId::new("t3"))
        );
    }
}
