//! Domain types for the taskdex task index.

/// Calendar-day keys and timestamps.
pub mod date;
/// File lifecycle notifications.
pub mod event;
/// Identifier types.
pub mod id;
/// Filter and sort descriptions consumed by the query engine.
pub mod query;

pub use crate::date::{DayKey, InvalidDayKey, Timestamp};
pub use crate::event::FileEvent;
pub use crate::id::{BlankTaskId, TaskId};
pub use crate::query::{
    Conjunction, Filter, FilterField, FilterOperator, FilterValue, SortCriterion, SortDirection,
    SortField, SortValue,
};

use serde::{Deserialize, Serialize};

/// A single task extracted from a source file.
///
/// Tasks are authored by an external parser; the index stores them verbatim
/// and never edits their content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable identifier.
    pub id: TaskId,
    /// Path of the file the task was parsed from.
    pub file_path: String,
    /// Zero-based line of the task inside the file.
    #[serde(default)]
    pub line: u32,
    /// Whether the task is checked off.
    #[serde(default)]
    pub completed: bool,
    /// Raw status marker between the brackets (`" "`, `"x"`, `"/"`, ...).
    #[serde(default)]
    pub status: String,
    /// Task text without the checkbox prefix.
    #[serde(default)]
    pub content: String,
    /// Source line as written.
    #[serde(default)]
    pub original_markdown: String,
    /// Typed metadata bag.
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl Task {
    /// Create an open task with empty metadata.
    #[must_use]
    pub fn new(id: impl Into<TaskId>, file_path: impl Into<String>, line: u32) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
            line,
            completed: false,
            status: " ".into(),
            content: String::new(),
            original_markdown: String::new(),
            metadata: TaskMetadata::default(),
        }
    }

    /// Mark the task as completed with the conventional `x` marker.
    #[must_use]
    pub fn completed(mut self) -> Self {
        self.completed = true;
        self.status = "x".into();
        self
    }

    /// Replace the metadata bag.
    #[must_use]
    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Optional typed fields attached to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    /// Hashtags, including the leading `#` when the parser keeps it.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Project the task belongs to.
    #[serde(default)]
    pub project: Option<String>,
    /// Context (`@home`, `@office`, ...).
    #[serde(default)]
    pub context: Option<String>,
    /// Numeric priority; higher is more urgent.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Due date.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<Timestamp>,
    /// Start date.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_date: Option<Timestamp>,
    /// Scheduled date.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_date: Option<Timestamp>,
    /// Completion date.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_date: Option<Timestamp>,
    /// Cancellation date.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cancelled_date: Option<Timestamp>,
    /// Creation date.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_date: Option<Timestamp>,
    /// Recurrence rule as written.
    #[serde(default)]
    pub recurrence: Option<String>,
    /// External task ids this task depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Action to run when the task is completed.
    #[serde(default)]
    pub on_completion: Option<String>,
    /// External task id declared on the task itself.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Ids of child tasks.
    #[serde(default)]
    pub children: Vec<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use time::macros::datetime;

    #[test]
    fn deserializes_partial_task_with_defaults() {
        let raw = r##"{"id":"t1","filePath":"a.md","metadata":{"tags":["#work"]}}"##;
        let task: Task = serde_json::from_str(raw).expect("task must parse");
        assert_eq!(task.id, TaskId::new("t1"));
        assert_eq!(task.line, 0);
        assert!(!task.completed);
        assert_eq!(task.metadata.tags, vec!["#work".to_string()]);
        assert!(task.metadata.due_date.is_none());
    }

    #[test]
    fn dates_round_trip_as_rfc3339() {
        let task = Task::new("t2", "b.md", 3).with_metadata(TaskMetadata {
            due_date: Some(datetime!(2024-05-01 09:00 +02:00)),
            ..TaskMetadata::default()
        });
        let json = serde_json::to_string(&task).expect("serialize");
        assert!(json.contains("\"dueDate\":\"2024-05-01T09:00:00+02:00\""));
        let back: Task = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, task);
    }

    #[test]
    fn completed_sets_marker() {
        let task = Task::new("t3", "c.md", 0).completed();
        assert!(task.completed);
        assert_eq!(task.status, "x");
    }
}
