//! Owned, serializable copy of the cache state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use taskdex_core::{DayKey, Task, TaskId};
use tracing::{info, warn};

use crate::error::SnapshotError;
use crate::mtime::MtimeRecord;
use crate::secondary_index::SecondaryIndex;
use crate::task_cache::TaskCache;

/// Schema version written by [`TaskCache::snapshot`].
///
/// * 1: tasks, files and the tag/project/context/date/completion/priority indexes.
/// * 2: adds the cancelled date, on-completion, dependency and task-id indexes.
/// * 3: adds the per-file mtime and processed-time maps.
pub const SNAPSHOT_VERSION: u32 = 3;

const fn legacy_version() -> u32 {
    1
}

/// Whole-cache snapshot.
///
/// Every derived structure is optional so that snapshots from older schema
/// versions still deserialize; missing pieces are rebuilt on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Schema version; absent in version 1 snapshots.
    #[serde(default = "legacy_version")]
    pub version: u32,
    /// Primary task map.
    pub tasks: BTreeMap<TaskId, Task>,
    /// Task ids per file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, BTreeSet<TaskId>>>,
    /// Tag index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<SecondaryIndex<String>>,
    /// Project index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<SecondaryIndex<String>>,
    /// Context index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<SecondaryIndex<String>>,
    /// Completion index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<SecondaryIndex<bool>>,
    /// Priority index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<SecondaryIndex<i32>>,
    /// Due date index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<SecondaryIndex<DayKey>>,
    /// Start date index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<SecondaryIndex<DayKey>>,
    /// Scheduled date index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<SecondaryIndex<DayKey>>,
    /// Cancelled date index (version 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_date: Option<SecondaryIndex<DayKey>>,
    /// On-completion action index (version 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_completion: Option<SecondaryIndex<String>>,
    /// Dependency index (version 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<SecondaryIndex<String>>,
    /// External task id index (version 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<SecondaryIndex<String>>,
    /// Last seen mtime per file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mtimes: Option<BTreeMap<String, i64>>,
    /// Wall-clock processing time per file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_processed_times: Option<BTreeMap<String, i64>>,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        TaskCache::default().snapshot()
    }
}

/// How a snapshot was brought up to the current schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Every structure was present and consistent.
    Loaded,
    /// Derived structures were missing or inconsistent and were rebuilt.
    Rebuilt,
}

impl TaskCache {
    /// Owned copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            version: SNAPSHOT_VERSION,
            tasks: self
                .tasks
                .iter()
                .map(|(id, task)| (id.clone(), task.clone()))
                .collect(),
            files: Some(
                self.files
                    .iter()
                    .map(|(path, ids)| (path.clone(), ids.iter().cloned().collect()))
                    .collect(),
            ),
            tags: Some(self.tags.clone()),
            projects: Some(self.projects.clone()),
            contexts: Some(self.contexts.clone()),
            completed: Some(self.completed.clone()),
            priority: Some(self.priority.clone()),
            due_date: Some(self.due_date.clone()),
            start_date: Some(self.start_date.clone()),
            scheduled_date: Some(self.scheduled_date.clone()),
            cancelled_date: Some(self.cancelled_date.clone()),
            on_completion: Some(self.on_completion.clone()),
            depends_on: Some(self.depends_on.clone()),
            task_id: Some(self.task_id.clone()),
            file_mtimes: Some(
                self.mtimes
                    .file_mtimes
                    .iter()
                    .map(|(path, mtime)| (path.clone(), *mtime))
                    .collect(),
            ),
            file_processed_times: Some(
                self.mtimes
                    .file_processed_times
                    .iter()
                    .map(|(path, at)| (path.clone(), *at))
                    .collect(),
            ),
        }
    }

    /// Build a cache from a snapshot, migrating older schemas.
    ///
    /// Missing mtime maps start empty. Missing or inconsistent indexes are
    /// rebuilt from the task map, which is always authoritative. Entries whose
    /// map key differs from the task's own id are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::UnsupportedVersion`] for snapshots written by
    /// a newer schema.
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Result<(Self, RestoreOutcome), SnapshotError> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        let CacheSnapshot {
            version,
            tasks,
            files,
            tags,
            projects,
            contexts,
            completed,
            priority,
            due_date,
            start_date,
            scheduled_date,
            cancelled_date,
            on_completion,
            depends_on,
            task_id,
            file_mtimes,
            file_processed_times,
        } = snapshot;

        let stored = tasks.len();
        let tasks: HashMap<TaskId, Task> = tasks
            .into_iter()
            .filter(|(key, task)| *key == task.id)
            .collect();
        let mismatched = stored - tasks.len();
        if mismatched > 0 {
            warn!(mismatched, "dropped snapshot tasks stored under another id");
        }

        let complete = mismatched == 0
            && files.is_some()
            && tags.is_some()
            && projects.is_some()
            && contexts.is_some()
            && completed.is_some()
            && priority.is_some()
            && due_date.is_some()
            && start_date.is_some()
            && scheduled_date.is_some()
            && cancelled_date.is_some()
            && on_completion.is_some()
            && depends_on.is_some()
            && task_id.is_some();

        let mut cache = Self {
            tasks,
            files: files
                .unwrap_or_default()
                .into_iter()
                .map(|(path, ids)| (path, ids.into_iter().collect()))
                .collect(),
            tags: tags.unwrap_or_default(),
            projects: projects.unwrap_or_default(),
            contexts: contexts.unwrap_or_default(),
            completed: completed.unwrap_or_default(),
            priority: priority.unwrap_or_default(),
            due_date: due_date.unwrap_or_default(),
            start_date: start_date.unwrap_or_default(),
            scheduled_date: scheduled_date.unwrap_or_default(),
            cancelled_date: cancelled_date.unwrap_or_default(),
            on_completion: on_completion.unwrap_or_default(),
            depends_on: depends_on.unwrap_or_default(),
            task_id: task_id.unwrap_or_default(),
            mtimes: MtimeRecord {
                file_mtimes: file_mtimes.unwrap_or_default().into_iter().collect(),
                file_processed_times: file_processed_times
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
            },
        };

        if complete && cache.is_consistent() {
            return Ok((cache, RestoreOutcome::Loaded));
        }

        cache.rebuild_indexes();
        info!(
            version,
            tasks = cache.len(),
            "rebuilt indexes while restoring snapshot"
        );
        Ok((cache, RestoreOutcome::Rebuilt))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use taskdex_core::TaskMetadata;

    fn populated() -> TaskCache {
        let mut cache = TaskCache::new();
        let task = Task::new("t1", "a.md", 0).with_metadata(TaskMetadata {
            tags: vec!["#work".into()],
            priority: Some(2),
            ..TaskMetadata::default()
        });
        cache.replace_file_tasks("a.md", vec![task], Some(1000));
        cache
    }

    #[test]
    fn current_snapshot_restores_without_rebuild() {
        let cache = populated();
        let (restored, outcome) = TaskCache::from_snapshot(cache.snapshot()).expect("restore");
        assert_eq!(outcome, RestoreOutcome::Loaded);
        assert_eq!(restored, cache);
    }

    #[test]
    fn legacy_snapshot_without_mtimes_is_migrated() {
        let raw = r##"{
            "tasks": {"t1": {"id": "t1", "filePath": "a.md", "metadata": {"tags": ["#work"]}}},
            "files": {"a.md": ["t1"]},
            "tags": [{"key": "#work", "ids": ["t1"]}],
            "projects": [],
            "contexts": [],
            "completed": [{"key": false, "ids": ["t1"]}],
            "priority": [],
            "dueDate": [],
            "startDate": [],
            "scheduledDate": []
        }"##;
        let snapshot: CacheSnapshot = serde_json::from_str(raw).expect("parse");
        assert_eq!(snapshot.version, 1);

        let (cache, outcome) = TaskCache::from_snapshot(snapshot).expect("restore");
        assert_eq!(outcome, RestoreOutcome::Rebuilt);
        assert!(cache.mtimes().is_empty());
        assert!(cache.is_file_changed("a.md", 0));
        assert!(cache.tags().contains(&"#work".to_string(), &"t1".into()));
        assert!(cache.is_consistent());
    }

    #[test]
    fn dangling_index_entries_trigger_rebuild() {
        let mut snapshot = populated().snapshot();
        snapshot.tasks.clear();
        let (cache, outcome) = TaskCache::from_snapshot(snapshot).expect("restore");
        assert_eq!(outcome, RestoreOutcome::Rebuilt);
        assert!(cache.tags().is_empty());
        assert!(cache.task_ids_for_file("a.md").is_none());
        assert_eq!(cache.mtimes().last_mtime("a.md"), Some(1000));
    }

    #[test]
    fn tasks_under_a_foreign_key_are_dropped() {
        let mut snapshot = populated().snapshot();
        let mut stray = Task::new("t9", "b.md", 0);
        stray.metadata.tags = vec!["#stray".into()];
        snapshot.tasks.insert(TaskId::new("other"), stray);

        let (mut cache, outcome) = TaskCache::from_snapshot(snapshot).expect("restore");
        assert_eq!(outcome, RestoreOutcome::Rebuilt);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&"other".into()).is_none());
        assert!(cache.get(&"t9".into()).is_none());
        assert!(cache.tags().get(&"#stray".to_string()).is_none());
        assert!(cache.task_ids_for_file("b.md").is_none());
        assert!(cache.is_consistent());

        assert_eq!(cache.remove_file("a.md"), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn newer_versions_are_rejected() {
        let snapshot = CacheSnapshot {
            version: SNAPSHOT_VERSION + 1,
            ..CacheSnapshot::default()
        };
        let err = TaskCache::from_snapshot(snapshot).expect_err("must fail");
        assert_eq!(
            err,
            SnapshotError::UnsupportedVersion {
                found: SNAPSHOT_VERSION + 1,
                supported: SNAPSHOT_VERSION,
            }
        );
    }

    #[test]
    fn snapshot_json_round_trips() {
        let cache = populated();
        let json = serde_json::to_string(&cache.snapshot()).expect("serialize");
        let parsed: CacheSnapshot = serde_json::from_str(&json).expect("deserialize");
        let (restored, _) = TaskCache::from_snapshot(parsed).expect("restore");
        assert_eq!(restored, cache);
    }
}
