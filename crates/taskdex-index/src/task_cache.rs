//! In-memory task store with secondary indexes.

use std::collections::HashMap;

use taskdex_core::{DayKey, Task, TaskId};

use crate::mtime::MtimeRecord;
use crate::secondary_index::{IdSet, IndexOp, SecondaryIndex};

/// Primary task map plus every derived lookup structure.
///
/// Reads are public; writes go through the mutation methods so that the
/// secondary indexes never drift from [`tasks`](Self::tasks).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCache {
    pub(crate) tasks: HashMap<TaskId, Task>,
    pub(crate) files: HashMap<String, IdSet>,
    pub(crate) tags: SecondaryIndex<String>,
    pub(crate) projects: SecondaryIndex<String>,
    pub(crate) contexts: SecondaryIndex<String>,
    pub(crate) completed: SecondaryIndex<bool>,
    pub(crate) priority: SecondaryIndex<i32>,
    pub(crate) due_date: SecondaryIndex<DayKey>,
    pub(crate) start_date: SecondaryIndex<DayKey>,
    pub(crate) scheduled_date: SecondaryIndex<DayKey>,
    pub(crate) cancelled_date: SecondaryIndex<DayKey>,
    pub(crate) on_completion: SecondaryIndex<String>,
    pub(crate) depends_on: SecondaryIndex<String>,
    pub(crate) task_id: SecondaryIndex<String>,
    pub(crate) mtimes: MtimeRecord,
}

impl TaskCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Iterate over every stored task in arbitrary order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Owned copy of every stored task.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    /// Number of stored tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the cache holds no task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Every stored task id.
    #[must_use]
    pub fn task_ids(&self) -> IdSet {
        self.tasks.keys().cloned().collect()
    }

    /// Ids of the tasks parsed from `path`.
    #[must_use]
    pub fn task_ids_for_file(&self, path: &str) -> Option<&IdSet> {
        self.files.get(path)
    }

    /// Paths that currently contribute at least one task.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Tag index.
    #[must_use]
    pub const fn tags(&self) -> &SecondaryIndex<String> {
        &self.tags
    }

    /// Project index.
    #[must_use]
    pub const fn projects(&self) -> &SecondaryIndex<String> {
        &self.projects
    }

    /// Context index.
    #[must_use]
    pub const fn contexts(&self) -> &SecondaryIndex<String> {
        &self.contexts
    }

    /// Completion index.
    #[must_use]
    pub const fn completed(&self) -> &SecondaryIndex<bool> {
        &self.completed
    }

    /// Priority index.
    #[must_use]
    pub const fn priority(&self) -> &SecondaryIndex<i32> {
        &self.priority
    }

    /// Due date index.
    #[must_use]
    pub const fn due_date(&self) -> &SecondaryIndex<DayKey> {
        &self.due_date
    }

    /// Start date index.
    #[must_use]
    pub const fn start_date(&self) -> &SecondaryIndex<DayKey> {
        &self.start_date
    }

    /// Scheduled date index.
    #[must_use]
    pub const fn scheduled_date(&self) -> &SecondaryIndex<DayKey> {
        &self.scheduled_date
    }

    /// Cancelled date index.
    #[must_use]
    pub const fn cancelled_date(&self) -> &SecondaryIndex<DayKey> {
        &self.cancelled_date
    }

    /// On-completion action index.
    #[must_use]
    pub const fn on_completion(&self) -> &SecondaryIndex<String> {
        &self.on_completion
    }

    /// Dependency index, keyed by the external id depended upon.
    #[must_use]
    pub const fn depends_on(&self) -> &SecondaryIndex<String> {
        &self.depends_on
    }

    /// External task id index.
    #[must_use]
    pub const fn task_id(&self) -> &SecondaryIndex<String> {
        &self.task_id
    }

    /// Per-file modification bookkeeping.
    #[must_use]
    pub const fn mtimes(&self) -> &MtimeRecord {
        &self.mtimes
    }

    /// Add or remove every index entry implied by `task`.
    ///
    /// Insert and remove walk the same keys, so removal is the exact inverse
    /// of insertion.
    pub(crate) fn apply_indexes(&mut self, op: IndexOp, task: &Task) {
        let id = &task.id;
        let meta = &task.metadata;

        for tag in &meta.tags {
            self.tags.apply(op, tag.clone(), id);
        }
        if let Some(project) = &meta.project {
            self.projects.apply(op, project.clone(), id);
        }
        if let Some(context) = &meta.context {
            self.contexts.apply(op, context.clone(), id);
        }
        self.completed.apply(op, task.completed, id);
        if let Some(priority) = meta.priority {
            self.priority.apply(op, priority, id);
        }
        if let Some(due) = meta.due_date {
            self.due_date.apply(op, DayKey::of(due), id);
        }
        if let Some(start) = meta.start_date {
            self.start_date.apply(op, DayKey::of(start), id);
        }
        if let Some(scheduled) = meta.scheduled_date {
            self.scheduled_date.apply(op, DayKey::of(scheduled), id);
        }
        if let Some(cancelled) = meta.cancelled_date {
            self.cancelled_date.apply(op, DayKey::of(cancelled), id);
        }
        if let Some(action) = &meta.on_completion {
            self.on_completion.apply(op, action.clone(), id);
        }
        for dependency in &meta.depends_on {
            self.depends_on.apply(op, dependency.clone(), id);
        }
        if let Some(task_id) = &meta.task_id {
            self.task_id.apply(op, task_id.clone(), id);
        }
    }

    /// Drop every derived structure and rebuild it from the primary map.
    pub(crate) fn rebuild_indexes(&mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        let mtimes = std::mem::take(&mut self.mtimes);
        *self = Self {
            mtimes,
            ..Self::default()
        };
        for task in tasks.values() {
            self.apply_indexes(IndexOp::Insert, task);
            self.files
                .entry(task.file_path.clone())
                .or_default()
                .insert(task.id.clone());
        }
        self.tasks = tasks;
    }

    /// Whether the derived structures agree with the primary map.
    pub(crate) fn is_consistent(&self) -> bool {
        let known = |id: &TaskId| self.tasks.contains_key(id);
        let file_count: usize = self.files.values().map(IdSet::len).sum();
        let files_match = file_count == self.tasks.len()
            && self.files.iter().all(|(path, ids)| {
                !ids.is_empty()
                    && ids
                        .iter()
                        .all(|id| self.tasks.get(id).is_some_and(|t| &t.file_path == path))
            });

        files_match
            && self.tags.all_ids(known)
            && self.projects.all_ids(known)
            && self.contexts.all_ids(known)
            && self.completed.all_ids(known)
            && self.priority.all_ids(known)
            && self.due_date.all_ids(known)
            && self.start_date.all_ids(known)
            && self.scheduled_date.all_ids(known)
            && self.cancelled_date.all_ids(known)
            && self.on_completion.all_ids(known)
            && self.depends_on.all_ids(known)
            && self.task_id.all_ids(known)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use taskdex_core::TaskMetadata;
    use time::macros::datetime;

    fn rich_task() -> Task {
        Task::new("t1", "a.md", 0).with_metadata(TaskMetadata {
            tags: vec!["#work".into(), "#urgent".into()],
            project: Some("alpha".into()),
            context: Some("@office".into()),
            priority: Some(3),
            due_date: Some(datetime!(2024-05-01 23:30 -05:00)),
            depends_on: vec!["dep-1".into()],
            task_id: Some("ext-1".into()),
            on_completion: Some("delete".into()),
            ..TaskMetadata::default()
        })
    }

    #[test]
    fn apply_indexes_insert_then_remove_leaves_nothing_behind() {
        let mut cache = TaskCache::new();
        let task = rich_task();

        cache.apply_indexes(IndexOp::Insert, &task);
        assert!(cache.tags().contains(&"#urgent".to_string(), &task.id));
        assert!(cache.projects().contains(&"alpha".to_string(), &task.id));
        assert!(cache.completed().contains(&false, &task.id));
        assert!(cache.priority().contains(&3, &task.id));
        assert!(cache.depends_on().contains(&"dep-1".to_string(), &task.id));

        cache.apply_indexes(IndexOp::Remove, &task);
        assert_eq!(cache, TaskCache::new());
    }

    #[test]
    fn dates_are_keyed_by_authored_calendar_day() {
        let mut cache = TaskCache::new();
        let task = rich_task();
        cache.apply_indexes(IndexOp::Insert, &task);

        let key: DayKey = "2024-05-01".parse().expect("day key");
        assert!(cache.due_date().contains(&key, &task.id));
    }

    #[test]
    fn rebuild_restores_consistency() {
        let mut cache = TaskCache::new();
        let task = rich_task();
        cache.tasks.insert(task.id.clone(), task.clone());
        assert!(!cache.is_consistent());

        cache.rebuild_indexes();
        assert!(cache.is_consistent());
        assert!(cache.task_ids_for_file("a.md").expect("file").contains(&task.id));
        assert!(cache.contexts().contains(&"@office".to_string(), &task.id));
    }
}
