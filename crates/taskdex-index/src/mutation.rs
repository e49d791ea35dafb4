//! The only write path into [`TaskCache`].

use taskdex_core::{Task, TaskId};
use tracing::debug;

use crate::secondary_index::{IdSet, IndexOp};
use crate::task_cache::TaskCache;

impl TaskCache {
    /// Replace every task of `path` with `tasks`, then record `mtime`.
    ///
    /// Each task's `file_path` is set to `path`. A task id already stored
    /// under another file is moved here. Files left with no task get no
    /// `files` entry.
    pub(crate) fn replace_file_tasks(&mut self, path: &str, tasks: Vec<Task>, mtime: Option<i64>) {
        let removed = self.remove_file(path);

        let mut ids = IdSet::with_capacity(tasks.len());
        for mut task in tasks {
            if task.file_path != path {
                debug!(id = %task.id, from = %task.file_path, to = path, "normalizing task file path");
                task.file_path = path.to_owned();
            }
            if let Some(previous) = self.tasks.remove(&task.id) {
                self.detach(&previous);
            }
            self.apply_indexes(IndexOp::Insert, &task);
            ids.insert(task.id.clone());
            self.tasks.insert(task.id.clone(), task);
        }

        let inserted = ids.len();
        if !ids.is_empty() {
            self.files.insert(path.to_owned(), ids);
        }
        if let Some(mtime) = mtime {
            self.update_file_mtime(path, mtime);
        }

        debug!(path, removed, inserted, ?mtime, "replaced file tasks");
    }

    /// Remove every task of `path`. Returns the number of tasks removed.
    ///
    /// The mtime record of `path` is left in place.
    pub(crate) fn remove_file(&mut self, path: &str) -> usize {
        let Some(ids) = self.files.remove(path) else {
            return 0;
        };
        for id in &ids {
            if let Some(task) = self.tasks.remove(id) {
                self.apply_indexes(IndexOp::Remove, &task);
            }
        }
        ids.len()
    }

    /// Remove a single task. Returns the removed task, if it existed.
    pub(crate) fn remove_task(&mut self, id: &TaskId) -> Option<Task> {
        let task = self.tasks.remove(id)?;
        self.detach(&task);
        debug!(%id, path = %task.file_path, "removed task");
        Some(task)
    }

    /// Drop `task` from the indexes and from its file's id set.
    fn detach(&mut self, task: &Task) {
        self.apply_indexes(IndexOp::Remove, task);
        if let Some(ids) = self.files.get_mut(&task.file_path) {
            ids.remove(&task.id);
            if ids.is_empty() {
                self.files.remove(&task.file_path);
            }
        }
    }

    /// Return to the empty state.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
