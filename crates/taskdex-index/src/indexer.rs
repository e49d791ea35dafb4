//! Owned facade tying the cache, the mtime bookkeeping and the query engine
//! together.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use taskdex_core::{FileEvent, Filter, SortCriterion, Task, TaskId};
use tracing::{debug, info, warn};

use crate::config::IndexerConfig;
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{IndexError, Result};
use crate::mtime::{ConsistencyReport, now_millis};
use crate::parser::TaskParser;
use crate::query::QueryEngine;
use crate::secondary_index::{IdSet, SecondaryIndex};
use crate::snapshot::{CacheSnapshot, RestoreOutcome};
use crate::task_cache::TaskCache;

/// What [`TaskIndexer::index_file`] or [`TaskIndexer::handle_event`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The file was parsed and its tasks replaced.
    Indexed {
        /// Number of tasks now stored for the file.
        tasks: usize,
    },
    /// The cached tasks were still valid for the reported mtime.
    Unchanged,
    /// The parser failed; nothing was modified.
    ParseFailed,
    /// The file's tasks were dropped.
    Removed {
        /// Number of tasks removed.
        tasks: usize,
    },
}

/// Incremental task index over a set of source files.
pub struct TaskIndexer {
    cache: TaskCache,
    last_index_times: HashMap<String, i64>,
    config: IndexerConfig,
    diagnostics: Arc<dyn Diagnostics>,
}

impl fmt::Debug for TaskIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskIndexer")
            .field("tasks", &self.cache.len())
            .field("files", &self.cache.files.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for TaskIndexer {
    fn default() -> Self {
        Self::new(IndexerConfig::default())
    }
}

impl TaskIndexer {
    /// Create an empty indexer reporting through `tracing`.
    #[must_use]
    pub fn new(config: IndexerConfig) -> Self {
        Self {
            cache: TaskCache::new(),
            last_index_times: HashMap::new(),
            config,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Replace the diagnostics sink.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Borrowed live view of the cache.
    #[must_use]
    pub const fn cache(&self) -> &TaskCache {
        &self.cache
    }

    /// Look up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.cache.get(id)
    }

    /// Owned copy of every task.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<Task> {
        self.cache.all_tasks()
    }

    /// Number of indexed tasks.
    #[must_use]
    pub fn total_task_count(&self) -> usize {
        self.cache.len()
    }

    /// Ids of the tasks in `project`, sorted.
    #[must_use]
    pub fn task_ids_by_project(&self, project: &str) -> Vec<TaskId> {
        sorted_ids(self.cache.projects(), &project.to_owned())
    }

    /// Ids of the tasks tagged `tag`, sorted.
    #[must_use]
    pub fn task_ids_by_tag(&self, tag: &str) -> Vec<TaskId> {
        sorted_ids(self.cache.tags(), &tag.to_owned())
    }

    /// Ids of the completed (or open) tasks, sorted.
    #[must_use]
    pub fn task_ids_by_completion(&self, completed: bool) -> Vec<TaskId> {
        sorted_ids(self.cache.completed(), &completed)
    }

    /// Ids of the tasks parsed from `path`, sorted.
    #[must_use]
    pub fn task_ids_for_file(&self, path: &str) -> Vec<TaskId> {
        sorted(self.cache.task_ids_for_file(path))
    }

    /// Paths holding at least one task, sorted.
    #[must_use]
    pub fn file_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.cache.file_paths().collect();
        paths.sort_unstable();
        paths
    }

    /// Owned copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        self.cache.snapshot()
    }

    /// Replace the state with `snapshot`, migrating older schemas.
    ///
    /// # Errors
    /// Returns [`IndexError::Snapshot`] when the snapshot was written by a
    /// newer schema; the current state is kept in that case.
    pub fn restore(&mut self, snapshot: CacheSnapshot) -> Result<RestoreOutcome> {
        let (cache, outcome) = TaskCache::from_snapshot(snapshot)?;
        self.cache = cache;
        self.last_index_times.clear();
        info!(
            tasks = self.cache.len(),
            files = self.cache.files.len(),
            ?outcome,
            "restored task index"
        );
        Ok(outcome)
    }

    /// Drop every task and all bookkeeping.
    pub fn reset(&mut self) {
        self.cache.reset();
        self.last_index_times.clear();
        info!("reset task index");
    }

    /// Replace the tasks of `path` and record `mtime` when given.
    pub fn replace_file_tasks(&mut self, path: &str, tasks: Vec<Task>, mtime: Option<i64>) {
        self.cache.replace_file_tasks(path, tasks, mtime);
        self.last_index_times.insert(path.to_owned(), now_millis());
    }

    /// Remove every task of `path`. The mtime record is kept.
    pub fn remove_file(&mut self, path: &str) -> usize {
        let removed = self.cache.remove_file(path);
        self.last_index_times.remove(path);
        debug!(path, removed, "removed file from index");
        removed
    }

    /// Remove a single task. The mtime of its file is kept.
    pub fn remove_task(&mut self, id: &TaskId) -> Option<Task> {
        self.cache.remove_task(id)
    }

    /// Tasks are authored in source files; always fails.
    ///
    /// # Errors
    /// Always returns [`IndexError::UnsupportedOperation`].
    #[allow(clippy::unused_self)]
    pub fn create_task(&mut self, task: &Task) -> Result<()> {
        Err(unsupported("create_task", &task.id))
    }

    /// Tasks are authored in source files; always fails.
    ///
    /// # Errors
    /// Always returns [`IndexError::UnsupportedOperation`].
    #[allow(clippy::unused_self)]
    pub fn update_task(&mut self, id: &TaskId, _task: &Task) -> Result<()> {
        Err(unsupported("update_task", id))
    }

    /// Tasks are authored in source files; always fails.
    ///
    /// # Errors
    /// Always returns [`IndexError::UnsupportedOperation`].
    #[allow(clippy::unused_self)]
    pub fn delete_task(&mut self, id: &TaskId) -> Result<()> {
        Err(unsupported("delete_task", id))
    }

    /// `true` when `path` is unknown or its stored mtime is older than `current`.
    #[must_use]
    pub fn is_file_changed(&self, path: &str, current: i64) -> bool {
        self.cache.is_file_changed(path, current)
    }

    /// `true` when `path` has tasks and is unchanged at `current`.
    #[must_use]
    pub fn has_valid_cache(&self, path: &str, current: i64) -> bool {
        self.cache.has_valid_cache(path, current)
    }

    /// Record `mtime` for `path` without touching its tasks.
    pub fn update_file_mtime(&mut self, path: &str, mtime: i64) {
        self.cache.update_file_mtime(path, mtime);
    }

    /// Stored mtime of `path`.
    #[must_use]
    pub fn file_last_mtime(&self, path: &str) -> Option<i64> {
        self.cache.mtimes().last_mtime(path)
    }

    /// Wall-clock time at which the mtime of `path` was last recorded.
    #[must_use]
    pub fn file_processed_time(&self, path: &str) -> Option<i64> {
        self.cache.mtimes().processed_time(path)
    }

    /// Wall-clock time at which the tasks of `path` were last replaced.
    #[must_use]
    pub fn last_index_time(&self, path: &str) -> Option<i64> {
        self.last_index_times.get(path).copied()
    }

    /// Forget everything about `path`: tasks, mtime and processed time.
    pub fn cleanup_file_cache(&mut self, path: &str) {
        let had_mtime = self.cache.mtimes.forget(path);
        let removed = self.remove_file(path);
        debug!(path, removed, had_mtime, "cleaned up file cache");
    }

    /// Drop mtime records of files that hold no task.
    pub fn prune_orphans(&mut self) -> ConsistencyReport {
        self.cache.prune_orphans()
    }

    /// Parse `path` with `parser` and replace its tasks.
    ///
    /// Parser failures go to the diagnostics sink and leave the index as it was.
    pub fn index_file<P>(&mut self, parser: &P, path: &str, mtime: Option<i64>) -> IndexOutcome
    where
        P: TaskParser + ?Sized,
    {
        match parser.parse(path) {
            Ok(tasks) => {
                self.replace_file_tasks(path, tasks, mtime);
                IndexOutcome::Indexed {
                    tasks: self.cache.task_ids_for_file(path).map_or(0, IdSet::len),
                }
            }
            Err(err) => {
                self.diagnostics.parse_failed(path, &err);
                IndexOutcome::ParseFailed
            }
        }
    }

    /// Apply a file lifecycle event.
    pub fn handle_event<P>(&mut self, parser: &P, event: &FileEvent) -> IndexOutcome
    where
        P: TaskParser + ?Sized,
    {
        match event {
            FileEvent::Created { path, mtime } | FileEvent::Modified { path, mtime } => {
                if self.config.skip_unchanged_files
                    && mtime.is_some_and(|m| self.has_valid_cache(path, m))
                {
                    debug!(path = %path, "skipping unchanged file");
                    return IndexOutcome::Unchanged;
                }
                self.index_file(parser, path, *mtime)
            }
            FileEvent::Deleted { path } => IndexOutcome::Removed {
                tasks: self.remove_file(path),
            },
        }
    }

    /// Tasks matching `filters`, ordered by `sort`.
    #[must_use]
    pub fn query(&self, filters: &[Filter], sort: &[SortCriterion]) -> Vec<Task> {
        self.engine().query(filters, sort)
    }

    /// Like [`query`](Self::query) but borrows the tasks from the cache.
    #[must_use]
    pub fn query_refs(&self, filters: &[Filter], sort: &[SortCriterion]) -> Vec<&Task> {
        self.engine().query_refs(filters, sort)
    }

    fn engine(&self) -> QueryEngine<'_> {
        QueryEngine::new(
            &self.cache,
            self.diagnostics.as_ref(),
            self.config.small_store_threshold,
        )
    }
}

fn unsupported(operation: &'static str, id: &TaskId) -> IndexError {
    warn!(operation, %id, "rejected direct task mutation");
    IndexError::UnsupportedOperation { operation }
}

fn sorted(ids: Option<&IdSet>) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> = ids.into_iter().flatten().cloned().collect();
    ids.sort_unstable();
    ids
}

fn sorted_ids<K: Eq + std::hash::Hash>(index: &SecondaryIndex<K>, key: &K) -> Vec<TaskId> {
    sorted(index.get(key))
}
