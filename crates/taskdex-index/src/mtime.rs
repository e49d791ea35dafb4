//! File modification-time bookkeeping used to skip unchanged files.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::task_cache::TaskCache;

/// Last known modification time and processing time per file path.
///
/// Times are unix milliseconds. The processed time is wall-clock bookkeeping
/// and never participates in freshness decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MtimeRecord {
    pub(crate) file_mtimes: HashMap<String, i64>,
    pub(crate) file_processed_times: HashMap<String, i64>,
}

impl MtimeRecord {
    /// Stored mtime for `path`.
    #[must_use]
    pub fn last_mtime(&self, path: &str) -> Option<i64> {
        self.file_mtimes.get(path).copied()
    }

    /// Wall-clock time at which `path` was last recorded.
    #[must_use]
    pub fn processed_time(&self, path: &str) -> Option<i64> {
        self.file_processed_times.get(path).copied()
    }

    /// `true` when nothing is recorded for `path` or the stored mtime is
    /// older than `current`.
    #[must_use]
    pub fn is_changed(&self, path: &str, current: i64) -> bool {
        self.last_mtime(path).is_none_or(|stored| stored < current)
    }

    /// Paths with a recorded mtime.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.file_mtimes.keys().map(String::as_str)
    }

    /// Number of paths with a recorded mtime.
    #[must_use]
    pub fn len(&self) -> usize {
        self.file_mtimes.len()
    }

    /// Whether no mtime is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_mtimes.is_empty()
    }

    pub(crate) fn record(&mut self, path: &str, mtime: i64, processed_at: i64) {
        self.file_mtimes.insert(path.to_owned(), mtime);
        self.file_processed_times.insert(path.to_owned(), processed_at);
    }

    pub(crate) fn forget(&mut self, path: &str) -> bool {
        self.file_processed_times.remove(path);
        self.file_mtimes.remove(path).is_some()
    }
}

/// Outcome of [`TaskCache::prune_orphans`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    /// Paths whose mtime record was dropped because they hold no tasks.
    pub pruned: BTreeSet<String>,
    /// Paths holding tasks without an mtime record; left untouched.
    pub files_without_mtime: BTreeSet<String>,
}

impl ConsistencyReport {
    /// Whether the cache was already consistent.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.pruned.is_empty() && self.files_without_mtime.is_empty()
    }
}

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

impl TaskCache {
    /// `true` when `path` has no recorded mtime or it is older than `current`.
    #[must_use]
    pub fn is_file_changed(&self, path: &str, current: i64) -> bool {
        self.mtimes.is_changed(path, current)
    }

    /// `true` when `path` holds at least one task and is unchanged at `current`.
    #[must_use]
    pub fn has_valid_cache(&self, path: &str, current: i64) -> bool {
        let has_tasks = self.files.get(path).is_some_and(|ids| !ids.is_empty());
        has_tasks && !self.is_file_changed(path, current)
    }

    /// Record `mtime` for `path` and stamp the processing time.
    pub(crate) fn update_file_mtime(&mut self, path: &str, mtime: i64) {
        self.mtimes.record(path, mtime, now_millis());
    }

    /// Drop mtime records of paths that no longer hold any task.
    ///
    /// Paths with tasks but no mtime are reported, not repaired: the next
    /// ingestion of that file records one.
    pub(crate) fn prune_orphans(&mut self) -> ConsistencyReport {
        let pruned: BTreeSet<String> = self
            .mtimes
            .paths()
            .filter(|path| !self.files.contains_key(*path))
            .map(str::to_owned)
            .collect();
        for path in &pruned {
            self.mtimes.forget(path);
        }

        let files_without_mtime = self
            .files
            .keys()
            .filter(|path| self.mtimes.last_mtime(path).is_none())
            .cloned()
            .collect();

        if !pruned.is_empty() {
            debug!(count = pruned.len(), "pruned orphaned mtime records");
        }

        ConsistencyReport {
            pruned,
            files_without_mtime,
        }
    }
}
