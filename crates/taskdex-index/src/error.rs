use thiserror::Error;

/// Errors surfaced by [`TaskIndexer`](crate::TaskIndexer).
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index is derived from source files and cannot author tasks.
    #[error("{operation} is not supported: tasks are written to source files and re-indexed")]
    UnsupportedOperation {
        /// Rejected operation name.
        operation: &'static str,
    },
    /// A snapshot could not be restored.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Errors raised while restoring a [`CacheSnapshot`](crate::CacheSnapshot).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    /// The snapshot was written by a newer schema.
    #[error("snapshot version {found} is newer than the supported version {supported}")]
    UnsupportedVersion {
        /// Version stored in the snapshot.
        found: u32,
        /// Latest version understood by this build.
        supported: u32,
    },
}

/// Result alias used throughout the index crate.
pub type Result<T> = std::result::Result<T, IndexError>;
