//! Incremental task index.
//!
//! Tasks parsed from source files are kept in an in-memory cache with
//! secondary indexes over their metadata. Files are re-parsed only when their
//! modification time moves forward, and queries combine index lookups with
//! AND/OR filter chains and multi-key sorting.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filter_util;
pub mod indexer;
pub mod mtime;
mod mutation;
pub mod parser;
pub mod query;
pub mod secondary_index;
pub mod snapshot;
pub mod task_cache;

// Re-exports for convenience
pub use config::{ConfigError, DEFAULT_SMALL_STORE_THRESHOLD, IndexerConfig};
pub use diagnostics::{Diagnostic, Diagnostics, RecordingDiagnostics, TracingDiagnostics, UnsupportedFilter};
pub use error::{IndexError, SnapshotError};
pub use filter_util::{FilterParseError, FilterParseResult, Query, QueryBuilder, parse_filter, parse_sort};
pub use indexer::{IndexOutcome, TaskIndexer};
pub use mtime::{ConsistencyReport, MtimeRecord};
pub use parser::TaskParser;
pub use query::{QueryEngine, sort_tasks};
pub use secondary_index::{IdSet, SecondaryIndex};
pub use snapshot::{CacheSnapshot, RestoreOutcome, SNAPSHOT_VERSION};
pub use task_cache::TaskCache;
