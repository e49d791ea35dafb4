use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use taskdex_index::{CacheSnapshot, IndexerConfig, TaskIndexer};
use tempfile::NamedTempFile;
use tracing::debug;

/// Load the indexer from `path`; a missing file yields an empty index.
pub fn load(path: &Path, config: IndexerConfig) -> Result<TaskIndexer> {
    let mut indexer = TaskIndexer::new(config);
    if !path.exists() {
        debug!(path = %path.display(), "no snapshot yet; starting empty");
        return Ok(indexer);
    }

    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: CacheSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    indexer
        .restore(snapshot)
        .with_context(|| format!("failed to restore {}", path.display()))?;
    Ok(indexer)
}

/// Atomically replace `path` with the current snapshot.
pub fn save(path: &Path, indexer: &TaskIndexer) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut file, &indexer.snapshot())
        .context("failed to serialize snapshot")?;
    file.write_all(b"\n")?;
    file.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
