use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use taskdex_core::Task;
use taskdex_index::{IndexerConfig, QueryBuilder, TaskIndexer};

use crate::{Command, OutputFormat};

mod snapshot_file;

/// Execute `command` against the index stored at `snapshot`.
pub fn run(
    command: Command,
    snapshot: &Path,
    config: IndexerConfig,
    out: &mut impl Write,
) -> Result<()> {
    let mut indexer = snapshot_file::load(snapshot, config)?;

    match command {
        Command::Ingest { path, mtime, tasks } => {
            let tasks = read_tasks(&tasks)?;
            handle_ingest(&mut indexer, &path, tasks, mtime, out)?;
            snapshot_file::save(snapshot, &indexer)
        }
        Command::Remove { path } => {
            let removed = indexer.remove_file(&path);
            writeln!(out, "removed {removed} tasks from {path}")?;
            snapshot_file::save(snapshot, &indexer)
        }
        Command::Cleanup { path } => {
            indexer.cleanup_file_cache(&path);
            writeln!(out, "forgot {path}")?;
            snapshot_file::save(snapshot, &indexer)
        }
        Command::Status { path, mtime } => handle_status(&indexer, &path, mtime, out),
        Command::Query {
            filters,
            sort,
            format,
        } => handle_query(&indexer, &filters, &sort, format, out),
        Command::Check => {
            let report = indexer.prune_orphans();
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            snapshot_file::save(snapshot, &indexer)
        }
        Command::Stats => {
            writeln!(out, "{}", serde_json::to_string_pretty(&Stats::of(&indexer))?)?;
            Ok(())
        }
    }
}

fn read_tasks(source: &Path) -> Result<Vec<Task>> {
    let raw = if source == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read tasks from stdin")?;
        buf
    } else {
        fs::read_to_string(source)
            .with_context(|| format!("failed to read {}", source.display()))?
    };
    serde_json::from_str(&raw).context("tasks must be a JSON array of task objects")
}

fn handle_ingest(
    indexer: &mut TaskIndexer,
    path: &str,
    tasks: Vec<Task>,
    mtime: Option<i64>,
    out: &mut impl Write,
) -> Result<()> {
    let count = tasks.len();
    indexer.replace_file_tasks(path, tasks, mtime);
    writeln!(out, "indexed {count} tasks from {path}")?;
    Ok(())
}

fn handle_status(indexer: &TaskIndexer, path: &str, mtime: i64, out: &mut impl Write) -> Result<()> {
    let verdict = if indexer.has_valid_cache(path, mtime) {
        "valid"
    } else if indexer.is_file_changed(path, mtime) {
        "changed"
    } else {
        "empty"
    };
    let last = indexer
        .file_last_mtime(path)
        .map_or_else(|| "-".to_owned(), |m| m.to_string());
    writeln!(out, "{path}: {verdict} (last mtime {last})")?;
    Ok(())
}

fn handle_query(
    indexer: &TaskIndexer,
    filters: &[String],
    sort: &[String],
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let query = QueryBuilder::new()
        .with_filters(filters)?
        .with_sort(sort)?
        .build();
    let tasks = indexer.query_refs(&query.filters, &query.sort);

    if tasks.is_empty() {
        if query.filters.is_empty() {
            writeln!(out, "No tasks found")?;
        } else {
            writeln!(out, "No tasks matched the provided filters")?;
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => render_task_table(&tasks, out)?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&tasks)?)?,
    }
    Ok(())
}

fn render_task_table(tasks: &[&Task], out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "ID | Done | Location | Priority | Tags | Content")?;
    writeln!(out, "-- | ---- | -------- | -------- | ---- | -------")?;

    for task in tasks {
        let done = if task.completed { "x" } else { " " };
        let priority = task
            .metadata
            .priority
            .map_or_else(|| "-".to_owned(), |p| p.to_string());
        let tags = if task.metadata.tags.is_empty() {
            "-".to_owned()
        } else {
            task.metadata.tags.join(", ")
        };
        writeln!(
            out,
            "{} | {} | {}:{} | {} | {} | {}",
            task.id, done, task.file_path, task.line, priority, tags, task.content
        )?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct Stats {
    tasks: usize,
    files: usize,
    tracked_mtimes: usize,
    completed: usize,
    open: usize,
    tags: usize,
    projects: usize,
}

impl Stats {
    fn of(indexer: &TaskIndexer) -> Self {
        let cache = indexer.cache();
        Self {
            tasks: indexer.total_task_count(),
            files: indexer.file_paths().len(),
            tracked_mtimes: cache.mtimes().len(),
            completed: indexer.task_ids_by_completion(true).len(),
            open: indexer.task_ids_by_completion(false).len(),
            tags: cache.tags().len(),
            projects: cache.projects().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use tempfile::tempdir;

    const TASKS: &str = r##"[
        {"id": "a.md:0", "filePath": "a.md", "line": 0, "content": "write report",
         "metadata": {"tags": ["#work"], "priority": 2}},
        {"id": "a.md:1", "filePath": "a.md", "line": 1, "completed": true, "status": "x",
         "content": "buy milk", "metadata": {"tags": ["#home"]}}
    ]"##;

    fn exec(snapshot: &Path, command: Command) -> String {
        let mut out = Vec::new();
        run(command, snapshot, IndexerConfig::default(), &mut out).expect("command");
        String::from_utf8(out).expect("utf8")
    }

    fn ingest(dir: &Path, snapshot: &Path) {
        let tasks = dir.join("tasks.json");
        fs::write(&tasks, TASKS).expect("write tasks");
        let output = exec(
            snapshot,
            Command::Ingest {
                path: "a.md".into(),
                mtime: Some(1000),
                tasks,
            },
        );
        assert_eq!(output.trim(), "indexed 2 tasks from a.md");
    }

    #[test]
    fn ingest_then_query_reads_back_the_snapshot() {
        let dir = tempdir().expect("tempdir");
        let snapshot = dir.path().join("state/snapshot.json");
        ingest(dir.path(), &snapshot);
        assert!(snapshot.exists());

        let output = exec(
            &snapshot,
            Command::Query {
                filters: vec!["tag contains #work".into()],
                sort: Vec::new(),
                format: OutputFormat::Table,
            },
        );
        assert!(output.contains("a.md:0 |   | a.md:0 | 2 | #work | write report"));
        assert!(!output.contains("buy milk"));
    }

    #[test]
    fn status_reflects_mtime_bookkeeping() {
        let dir = tempdir().expect("tempdir");
        let snapshot = dir.path().join("snapshot.json");
        ingest(dir.path(), &snapshot);

        let status = |mtime| {
            exec(
                &snapshot,
                Command::Status {
                    path: "a.md".into(),
                    mtime,
                },
            )
        };
        assert_eq!(status(1000).trim(), "a.md: valid (last mtime 1000)");
        assert_eq!(status(1001).trim(), "a.md: changed (last mtime 1000)");

        exec(&snapshot, Command::Remove { path: "a.md".into() });
        assert_eq!(status(1000).trim(), "a.md: empty (last mtime 1000)");

        let report = exec(&snapshot, Command::Check);
        assert!(report.contains("\"a.md\""));
        assert_eq!(status(1000).trim(), "a.md: changed (last mtime -)");
    }

    #[test]
    fn query_without_matches_says_so() {
        let dir = tempdir().expect("tempdir");
        let snapshot = dir.path().join("snapshot.json");
        let output = exec(
            &snapshot,
            Command::Query {
                filters: vec!["project = none".into()],
                sort: Vec::new(),
                format: OutputFormat::Json,
            },
        );
        assert_eq!(output.trim(), "No tasks matched the provided filters");
    }

    #[test]
    fn invalid_filters_are_reported() {
        let dir = tempdir().expect("tempdir");
        let snapshot = dir.path().join("snapshot.json");
        let err = run(
            Command::Query {
                filters: vec!["tag like work".into()],
                sort: Vec::new(),
                format: OutputFormat::Table,
            },
            &snapshot,
            IndexerConfig::default(),
            &mut Vec::new(),
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("tag like work"));
    }

    #[test]
    fn stats_count_tasks_and_files() {
        let dir = tempdir().expect("tempdir");
        let snapshot = dir.path().join("snapshot.json");
        ingest(dir.path(), &snapshot);
        let stats: serde_json::Value =
            serde_json::from_str(&exec(&snapshot, Command::Stats)).expect("json");
        assert_eq!(stats["tasks"], 2);
        assert_eq!(stats["files"], 1);
        assert_eq!(stats["completed"], 1);
        assert_eq!(stats["tags"], 2);
    }

    #[test]
    fn cleanup_forgets_the_file() {
        let dir = tempdir().expect("tempdir");
        let snapshot = dir.path().join("snapshot.json");
        ingest(dir.path(), &snapshot);
        exec(&snapshot, Command::Cleanup { path: "a.md".into() });
        let stats: serde_json::Value =
            serde_json::from_str(&exec(&snapshot, Command::Stats)).expect("json");
        assert_eq!(stats["tasks"], 0);
        assert_eq!(stats["tracked_mtimes"], 0);
    }
}
