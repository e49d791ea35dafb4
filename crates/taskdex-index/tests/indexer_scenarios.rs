//! End-to-end behaviour of the indexer: mtime validation, file replacement,
//! filtered queries and snapshot restore.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskdex_core::{
    Filter, FilterField, FilterOperator, SortCriterion, SortField, Task, TaskId, TaskMetadata,
};
use taskdex_index::{
    CacheSnapshot, Diagnostic, IndexerConfig, RecordingDiagnostics, RestoreOutcome, TaskIndexer,
    UnsupportedFilter,
};
use time::macros::datetime;

fn tagged(id: &str, path: &str, tags: &[&str]) -> Task {
    Task::new(id, path, 0).with_metadata(TaskMetadata {
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
        ..TaskMetadata::default()
    })
}

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|task| task.id.as_str()).collect()
}

#[test]
fn single_file_lifecycle() {
    let mut indexer = TaskIndexer::default();
    let path = "a.md";

    assert!(indexer.is_file_changed(path, 1000));

    indexer.replace_file_tasks(path, vec![tagged("t1", path, &["#work"])], Some(1000));
    assert!(indexer.has_valid_cache(path, 1000));
    assert!(!indexer.is_file_changed(path, 1000));
    assert!(!indexer.is_file_changed(path, 999));
    assert!(indexer.is_file_changed(path, 1001));

    let work = Filter::new(FilterField::Tag, FilterOperator::Contains, "#work");
    assert_eq!(ids(&indexer.query(&[work.clone()], &[])), ["t1"]);

    indexer.replace_file_tasks(path, Vec::new(), Some(2000));
    assert!(indexer.query(&[work], &[]).is_empty());
    assert!(!indexer.has_valid_cache(path, 2000));
    assert_eq!(indexer.file_last_mtime(path), Some(2000));

    let report = indexer.prune_orphans();
    assert!(report.pruned.contains(path));
    assert_eq!(indexer.file_last_mtime(path), None);
    assert!(indexer.is_file_changed(path, 0));
}

#[test]
fn replacement_is_equivalent_to_diff_and_patch() {
    let mut indexer = TaskIndexer::default();
    indexer.replace_file_tasks(
        "a.md",
        vec![
            tagged("keep", "a.md", &["#x"]),
            tagged("drop", "a.md", &["#y"]),
        ],
        Some(1),
    );
    indexer.replace_file_tasks(
        "a.md",
        vec![tagged("keep", "a.md", &["#z"]), tagged("new", "a.md", &["#y"])],
        Some(2),
    );

    assert!(indexer.get(&TaskId::new("drop")).is_none());
    assert_eq!(indexer.task_ids_by_tag("#x"), Vec::<TaskId>::new());
    assert_eq!(indexer.task_ids_by_tag("#y"), vec![TaskId::new("new")]);
    assert_eq!(indexer.task_ids_by_tag("#z"), vec![TaskId::new("keep")]);
    assert_eq!(indexer.task_ids_for_file("a.md").len(), 2);
}

#[test]
fn removing_a_file_touches_no_other_file() {
    let mut indexer = TaskIndexer::default();
    indexer.replace_file_tasks("a.md", vec![tagged("a1", "a.md", &["#shared"])], Some(1));
    indexer.replace_file_tasks("b.md", vec![tagged("b1", "b.md", &["#shared"])], Some(1));

    assert_eq!(indexer.remove_file("a.md"), 1);
    assert_eq!(indexer.task_ids_by_tag("#shared"), vec![TaskId::new("b1")]);
    assert_eq!(indexer.file_paths(), vec!["b.md"]);
    assert_eq!(indexer.file_last_mtime("a.md"), Some(1));
    assert_eq!(indexer.remove_file("a.md"), 0);
}

#[test]
fn filter_chains_combine_left_to_right() {
    let mut indexer = TaskIndexer::default();
    indexer.replace_file_tasks(
        "a.md",
        vec![
            tagged("both", "a.md", &["#a", "#b"]),
            tagged("only-a", "a.md", &["#a"]),
            tagged("only-b", "a.md", &["#b"]),
            tagged("neither", "a.md", &[]),
        ],
        None,
    );
    let by_id = [SortCriterion::asc(SortField::Id)];
    let a = Filter::new(FilterField::Tag, FilterOperator::Contains, "#a");
    let b = Filter::new(FilterField::Tag, FilterOperator::Contains, "#b");
    let not_a = Filter::new(FilterField::Tag, FilterOperator::NotEq, "#a");

    assert_eq!(ids(&indexer.query(&[a.clone(), b.clone()], &by_id)), ["both"]);
    assert_eq!(
        ids(&indexer.query(&[a.clone(), b.or()], &by_id)),
        ["both", "only-a", "only-b"]
    );
    assert_eq!(ids(&indexer.query(&[not_a], &by_id)), ["neither", "only-b"]);
    assert_eq!(indexer.query(&[], &by_id).len(), 4);
}

#[test]
fn unfiltered_queries_match_with_and_without_fast_path() {
    let build = |threshold| {
        let mut indexer = TaskIndexer::new(IndexerConfig {
            small_store_threshold: threshold,
            ..IndexerConfig::default()
        });
        indexer.replace_file_tasks(
            "a.md",
            (0..20).map(|n| tagged(&format!("t{n:02}"), "a.md", &[])).collect(),
            None,
        );
        indexer
    };
    let fast = build(1000);
    let slow = build(0);
    assert_eq!(fast.query(&[], &[]), slow.query(&[], &[]));
}

#[test]
fn default_order_breaks_ties_by_due_date() {
    let mut indexer = TaskIndexer::default();
    let dated = |id: &str, priority: Option<i32>, due| {
        Task::new(id, "a.md", 0).with_metadata(TaskMetadata {
            priority,
            due_date: due,
            ..TaskMetadata::default()
        })
    };
    indexer.replace_file_tasks(
        "a.md",
        vec![
            dated("low", Some(1), Some(datetime!(2024-01-01 0:00 UTC))),
            dated("high-late", Some(5), Some(datetime!(2024-03-01 0:00 UTC))),
            dated("high-early", Some(5), Some(datetime!(2024-02-01 0:00 UTC))),
            dated("high-undated", Some(5), None),
            dated("unprioritized", None, Some(datetime!(2023-01-01 0:00 UTC))),
        ],
        None,
    );

    assert_eq!(
        ids(&indexer.query(&[], &[])),
        ["high-early", "high-late", "high-undated", "low", "unprioritized"]
    );
}

#[test]
fn unsupported_filters_are_reported_not_raised() {
    let recorder = Arc::new(RecordingDiagnostics::default());
    let mut indexer = TaskIndexer::default().with_diagnostics(recorder.clone());
    indexer.replace_file_tasks("a.md", vec![tagged("t1", "a.md", &["#x"])], None);

    let filter = Filter::new(FilterField::Other("assignee".into()), FilterOperator::Eq, "me");
    assert!(indexer.query(&[filter.clone()], &[]).is_empty());
    assert_eq!(
        recorder.entries(),
        vec![Diagnostic::UnsupportedFilter {
            filter,
            reason: UnsupportedFilter::UnknownField("assignee".into()),
        }]
    );
}

#[test]
fn snapshot_survives_json_and_restore() {
    let mut indexer = TaskIndexer::default();
    indexer.replace_file_tasks("a.md", vec![tagged("t1", "a.md", &["#x"])], Some(5));
    indexer.replace_file_tasks("b.md", vec![tagged("t2", "b.md", &["#y"])], Some(6));

    let json = serde_json::to_string_pretty(&indexer.snapshot()).expect("serialize");
    let snapshot: CacheSnapshot = serde_json::from_str(&json).expect("deserialize");

    let mut restored = TaskIndexer::default();
    let outcome = restored.restore(snapshot).expect("restore");
    assert_eq!(outcome, RestoreOutcome::Loaded);
    assert_eq!(restored.cache(), indexer.cache());
    assert!(restored.has_valid_cache("a.md", 5));
    assert!(restored.last_index_time("a.md").is_none());

    restored.reset();
    assert_eq!(restored.total_task_count(), 0);
    assert!(restored.is_file_changed("a.md", 0));
}
