//! End to end commits of staged trees into a memory store

mod common;

use ::common::edit::{
    AttributeValue, CancelToken, ColumnEdit, CommitOptions, EditAction, EditError, EditTree,
    NoProgress, NodeState, OverwritePolicy, RowCountPolicy, TreeSettings, ValueSource,
};
use ::common::path::StorePath;
use ::common::store::{FailOp, HierarchicalStore, MemoryStore};
use ::common::types::{LogicalType, Value};

use crate::common::{commit, exists, ints, mirror, sample_store, values};

#[test]
fn test_new_group_and_dataset() {
    common::init_tracing();
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let g = tree.new_group(root, "g").unwrap();
    tree.new_dataset(
        g,
        "d",
        [(
            "x",
            ColumnEdit::new(LogicalType::Int, ValueSource::literal(ints(&[5, 7, 9]))),
        )],
    )
    .unwrap();

    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    assert_eq!(report.committed_paths, vec!["/g", "/g/d"]);
    assert_eq!(report.leaves_written, 1);
    assert_eq!(values(&store, "/g/d"), vec![("x".to_string(), ints(&[5, 7, 9]))]);
    assert_eq!(report.state_of("/g/d/x"), Some(NodeState::Committed));

    // the tree now mirrors the store
    for id in tree.walk(tree.root()) {
        assert_eq!(tree.node(id).unwrap().action(), EditAction::NoAction);
    }
    let d = tree.lookup(&StorePath::new("/g/d")).unwrap();
    assert_eq!(tree.node(d).unwrap().dataset().unwrap().stored_rows, Some(3));
    assert!(tree.validate_against(&store).is_valid());
}

#[test]
fn test_invalid_tree_is_rejected_untouched() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    // clashes with the stored /g and has no policy
    tree.new_group(root, "g").unwrap();
    let before = store.object_count();

    let result = tree.commit(
        &mut store,
        CommitOptions::new(),
        &mut NoProgress,
        &CancelToken::new(),
    );

    assert!(matches!(result, Err(EditError::Invalid(_))));
    assert_eq!(store.object_count(), before);
}

#[test]
fn test_failed_container_skips_its_subtree() {
    let mut store = MemoryStore::new();
    store.fail_on(FailOp::CreateGroup, "/a");
    let mut tree = mirror(&store);
    let root = tree.root();
    let a = tree.new_group(root, "a").unwrap();
    tree.new_group(a, "inner").unwrap();
    tree.new_group(root, "b").unwrap();

    let report = commit(&mut tree, &mut store);

    assert!(!report.is_success());
    assert!(report.failed("/a"));
    assert_eq!(report.skipped_paths, vec!["/a/inner"]);
    assert_eq!(report.committed_paths, vec!["/b"]);
    assert_eq!(report.state_of("/a/inner"), Some(NodeState::Skipped));
    assert!(exists(&store, "/b"));
    assert!(!exists(&store, "/a"));

    // failed edits stay staged for another attempt
    let a = tree.lookup(&StorePath::new("/a")).unwrap();
    assert_eq!(tree.node(a).unwrap().action(), EditAction::Create);
}

#[test]
fn test_failed_leaf_does_not_stop_siblings() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let g = tree.new_group(root, "g").unwrap();
    tree.new_attribute(
        g,
        "operator",
        Some(LogicalType::String),
        AttributeValue::Variable {
            name: "operator".into(),
        },
    )
    .unwrap();
    tree.new_attribute(
        g,
        "run",
        Some(LogicalType::Int),
        AttributeValue::Literal {
            value: Value::Int(7),
        },
    )
    .unwrap();

    let report = commit(&mut tree, &mut store);

    assert!(report.failed("/g@operator"));
    assert_eq!(report.committed_paths, vec!["/g"]);
    assert_eq!(report.leaves_written, 1);
    let g = store.open(&StorePath::new("/g")).unwrap();
    assert_eq!(
        store.read_attribute(g, "run").unwrap(),
        (LogicalType::Int, Value::Int(7))
    );
}

#[test]
fn test_variables_and_input_columns() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    tree.set_input_row_count(Some(3));
    let root = tree.root();
    let d = tree
        .new_dataset(
            root,
            "d",
            [
                (
                    "t",
                    ColumnEdit::new(
                        LogicalType::Double,
                        ValueSource::Input { column: "t".into() },
                    ),
                ),
                (
                    "flag",
                    ColumnEdit::new(
                        LogicalType::Boolean,
                        ValueSource::Fixed {
                            value: Value::Bool(true),
                        },
                    ),
                ),
            ],
        )
        .unwrap();
    tree.new_attribute(
        d,
        "operator",
        Some(LogicalType::String),
        AttributeValue::Variable {
            name: "operator".into(),
        },
    )
    .unwrap();

    let options = CommitOptions::new()
        .with_variable("operator", Value::Str("ada".into()))
        .with_input_column(
            "t",
            vec![Value::Double(0.5), Value::Double(1.5), Value::Double(2.5)],
        );
    let report = tree
        .commit(&mut store, options, &mut NoProgress, &CancelToken::new())
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.leaves_written, 3);
    let stored = values(&store, "/d");
    assert_eq!(stored[0].1, vec![Value::Double(0.5), Value::Double(1.5), Value::Double(2.5)]);
    // booleans are kept as 8 bit integers
    assert_eq!(stored[1].1, vec![Value::Int(1); 3]);
    let d = store.open(&StorePath::new("/d")).unwrap();
    assert_eq!(
        store.read_attribute(d, "operator").unwrap().1,
        Value::Str("ada".into())
    );
}

#[test]
fn test_missing_input_column_fails_the_column() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    tree.set_input_row_count(Some(2));
    let root = tree.root();
    tree.new_dataset(
        root,
        "d",
        [(
            "t",
            ColumnEdit::new(LogicalType::Int, ValueSource::Input { column: "t".into() }),
        )],
    )
    .unwrap();

    let report = commit(&mut tree, &mut store);

    assert_eq!(report.committed_paths, vec!["/d"]);
    assert!(report.failed("/d/t"));
    assert_eq!(report.leaves_written, 0);
}

#[test]
fn test_cancel_stops_before_next_node() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let a = tree.new_group(root, "a").unwrap();
    tree.new_dataset(
        a,
        "d",
        [(
            "x",
            ColumnEdit::new(LogicalType::Int, ValueSource::literal(ints(&[1, 2, 3]))),
        )],
    )
    .unwrap();
    tree.new_group(root, "b").unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut sink = move |_fraction: f64| trigger.cancel();
    let report = tree
        .commit(&mut store, CommitOptions::new(), &mut sink, &cancel)
        .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.committed_paths, vec!["/a", "/a/d"]);
    assert!(exists(&store, "/a/d"));
    assert!(!exists(&store, "/b"));
    let b = tree.lookup(&StorePath::new("/b")).unwrap();
    assert_eq!(tree.node(b).unwrap().action(), EditAction::Create);
}

#[test]
fn test_progress_counts_rows_and_attributes() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let d = tree
        .new_dataset(
            root,
            "d",
            [(
                "x",
                ColumnEdit::new(
                    LogicalType::Int,
                    ValueSource::literal(ints(&[1, 2, 3, 4, 5])),
                ),
            )],
        )
        .unwrap();
    tree.new_attribute(
        d,
        "unit",
        Some(LogicalType::String),
        AttributeValue::Literal {
            value: Value::Str("s".into()),
        },
    )
    .unwrap();

    let mut seen = Vec::new();
    let mut sink = |fraction: f64| seen.push(fraction);
    let report = tree
        .commit(
            &mut store,
            CommitOptions::new().with_batch_rows(2),
            &mut sink,
            &CancelToken::new(),
        )
        .unwrap();

    assert!(report.is_success());
    assert_eq!(seen, vec![2.0 / 6.0, 4.0 / 6.0, 5.0 / 6.0, 1.0]);
}

#[test]
fn test_delete_dataset() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let d = tree.lookup(&StorePath::new("/g/d")).unwrap();
    tree.mark_deleted(d, true).unwrap();

    let report = commit(&mut tree, &mut store);

    assert_eq!(report.committed_paths, vec!["/g/d"]);
    assert!(!exists(&store, "/g/d"));
    assert!(tree.lookup(&StorePath::new("/g/d")).is_none());
    let g = tree.lookup(&StorePath::new("/g")).unwrap();
    assert_eq!(tree.node(g).unwrap().action(), EditAction::NoAction);
}

#[test]
fn test_rename_moves_object_and_descendants() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let g = tree.lookup(&StorePath::new("/g")).unwrap();
    tree.set_name(g, "h").unwrap();
    assert_eq!(tree.node(g).unwrap().action(), EditAction::Modify);

    let report = commit(&mut tree, &mut store);

    assert_eq!(report.committed_paths, vec!["/h"]);
    assert!(exists(&store, "/h/d"));
    assert!(!exists(&store, "/g"));
    let d = tree.lookup(&StorePath::new("/h/d")).unwrap();
    assert_eq!(
        tree.node(d).unwrap().source_path(),
        Some(&StorePath::new("/h/d"))
    );
    assert!(tree.validate_against(&store).is_valid());
}

#[test]
fn test_overwrite_replaces_existing_group() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    let g = tree.new_group(root, "g").unwrap();
    tree.set_policy(g, OverwritePolicy::Overwrite).unwrap();

    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    assert_eq!(report.committed_paths, vec!["/g"]);
    assert!(exists(&store, "/g"));
    assert!(!exists(&store, "/g/d"));
    // the mirror of the replaced group is gone
    assert_eq!(common::paths(&tree), vec!["/", "/g"]);
}

#[test]
fn test_rename_policy_picks_free_name() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    let g = tree.new_group(root, "g").unwrap();
    tree.set_policy(g, OverwritePolicy::Rename).unwrap();

    let report = commit(&mut tree, &mut store);

    assert_eq!(report.committed_paths, vec!["/g(1)"]);
    assert!(exists(&store, "/g/d"));
    assert!(exists(&store, "/g(1)"));
    assert_eq!(tree.node(g).unwrap().name(), "g(1)");
}

#[test]
fn test_integrate_adds_into_existing_group() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    let g = tree.new_group(root, "g").unwrap();
    tree.set_policy(g, OverwritePolicy::Integrate).unwrap();
    tree.new_group(g, "extra").unwrap();

    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    assert!(exists(&store, "/g/d"));
    assert!(exists(&store, "/g/extra"));
}

#[test]
fn test_copy_within_store() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    let d = tree.lookup(&StorePath::new("/g/d")).unwrap();
    tree.new_copy(root, d, "d2").unwrap();

    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    assert_eq!(report.committed_paths, vec!["/d2"]);
    assert_eq!(values(&store, "/d2"), values(&store, "/g/d"));
}

#[test]
fn test_copy_from_other_file() {
    let source_store = sample_store();
    let source_tree = EditTree::mirror(&source_store, "/data/other.h5").unwrap();
    let d = source_tree.lookup(&StorePath::new("/g/d")).unwrap();

    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    tree.new_copy_from(root, &source_tree, d, "imported").unwrap();

    let options = CommitOptions::new().with_source("/data/other.h5", &source_store);
    let report = tree
        .commit(&mut store, options, &mut NoProgress, &CancelToken::new())
        .unwrap();

    assert!(report.is_success());
    assert_eq!(values(&store, "/imported"), vec![("x".to_string(), ints(&[1, 2]))]);
    let imported = store.open(&StorePath::new("/imported")).unwrap();
    assert_eq!(
        store.read_attribute(imported, "unit").unwrap().1,
        Value::Str("m".into())
    );
}

#[test]
fn test_pad_policy_fills_short_columns() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    tree.set_settings(TreeSettings {
        row_count_policy: RowCountPolicy::Pad,
        ..TreeSettings::default()
    });
    let root = tree.root();
    tree.new_dataset(
        root,
        "d",
        [
            (
                "a",
                ColumnEdit::new(LogicalType::Int, ValueSource::literal(ints(&[1, 2, 3]))),
            ),
            (
                "b",
                ColumnEdit::new(LogicalType::Int, ValueSource::literal(ints(&[4]))),
            ),
        ],
    )
    .unwrap();

    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    let stored = values(&store, "/d");
    assert_eq!(stored[1].1, vec![Value::Int(4), Value::Missing, Value::Missing]);
}

#[test]
fn test_rename_on_first_of_two_new_groups() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let first = tree.new_group(root, "x").unwrap();
    let second = tree.new_group(root, "x").unwrap();
    assert!(!tree.validate().is_valid());

    tree.set_policy(first, OverwritePolicy::Rename).unwrap();
    assert!(tree.validate().is_valid());
    assert!(tree.validate_against(&store).is_valid());

    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    assert_eq!(report.committed_paths, vec!["/x", "/x(1)"]);
    assert!(exists(&store, "/x"));
    assert!(exists(&store, "/x(1)"));
    assert_eq!(tree.node(second).unwrap().name(), "x");
    assert_eq!(tree.node(first).unwrap().name(), "x(1)");
}

#[test]
fn test_integrate_on_first_of_two_new_groups() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let first = tree.new_group(root, "x").unwrap();
    tree.new_group(first, "inner").unwrap();
    tree.new_group(root, "x").unwrap();
    tree.set_policy(first, OverwritePolicy::Integrate).unwrap();
    assert!(tree.validate().is_valid());

    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    assert!(report.skipped_paths.is_empty());
    assert!(exists(&store, "/x/inner"));
}

#[test]
fn test_overwrite_replaces_new_sibling_of_same_name() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let loser = tree.new_group(root, "x").unwrap();
    tree.new_group(loser, "keep").unwrap();
    let winner = tree.new_group(root, "x").unwrap();
    tree.set_policy(winner, OverwritePolicy::Overwrite).unwrap();
    assert!(tree.validate().is_valid());

    let report = commit(&mut tree, &mut store);

    assert!(report.failed_paths.is_empty());
    assert_eq!(report.committed_paths, vec!["/x"]);
    assert_eq!(report.skipped_paths, vec!["/x", "/x/keep"]);
    assert!(exists(&store, "/x"));
    assert!(!exists(&store, "/x/keep"));
    assert!(tree.get(loser).is_none());
    assert_eq!(common::paths(&tree), vec!["/", "/x"]);
}

#[test]
fn test_overwrite_replaces_object_moved_by_sibling() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    let g = tree.lookup(&StorePath::new("/g")).unwrap();
    tree.set_name(g, "x").unwrap();
    let x = tree.new_group(root, "x").unwrap();
    tree.set_policy(x, OverwritePolicy::Overwrite).unwrap();

    let report = commit(&mut tree, &mut store);

    // the moved group counts as replaced, not as committed
    assert_eq!(report.committed_paths, vec!["/x"]);
    assert_eq!(report.skipped_paths, vec!["/x"]);
    assert!(!exists(&store, "/g"));
    assert!(!exists(&store, "/x/d"));
    assert!(tree.get(g).is_none());
    assert_eq!(common::paths(&tree), vec!["/", "/x"]);
}

#[test]
fn test_fixed_column_rows_follow_input_row_count() {
    let mut store = MemoryStore::new();
    let mut tree = mirror(&store);
    let root = tree.root();
    let fixed = || ColumnEdit::new(LogicalType::Int, ValueSource::Fixed { value: Value::Int(1) });
    tree.new_dataset(root, "unsized", [("c", fixed())]).unwrap();
    commit(&mut tree, &mut store);
    assert!(values(&store, "/unsized")[0].1.is_empty());

    let root = tree.root();
    tree.new_dataset(root, "sized", [("c", fixed())]).unwrap();
    tree.set_input_row_count(Some(3));
    let report = commit(&mut tree, &mut store);

    assert!(report.is_success());
    assert_eq!(values(&store, "/sized"), vec![("c".to_string(), ints(&[1, 1, 1]))]);
}
