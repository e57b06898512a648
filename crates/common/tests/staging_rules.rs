//! Staging operations, validation and merging of staged trees

mod common;

use ::common::edit::{
    ColumnEdit, DeleteOutcome, EditAction, EditError, EditTree, InvalidReason, OverwritePolicy,
    TreeDocument, ValueSource,
};
use ::common::path::StorePath;
use ::common::store::{HierarchicalStore, MemoryStore};
use ::common::types::LogicalType;

use crate::common::{commit, exists, ints, mirror, sample_store};

#[test]
fn test_delete_toggle_restores_prior_action() {
    let store = sample_store();
    let mut tree = mirror(&store);
    let g = tree.lookup(&StorePath::new("/g")).unwrap();
    let d = tree.lookup(&StorePath::new("/g/d")).unwrap();

    assert_eq!(tree.toggle_deleted(d).unwrap(), DeleteOutcome::Marked);
    assert_eq!(tree.node(d).unwrap().action(), EditAction::Delete);
    assert_eq!(tree.node(d).unwrap().prior_action(), Some(EditAction::NoAction));
    assert_eq!(
        tree.node(g).unwrap().action(),
        EditAction::ModifyChildrenOnly
    );
    // deleting twice is a no-op
    assert_eq!(tree.mark_deleted(d, true).unwrap(), DeleteOutcome::Unchanged);

    assert_eq!(tree.toggle_deleted(d).unwrap(), DeleteOutcome::Restored);
    assert_eq!(tree.node(d).unwrap().action(), EditAction::NoAction);
    assert_eq!(tree.node(d).unwrap().prior_action(), None);
}

#[test]
fn test_renamed_node_is_restored_as_modify() {
    let store = sample_store();
    let mut tree = mirror(&store);
    let d = tree.lookup(&StorePath::new("/g/d")).unwrap();
    tree.set_name(d, "e").unwrap();
    tree.toggle_deleted(d).unwrap();
    tree.toggle_deleted(d).unwrap();
    assert_eq!(tree.node(d).unwrap().action(), EditAction::Modify);
    assert_eq!(tree.node(d).unwrap().name(), "e");
}

#[test]
fn test_delete_with_pending_descendants_is_refused() {
    let store = sample_store();
    let mut tree = mirror(&store);
    let g = tree.lookup(&StorePath::new("/g")).unwrap();
    tree.new_group(g, "fresh").unwrap();

    assert!(matches!(
        tree.mark_deleted(g, true),
        Err(EditError::PendingDescendants(_))
    ));
    assert_eq!(
        tree.node(g).unwrap().action(),
        EditAction::ModifyChildrenOnly
    );
}

#[test]
fn test_foreign_objects_stay_untouched() {
    let mut store = MemoryStore::new();
    let root = store.root();
    store.add_unsupported(root, "link").unwrap();
    let mut tree = mirror(&store);
    let link = tree.lookup(&StorePath::new("/link")).unwrap();

    assert!(matches!(
        tree.mark_deleted(link, true),
        Err(EditError::IllegalAction { .. })
    ));
    assert!(tree
        .set_policy(link, OverwritePolicy::Overwrite)
        .is_err());

    // a new group may not take the name of a foreign object
    let root = tree.root();
    tree.new_group(root, "link").unwrap();
    let cause = tree.validate_against(&store).cause().cloned().unwrap();
    assert!(matches!(cause.reason, InvalidReason::StructuralConflict { .. }));
}

#[test]
fn test_row_count_mismatch_is_invalid() {
    let mut tree = EditTree::new(common::FILE);
    let root = tree.root();
    let literal = |n: i64| {
        ColumnEdit::new(
            LogicalType::Int,
            ValueSource::literal(ints(&(0..n).collect::<Vec<_>>())),
        )
    };
    tree.new_dataset(root, "d", [("a", literal(10)), ("b", literal(10)), ("c", literal(7))])
        .unwrap();

    let cause = tree.validate().cause().cloned().unwrap();
    assert_eq!(cause.path, "/d");
    assert_eq!(
        cause.reason,
        InvalidReason::RowCountMismatch {
            expected: 10,
            found: 7
        }
    );
}

#[test]
fn test_illegal_file_suffix() {
    let tree = EditTree::new("/data/run.csv");
    assert!(matches!(
        tree.validate().cause().map(|c| &c.reason),
        Some(InvalidReason::IllegalFileSuffix(_))
    ));
}

#[test]
fn test_move_into_own_subtree_is_rejected() {
    let store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    let g = tree.lookup(&StorePath::new("/g")).unwrap();
    let inner = tree.new_group(g, "inner").unwrap();
    let before = common::paths(&tree);

    assert!(matches!(
        tree.move_node(g, inner),
        Err(EditError::CyclicAttachment { .. })
    ));
    assert_eq!(common::paths(&tree), before);
    assert!(tree.move_node(inner, root).is_ok());
}

#[test]
fn test_moved_dataset_is_committed_at_new_parent() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let root = tree.root();
    let d = tree.lookup(&StorePath::new("/g/d")).unwrap();
    tree.move_node(d, root).unwrap();
    assert_eq!(tree.node(d).unwrap().action(), EditAction::Modify);

    let report = commit(&mut tree, &mut store);

    assert_eq!(report.committed_paths, vec!["/d"]);
    assert!(exists(&store, "/d"));
    assert!(!exists(&store, "/g/d"));
    assert_eq!(common::values(&store, "/d")[0].1, ints(&[1, 2]));
}

#[test]
fn test_merged_donors_commit_together() {
    let mut store = sample_store();
    let mut recipient = mirror(&store);

    let mut first = mirror(&store);
    let root = first.root();
    first.new_group(root, "calibration").unwrap();

    let mut second = mirror(&store);
    let g = second.lookup(&StorePath::new("/g")).unwrap();
    second
        .new_dataset(
            g,
            "fit",
            [(
                "y",
                ColumnEdit::new(LogicalType::Int, ValueSource::literal(ints(&[3, 4]))),
            )],
        )
        .unwrap();

    recipient.integrate(&first, None, false).unwrap();
    recipient.integrate(&second, None, false).unwrap();
    // merging the same donor again adds nothing
    let again = recipient.integrate(&second, None, false).unwrap();
    assert_eq!(again.nodes_added, 0);

    let report = commit(&mut recipient, &mut store);

    assert!(report.is_success());
    assert!(exists(&store, "/calibration"));
    assert_eq!(common::values(&store, "/g/fit")[0].1, ints(&[3, 4]));
}

#[test]
fn test_final_pass_drops_aborting_edits() {
    let store = sample_store();
    let mut recipient = mirror(&store);
    let mut donor = EditTree::new(common::FILE);
    let root = donor.root();
    let g = donor.new_group(root, "g").unwrap();
    donor.set_policy(g, OverwritePolicy::Abort).unwrap();

    let report = recipient.integrate(&donor, None, true).unwrap();

    assert_eq!(report.dropped, vec!["/g"]);
    assert!(recipient.validate_against(&store).is_valid());
}

#[test]
fn test_document_survives_a_session() {
    let mut store = sample_store();
    let mut tree = mirror(&store);
    let g = tree.lookup(&StorePath::new("/g")).unwrap();
    tree.new_group(g, "later").unwrap();

    let json = tree.to_document().unwrap().to_json().unwrap();
    let mut loaded = EditTree::from_document(&TreeDocument::from_json(&json).unwrap()).unwrap();
    assert_eq!(common::paths(&loaded), common::paths(&tree));

    let report = commit(&mut loaded, &mut store);
    assert_eq!(report.committed_paths, vec!["/g/later"]);
    assert!(exists(&store, "/g/later"));
}
