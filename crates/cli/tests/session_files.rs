//! A staging session across files: mirror, stage, save, reload, commit

use common::edit::{CancelToken, ColumnEdit, CommitOptions, EditTree, NoProgress, ValueSource};
use common::path::StorePath;
use common::store::{HierarchicalStore, MemoryStore};
use common::types::{LogicalType, Value};
use stagetree_cli::files::{self, FileError};
use stagetree_cli::Config;

#[test]
fn test_session_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.json");
    let tree_path = dir.path().join("tree.json");
    let input_path = dir.path().join("input.json");

    let mut store = MemoryStore::new();
    let root = store.root();
    store.create_group(root, "runs").unwrap();
    files::save_store(&store, &store_path).unwrap();

    // stage against a reloaded store
    let store = files::load_store(&store_path).unwrap();
    let mut tree = EditTree::mirror(&store, "/data/run.h5").unwrap();
    tree.set_input_row_count(Some(2));
    let runs = tree.lookup(&StorePath::new("/runs")).unwrap();
    tree.new_dataset(
        runs,
        "r1",
        [(
            "energy",
            ColumnEdit::new(
                LogicalType::Double,
                ValueSource::Input {
                    column: "energy".into(),
                },
            ),
        )],
    )
    .unwrap();
    files::save_tree(&tree, &tree_path).unwrap();
    std::fs::write(&input_path, r#"{"energy": [1.5, 2.5]}"#).unwrap();

    // commit in a later session
    let mut tree = files::load_tree(&tree_path).unwrap();
    let mut store = files::load_store(&store_path).unwrap();
    let mut options = CommitOptions::new();
    for (name, values) in files::load_input(&input_path).unwrap() {
        options = options.with_input_column(name, values);
    }
    let report = tree
        .commit(&mut store, options, &mut NoProgress, &CancelToken::new())
        .unwrap();
    assert!(report.is_success());
    files::save_store(&store, &store_path).unwrap();
    files::save_tree(&tree, &tree_path).unwrap();

    let store = files::load_store(&store_path).unwrap();
    assert_eq!(
        store
            .dataset_values(&StorePath::new("/runs/r1"))
            .unwrap(),
        vec![(
            "energy".to_string(),
            vec![Value::Double(1.5), Value::Double(2.5)]
        )]
    );
    let tree = files::load_tree(&tree_path).unwrap();
    assert!(tree.validate_against(&store).is_valid());
}

#[test]
fn test_unreadable_tree_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.json");
    std::fs::write(&path, "{ not json").unwrap();

    match files::load_tree(&path) {
        Err(FileError::Document { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected a document error, got {:?}", other.map(|_| ())),
    }
    assert!(matches!(
        files::load_tree(&dir.path().join("missing.json")),
        Err(FileError::Read { .. })
    ));
}

#[test]
fn test_config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("stagetree.toml");
    let config = Config {
        batch_rows: 64,
        default_store: Some(dir.path().join("store.json")),
        ..Config::default()
    };
    config.save(&path).unwrap();

    let loaded = Config::load(Some(&path)).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.tree_settings().file_suffixes, config.file_suffixes);
}
