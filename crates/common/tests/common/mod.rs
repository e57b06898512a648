//! Shared fixtures for the staging and commit tests

#![allow(dead_code)]

use ::common::edit::{CancelToken, CommitOptions, CommitReport, EditTree, NoProgress};
use ::common::path::StorePath;
use ::common::store::{ColumnSpec, HierarchicalStore, MemoryStore};
use ::common::types::{LogicalType, Value};

pub const FILE: &str = "/data/run.h5";

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

/// Store holding `/g/d` with an int column `x` = [1, 2] and a string
/// attribute `unit` on the dataset
pub fn sample_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    let root = store.root();
    let g = store.create_group(root, "g").unwrap();
    let d = store
        .create_dataset(g, "d", &[ColumnSpec::new("x", LogicalType::Int)])
        .unwrap();
    store.write_column_batch(d, 0, 0..2, &ints(&[1, 2])).unwrap();
    store
        .write_attribute(d, "unit", LogicalType::String, &Value::Str("m".into()))
        .unwrap();
    store
}

pub fn mirror(store: &MemoryStore) -> EditTree {
    EditTree::mirror(store, FILE).unwrap()
}

/// Commit with default options, no progress and no cancellation
pub fn commit(tree: &mut EditTree, store: &mut MemoryStore) -> CommitReport {
    tree.commit(store, CommitOptions::new(), &mut NoProgress, &CancelToken::new())
        .unwrap()
}

pub fn values(store: &MemoryStore, path: &str) -> Vec<(String, Vec<Value>)> {
    store.dataset_values(&StorePath::new(path)).unwrap()
}

pub fn exists(store: &MemoryStore, path: &str) -> bool {
    store.exists(&StorePath::new(path))
}

/// Display paths of every node, in walk order
pub fn paths(tree: &EditTree) -> Vec<String> {
    tree.walk(tree.root())
        .into_iter()
        .map(|id| tree.display_path(id))
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
