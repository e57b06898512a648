//! Reading and writing the files the tool operates on
//!
//! Staged trees are stored as JSON tree documents, stores as JSON
//! snapshots of the in-memory store, and input tables as JSON objects
//! mapping column names to value arrays.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::edit::{EditError, EditTree, TreeDocument};
use common::store::{MemoryStore, StoreError};
use common::types::Value;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid tree document {path}: {source}")]
    Document { path: PathBuf, source: EditError },
    #[error("invalid store snapshot {path}: {source}")]
    Store { path: PathBuf, source: StoreError },
    #[error("invalid input table {path}: {source}")]
    Input {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("expected NAME=VALUE, got {0:?}")]
    Assignment(String),
}

pub fn load_tree(path: &Path) -> Result<EditTree, FileError> {
    let json = std::fs::read_to_string(path).map_err(|source| FileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document = TreeDocument::from_json(&json).map_err(|source| FileError::Document {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = EditTree::from_document(&document).map_err(|source| FileError::Document {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), nodes = tree.node_count(), "loaded staged tree");
    Ok(tree)
}

pub fn save_tree(tree: &EditTree, path: &Path) -> Result<(), FileError> {
    let document_error = |source| FileError::Document {
        path: path.to_path_buf(),
        source,
    };
    let json = tree
        .to_document()
        .and_then(|document| document.to_json())
        .map_err(document_error)?;
    std::fs::write(path, json).map_err(|source| FileError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "saved staged tree");
    Ok(())
}

pub fn load_store(path: &Path) -> Result<MemoryStore, FileError> {
    MemoryStore::load(path).map_err(|source| FileError::Store {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_store(store: &MemoryStore, path: &Path) -> Result<(), FileError> {
    store.save(path).map_err(|source| FileError::Store {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an input table, `{"column": [values...]}`
pub fn load_input(path: &Path) -> Result<HashMap<String, Vec<Value>>, FileError> {
    let json = std::fs::read_to_string(path).map_err(|source| FileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| FileError::Input {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a command line value: booleans, integers, and floats are
/// recognized, anything else is a string
pub fn parse_value(raw: &str) -> Value {
    if let Ok(v) = raw.parse::<bool>() {
        return Value::Bool(v);
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return Value::Double(v);
    }
    Value::Str(raw.to_string())
}

/// Split `NAME=VALUE`
pub fn parse_assignment(raw: &str) -> Result<(String, Value), FileError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), parse_value(value)))
        }
        _ => Err(FileError::Assignment(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("42"), Value::Int(42));
        assert_eq!(parse_value("2.5"), Value::Double(2.5));
        assert_eq!(parse_value("run 7"), Value::Str("run 7".into()));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("operator=ada").unwrap(),
            ("operator".to_string(), Value::Str("ada".into()))
        );
        assert_eq!(
            parse_assignment("n=").unwrap(),
            ("n".to_string(), Value::Str(String::new()))
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=3").is_err());
    }
}
