//! Backing hierarchical store interface
//!
//! The staging layer never touches persistent data directly. Everything it
//! needs from the store goes through [`HierarchicalStore`], a path and
//! handle addressed CRUD interface over groups, datasets, and attributes.
//!
//! A single logical writer is assumed: mutating methods take `&mut self` and
//! callers must serialize commits against one store instance.

pub mod memory;

use std::fmt::Debug;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::path::StorePath;
use crate::types::{CoercionError, LogicalType, StoreTypeOverride, Value};

pub use memory::{FailOp, MemoryStore};

/// Opaque reference to an object inside one store session
///
/// Handles stay valid while the object exists, including across moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(pub u64);

/// Kinds of object a store can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Group,
    DataSet,
    Attribute,
    /// Anything the staging layer cannot represent (links, named types, ...)
    Unsupported,
}

/// Shape of one dataset column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: LogicalType,
    pub store_type: StoreTypeOverride,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            store_type: StoreTypeOverride::default_for(logical_type),
        }
    }

    pub fn with_store_type(mut self, store_type: StoreTypeOverride) -> Self {
        self.store_type = store_type;
        self
    }
}

/// Direct children of a group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Children {
    pub groups: Vec<String>,
    pub datasets: Vec<String>,
    pub unsupported: Vec<String>,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSetInfo {
    pub columns: Vec<ColumnSpec>,
    pub row_count: u64,
}

impl DataSetInfo {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no object at {0}")]
    NotFound(String),
    #[error("object already exists at {0}")]
    AlreadyExists(String),
    #[error("object at {path} is a {found:?}, expected {expected:?}")]
    KindMismatch {
        path: String,
        expected: ObjectKind,
        found: ObjectKind,
    },
    #[error("invalid handle {0:?}")]
    InvalidHandle(Handle),
    #[error("column {index} out of range for dataset {path}")]
    ColumnOutOfRange { path: String, index: usize },
    #[error("row range {start}..{end} invalid for dataset {path} with {rows} rows")]
    RowRange {
        path: String,
        start: u64,
        end: u64,
        rows: u64,
    },
    #[error("type error: {0}")]
    Type(#[from] CoercionError),
    #[error("cannot move or copy {0} into itself")]
    IntoItself(String),
    #[error("injected failure: {0}")]
    Injected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Path and handle addressed access to a hierarchical store
pub trait HierarchicalStore: Debug {
    /// Handle of the root group
    fn root(&self) -> Handle;

    /// Resolve a path to a handle
    fn open(&self, path: &StorePath) -> Result<Handle, StoreError>;

    /// Current path of a handle
    fn path_of(&self, handle: Handle) -> Result<StorePath, StoreError>;

    fn exists(&self, path: &StorePath) -> bool {
        self.kind_of(path).is_some()
    }

    fn kind_of(&self, path: &StorePath) -> Option<ObjectKind>;

    fn create_group(&mut self, parent: Handle, name: &str) -> Result<Handle, StoreError>;

    /// Create an empty dataset (zero rows) with the given columns
    fn create_dataset(
        &mut self,
        parent: Handle,
        name: &str,
        columns: &[ColumnSpec],
    ) -> Result<Handle, StoreError>;

    fn delete_object(&mut self, parent: Handle, name: &str) -> Result<(), StoreError>;

    fn move_object(
        &mut self,
        old_parent: Handle,
        name: &str,
        new_parent: Handle,
        new_name: &str,
    ) -> Result<Handle, StoreError>;

    /// Structural copy of `source` (group or dataset, with attributes and
    /// all descendants) to `new_parent/new_name`
    fn copy_object(
        &mut self,
        source: &StorePath,
        new_parent: Handle,
        new_name: &str,
    ) -> Result<Handle, StoreError>;

    fn list_children(&self, group: Handle) -> Result<Children, StoreError>;

    fn dataset_info(&self, dataset: Handle) -> Result<DataSetInfo, StoreError>;

    fn read_column(&self, dataset: Handle, column_index: usize) -> Result<Vec<Value>, StoreError>;

    /// Append a column; existing rows are filled with missing values
    fn add_column(&mut self, dataset: Handle, spec: &ColumnSpec) -> Result<usize, StoreError>;

    fn delete_column(&mut self, dataset: Handle, column_index: usize) -> Result<(), StoreError>;

    /// Rename and/or re-type a column, converting its stored values
    fn alter_column(
        &mut self,
        dataset: Handle,
        column_index: usize,
        spec: &ColumnSpec,
    ) -> Result<(), StoreError>;

    /// Write a batch of rows; writing past the end grows the dataset
    fn write_column_batch(
        &mut self,
        dataset: Handle,
        column_index: usize,
        rows: Range<u64>,
        values: &[Value],
    ) -> Result<(), StoreError>;

    /// Names of the attributes attached to a group or dataset
    fn attribute_names(&self, handle: Handle) -> Result<Vec<String>, StoreError>;

    fn read_attribute(&self, handle: Handle, name: &str)
        -> Result<(LogicalType, Value), StoreError>;

    fn write_attribute(
        &mut self,
        handle: Handle,
        name: &str,
        logical_type: LogicalType,
        value: &Value,
    ) -> Result<(), StoreError>;

    fn delete_attribute(&mut self, handle: Handle, name: &str) -> Result<(), StoreError>;
}
