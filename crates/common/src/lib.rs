//! Staged editing of hierarchical stores
//!
//! A hierarchical store holds groups, datasets (tables of typed columns),
//! and attributes, addressed by slash separated paths. This crate stages
//! edits to such a store in an in-memory tree, validates them, merges
//! staged trees, and commits the result.

pub mod edit;
pub mod path;
pub mod store;
pub mod types;

pub mod prelude {
    pub use crate::edit::{
        AttributeValue, CancelToken, ColumnEdit, CommitOptions, CommitReport, EditAction,
        EditError, EditTree, NoProgress, NodeId, OverwritePolicy, ValueSource,
    };
    pub use crate::path::StorePath;
    pub use crate::store::{HierarchicalStore, MemoryStore};
    pub use crate::types::{LogicalType, Value};
}
