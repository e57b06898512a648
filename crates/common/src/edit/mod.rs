//! Staged edits over a hierarchical store
//!
//! An [`EditTree`] mirrors the store and records intended changes as
//! actions on its nodes. Nothing touches the store until the tree is
//! committed.
//!
//! # Lifecycle
//!
//! - [`EditTree::mirror`] builds a tree from the store
//! - staging operations add, rename, move, copy, and delete nodes
//! - [`EditTree::integrate`] merges other staged trees in
//! - [`EditTree::validate_against`] checks the result against the store
//! - [`EditTree::commit`] applies it and reports per node outcomes

mod action;
pub mod commit;
mod conflict;
mod document;
mod error;
mod integrate;
mod mirror;
mod node;
mod policy;
mod tree;
mod validate;

pub use action::EditAction;
pub use commit::{
    CancelToken, CommitExecutor, CommitOptions, CommitReport, NoProgress, NodeState,
    ProgressSink, DEFAULT_BATCH_ROWS,
};
pub use conflict::{unique_name, Conflict, ConflictDetector};
pub use document::{KindDocument, NodeDocument, TreeDocument, DOCUMENT_VERSION};
pub use error::EditError;
pub use integrate::{IntegrationEngine, IntegrationReport};
pub use node::{
    AttributeEdit, AttributeValue, ColumnEdit, DataSetEdit, EditKind, EditNode, FileEdit,
    Namespace, NodeId, NodeKind, ValueSource,
};
pub use policy::{OverwritePolicy, PolicyFamily};
pub use tree::{DeleteOutcome, EditTree, RowCountPolicy, TreeSettings};
pub use validate::{InvalidCause, InvalidReason, ValidationPass, Validity};
