use crate::store::StoreError;

use super::action::EditAction;
use super::node::EditKind;
use super::policy::OverwritePolicy;
use super::validate::InvalidCause;

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// Sibling name/kind collision not resolved by policy
    #[error("{path} conflicts with {other}")]
    StructuralConflict { path: String, other: String },
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("dataset {path} has columns with {expected} and {found} rows")]
    RowCountMismatch {
        path: String,
        expected: u64,
        found: u64,
    },
    #[error("type of {0} is unresolved")]
    UnresolvedType(String),
    /// Attaching a node below itself
    #[error("cannot attach {node} below its own descendant {target}")]
    CyclicAttachment { node: String, target: String },
    #[error("store operation failed: {0}")]
    StoreOperationFailed(#[from] StoreError),
    #[error("commit cancelled")]
    Cancelled,
    /// Input column or variable the commit was not given
    #[error("no value supplied for {0}")]
    MissingInput(String),

    /* contract violations */
    /// Committing a tree that does not validate
    #[error("tree is not valid: {0}")]
    Invalid(InvalidCause),
    #[error("node {0} is bound to a store object and cannot be detached")]
    NodeBound(String),
    #[error("the root node cannot be {0}")]
    RootImmutable(&'static str),
    #[error("unknown node")]
    UnknownNode,
    #[error("policy {policy} is not available for a {kind:?} node with action {action}")]
    IllegalPolicy {
        policy: OverwritePolicy,
        kind: EditKind,
        action: EditAction,
    },
    #[error("action {action} is not possible on {path}")]
    IllegalAction { path: String, action: EditAction },
    #[error("{0} has staged edits below it")]
    PendingDescendants(String),
    #[error("a {parent:?} node cannot hold a {child:?} node")]
    KindMismatch { parent: EditKind, child: EditKind },
    #[error("document error: {0}")]
    Document(String),
}
