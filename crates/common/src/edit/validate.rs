//! Whole tree validation
//!
//! [`ValidationPass::run`] checks the staged tree on its own.
//! [`ValidationPass::run_against`] additionally compares it with the live
//! store and is what the commit executor runs before touching anything.

use std::fmt;

use crate::path::{check_name, StorePath};
use crate::store::{HierarchicalStore, ObjectKind};
use crate::types::{LogicalType, NativeType};

use super::action::EditAction;
use super::conflict::ConflictDetector;
use super::error::EditError;
use super::node::{AttributeValue, EditKind, NodeId};
use super::policy::OverwritePolicy;
use super::tree::EditTree;

/// Why a node makes the tree invalid
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidReason {
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("file name {0:?} does not have a store file suffix")]
    IllegalFileSuffix(String),
    #[error("policy {policy} is not available for action {action}")]
    IllegalPolicy {
        policy: OverwritePolicy,
        action: EditAction,
    },
    #[error("foreign objects cannot be edited")]
    UnsupportedEdited,
    #[error("staged edit below a deleted node")]
    PendingUnderDeleted,
    #[error("columns have {expected} and {found} rows")]
    RowCountMismatch { expected: u64, found: u64 },
    #[error("logical type is unresolved")]
    UnresolvedType,
    #[error("store type {native:?} cannot hold {logical} values")]
    IncompatibleOverride {
        logical: LogicalType,
        native: NativeType,
    },
    #[error("parent chain does not lead to the root")]
    Cycle,
    #[error("name clashes with {other}")]
    StructuralConflict { other: String },
    #[error("source {0} no longer exists in the store")]
    SourceMissing(String),
    #[error("target already exists in the store")]
    TargetExists,
    #[error("cannot integrate into an existing {0:?}")]
    IntegrateKindMismatch(ObjectKind),
}

/// First problem found, with the display path of the offending node
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCause {
    pub path: String,
    pub reason: InvalidReason,
}

impl fmt::Display for InvalidCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validity {
    Valid,
    Invalid(InvalidCause),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn cause(&self) -> Option<&InvalidCause> {
        match self {
            Self::Valid => None,
            Self::Invalid(cause) => Some(cause),
        }
    }

    /// Turn the outcome into the matching [`EditError`] variant
    pub fn into_result(self) -> Result<(), EditError> {
        let cause = match self {
            Self::Valid => return Ok(()),
            Self::Invalid(cause) => cause,
        };
        Err(match cause.reason {
            InvalidReason::StructuralConflict { other } => EditError::StructuralConflict {
                path: cause.path,
                other,
            },
            InvalidReason::InvalidName(reason) => EditError::InvalidName {
                name: cause.path,
                reason,
            },
            InvalidReason::RowCountMismatch { expected, found } => EditError::RowCountMismatch {
                path: cause.path,
                expected,
                found,
            },
            InvalidReason::UnresolvedType => EditError::UnresolvedType(cause.path),
            _ => EditError::Invalid(cause),
        })
    }
}

/// Validation walk over one tree
#[derive(Debug, Clone, Copy)]
pub struct ValidationPass<'a> {
    tree: &'a EditTree,
}

impl<'a> ValidationPass<'a> {
    pub fn new(tree: &'a EditTree) -> Self {
        Self { tree }
    }

    /// Structural checks on the staged tree alone
    pub fn run(&self) -> Validity {
        match self.check_structure() {
            Ok(()) => Validity::Valid,
            Err(cause) => Validity::Invalid(cause),
        }
    }

    /// Structural checks plus checks against the live store
    pub fn run_against(&self, store: &dyn HierarchicalStore) -> Validity {
        let result = self
            .check_structure()
            .and_then(|()| self.check_store(store));
        match result {
            Ok(()) => Validity::Valid,
            Err(cause) => {
                tracing::debug!(%cause, "tree failed store validation");
                Validity::Invalid(cause)
            }
        }
    }

    fn invalid(&self, id: NodeId, reason: InvalidReason) -> InvalidCause {
        InvalidCause {
            path: self.tree.display_path(id),
            reason,
        }
    }

    fn check_structure(&self) -> Result<(), InvalidCause> {
        let tree = self.tree;
        let root = tree.root();
        self.check_file_name(root)?;

        // (node, below a deleted ancestor)
        let mut stack = vec![(root, false)];
        let mut visited = 0usize;
        while let Some((id, under_deleted)) = stack.pop() {
            visited += 1;
            if visited > tree.node_count() {
                return Err(self.invalid(id, InvalidReason::Cycle));
            }
            let Some(node) = tree.get(id) else {
                continue;
            };

            if id != root {
                check_name(node.name()).map_err(|reason| {
                    self.invalid(id, InvalidReason::InvalidName(reason.to_string()))
                })?;
            }
            if !node.policy().available_for(node.tag(), node.action()) {
                return Err(self.invalid(
                    id,
                    InvalidReason::IllegalPolicy {
                        policy: node.policy(),
                        action: node.action(),
                    },
                ));
            }
            if node.tag() == EditKind::Unsupported && node.action() != EditAction::NoAction {
                return Err(self.invalid(id, InvalidReason::UnsupportedEdited));
            }
            if under_deleted && node.action().is_pending() {
                return Err(self.invalid(id, InvalidReason::PendingUnderDeleted));
            }
            self.check_payload(id)?;

            if let Some(conflict) = ConflictDetector::new(tree).conflicts_under(id).first() {
                return Err(self.invalid(
                    conflict.node,
                    InvalidReason::StructuralConflict {
                        other: tree.display_path(conflict.other),
                    },
                ));
            }

            let deleted = under_deleted || node.action().is_delete();
            for child in node.children().iter().rev() {
                if tree.parent(*child) != Some(id) {
                    return Err(self.invalid(*child, InvalidReason::Cycle));
                }
                stack.push((*child, deleted));
            }
        }
        Ok(())
    }

    fn check_file_name(&self, root: NodeId) -> Result<(), InvalidCause> {
        let file_name = self
            .tree
            .file_path()
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let legal = self
            .tree
            .settings()
            .file_suffixes
            .iter()
            .any(|suffix| file_name.len() > suffix.len() && file_name.ends_with(&suffix.to_lowercase()));
        if legal {
            Ok(())
        } else {
            Err(self.invalid(root, InvalidReason::IllegalFileSuffix(file_name)))
        }
    }

    fn check_payload(&self, id: NodeId) -> Result<(), InvalidCause> {
        let tree = self.tree;
        let Some(node) = tree.get(id) else {
            return Ok(());
        };
        match node.tag() {
            EditKind::DataSet if node.is_live() => {
                if let Err((expected, found)) = tree.resolved_row_count(id) {
                    return Err(self.invalid(id, InvalidReason::RowCountMismatch { expected, found }));
                }
            }
            EditKind::Column if node.is_live() => {
                let Some(column) = node.column() else {
                    return Ok(());
                };
                let Some(logical) = column.logical_type else {
                    return Err(self.invalid(id, InvalidReason::UnresolvedType));
                };
                if let Some(store_type) = column.store_type {
                    if !store_type.native.accepts(logical) {
                        return Err(self.invalid(
                            id,
                            InvalidReason::IncompatibleOverride {
                                logical,
                                native: store_type.native,
                            },
                        ));
                    }
                }
            }
            EditKind::Attribute if node.is_live() => {
                let Some(attribute) = node.attribute() else {
                    return Ok(());
                };
                let resolved = attribute.logical_type.is_some()
                    || (attribute.value == AttributeValue::Stored && !node.action().is_pending());
                if !resolved {
                    return Err(self.invalid(id, InvalidReason::UnresolvedType));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_store(&self, store: &dyn HierarchicalStore) -> Result<(), InvalidCause> {
        let tree = self.tree;
        for id in tree.walk(tree.root()) {
            let Some(node) = tree.get(id) else {
                continue;
            };
            if id == tree.root() || node.tag() == EditKind::Unsupported {
                continue;
            }
            if self.inside_new_content(id) {
                continue;
            }

            if let Some(source) = node.source_path() {
                let same_file = node.source_file().is_none();
                let must_exist = node.action().refers_to_existing()
                    || (node.action() == EditAction::Copy && same_file);
                if must_exist && !source_exists(store, node.tag(), source) {
                    return Err(self.invalid(id, InvalidReason::SourceMissing(source.to_string())));
                }
            }

            let creates = node.action().is_create_or_copy();
            let relocates = node.action() == EditAction::Modify
                && node
                    .source_path()
                    .is_some_and(|source| *source != self.store_target(id));
            if creates || relocates {
                self.check_target(store, id)?;
            }
        }
        Ok(())
    }

    /// True when some ancestor is itself new content, so nothing below it
    /// can exist in the store yet
    fn inside_new_content(&self, id: NodeId) -> bool {
        let mut current = self.tree.parent(id);
        while let Some(ancestor) = current {
            match self.tree.get(ancestor) {
                Some(node) if node.action().is_create_or_copy() => {
                    return node.policy() != OverwritePolicy::Integrate;
                }
                Some(node) => current = node.parent(),
                None => return false,
            }
        }
        false
    }

    /// Path the node will have in the store, columns and attributes included
    fn store_target(&self, id: NodeId) -> StorePath {
        self.tree.target_path(id)
    }

    fn check_target(&self, store: &dyn HierarchicalStore, id: NodeId) -> Result<(), InvalidCause> {
        let tree = self.tree;
        let Some(node) = tree.get(id) else {
            return Ok(());
        };
        let target = self.store_target(id);
        let Some(existing) = target_kind(store, tree, id, &target) else {
            return Ok(());
        };

        // a sibling deleting or moving the occupant frees the name
        let vacated = tree
            .parent(id)
            .map(|parent| tree.children(parent))
            .unwrap_or(&[])
            .iter()
            .filter(|s| **s != id)
            .filter_map(|s| tree.get(*s).map(|n| (*s, n)))
            .any(|(sibling, n)| {
                n.source_path() == Some(&target)
                    && (n.action().is_delete() || self.store_target(sibling) != target)
            });
        if vacated {
            return Ok(());
        }

        match node.policy() {
            OverwritePolicy::None | OverwritePolicy::Abort => {
                Err(self.invalid(id, InvalidReason::TargetExists))
            }
            OverwritePolicy::Integrate => {
                let wanted = match node.tag() {
                    EditKind::DataSet => ObjectKind::DataSet,
                    _ => ObjectKind::Group,
                };
                if existing == wanted {
                    Ok(())
                } else {
                    Err(self.invalid(id, InvalidReason::IntegrateKindMismatch(existing)))
                }
            }
            OverwritePolicy::Overwrite | OverwritePolicy::Rename => Ok(()),
        }
    }
}

/// Kind of whatever occupies `target` in the store, for the namespace of `id`
fn target_kind(
    store: &dyn HierarchicalStore,
    tree: &EditTree,
    id: NodeId,
    target: &StorePath,
) -> Option<ObjectKind> {
    let node = tree.get(id)?;
    match node.tag() {
        EditKind::Column => {
            let dataset = store.open(&target.parent()?).ok()?;
            let info = store.dataset_info(dataset).ok()?;
            info.column_index(target.name()).map(|_| ObjectKind::DataSet)
        }
        EditKind::Attribute => {
            let owner = store.open(&target.parent()?).ok()?;
            store
                .read_attribute(owner, target.name())
                .ok()
                .map(|_| ObjectKind::Attribute)
        }
        _ => match store.kind_of(target)? {
            ObjectKind::Attribute => None,
            kind => Some(kind),
        },
    }
}

fn source_exists(store: &dyn HierarchicalStore, kind: EditKind, source: &StorePath) -> bool {
    match kind {
        EditKind::Column => source
            .parent()
            .and_then(|dataset| store.open(&dataset).ok())
            .and_then(|dataset| store.dataset_info(dataset).ok())
            .is_some_and(|info| info.column_index(source.name()).is_some()),
        EditKind::Attribute => store.kind_of(source) == Some(ObjectKind::Attribute),
        _ => store.exists(source),
    }
}

impl EditTree {
    /// Structural validation of the staged tree
    pub fn validate(&self) -> Validity {
        ValidationPass::new(self).run()
    }

    /// Validation including checks against the live store
    pub fn validate_against(&self, store: &dyn HierarchicalStore) -> Validity {
        ValidationPass::new(self).run_against(store)
    }
}
