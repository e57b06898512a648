//! Executing a staged tree against a store
//!
//! The executor rebinds the tree to the live store, validates it strictly,
//! and then walks it top down. Children of a container are committed in
//! phases: deletes first, then modifications, then new content, then
//! untouched nodes. Inside each phase containers go before leaves,
//! overwriting containers before undecided ones before renaming or merging
//! ones, and groups before datasets. A failing container skips its
//! subtree; a failing leaf only itself. Nodes that committed are re-anchored on their new location.

mod progress;
mod report;
mod transfer;

pub use progress::{CancelToken, NoProgress, ProgressSink};
pub use report::{CommitReport, NodeState};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::path::StorePath;
use crate::store::{ColumnSpec, Handle, HierarchicalStore, ObjectKind, StoreError};
use crate::types::{LogicalType, Value};

use super::action::EditAction;
use super::conflict::unique_name;
use super::error::EditError;
use super::node::{
    AttributeEdit, AttributeValue, ColumnEdit, EditKind, Namespace, NodeId, NodeKind, ValueSource,
};
use super::policy::{OverwritePolicy, PolicyFamily};
use super::tree::{EditTree, RowCountPolicy};
use super::validate::Validity;

use progress::ProgressTracker;

/// Rows written per store call unless configured otherwise
pub const DEFAULT_BATCH_ROWS: usize = 1024;

/// Inputs of a commit besides the tree and the store
#[derive(Debug)]
pub struct CommitOptions<'a> {
    pub batch_rows: usize,
    /// Values for attributes staged as variables
    pub variables: HashMap<String, Value>,
    /// Input table for columns fed from an input column
    pub input: HashMap<String, Vec<Value>>,
    /// Other store files copies may read from, by file path
    pub sources: HashMap<PathBuf, &'a dyn HierarchicalStore>,
}

impl Default for CommitOptions<'_> {
    fn default() -> Self {
        Self {
            batch_rows: DEFAULT_BATCH_ROWS,
            variables: HashMap::new(),
            input: HashMap::new(),
            sources: HashMap::new(),
        }
    }
}

impl<'a> CommitOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_input_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.input.insert(name.into(), values);
        self
    }

    pub fn with_source(mut self, file: impl Into<PathBuf>, store: &'a dyn HierarchicalStore) -> Self {
        self.sources.insert(file.into(), store);
        self
    }
}

/// Commit order among siblings
fn phase(action: EditAction) -> u8 {
    match action {
        EditAction::Delete => 0,
        EditAction::Modify => 1,
        EditAction::Create | EditAction::Copy => 2,
        EditAction::NoAction | EditAction::ModifyChildrenOnly => 3,
    }
}

/// Commit order among containers of one phase: an overwriting node claims
/// its name first, nodes that rename or merge go after everybody else
fn policy_rank(policy: OverwritePolicy) -> u8 {
    match policy.family() {
        PolicyFamily::Replace => 0,
        PolicyFamily::Unresolved => 1,
        PolicyFamily::Resolving => 2,
    }
}

/// A store name taken by a container committed earlier in this commit
#[derive(Debug, Clone, Copy)]
struct Claim {
    node: NodeId,
    policy: OverwritePolicy,
    /// First entry of the node's subtree in `committed_paths`
    first_entry: usize,
}

/// Walks a validated tree and applies it to a store
pub struct CommitExecutor<'a> {
    tree: &'a mut EditTree,
    store: &'a mut dyn HierarchicalStore,
    options: CommitOptions<'a>,
    progress: ProgressTracker<'a>,
    cancel: CancelToken,
    states: HashMap<NodeId, NodeState>,
    /// Columns that came into being together with their dataset
    created_columns: HashSet<NodeId>,
    /// Nodes whose store object no longer exists
    gone: Vec<NodeId>,
    claimed: HashMap<StorePath, Claim>,
    report: CommitReport,
}

impl<'a> CommitExecutor<'a> {
    pub fn new(
        tree: &'a mut EditTree,
        store: &'a mut dyn HierarchicalStore,
        options: CommitOptions<'a>,
        progress: &'a mut dyn ProgressSink,
        cancel: CancelToken,
    ) -> Self {
        Self {
            tree,
            store,
            options,
            progress: ProgressTracker::new(0, progress),
            cancel,
            states: HashMap::new(),
            created_columns: HashSet::new(),
            gone: Vec::new(),
            claimed: HashMap::new(),
            report: CommitReport::default(),
        }
    }

    pub fn run(mut self) -> Result<CommitReport, EditError> {
        self.tree.rebind(&*self.store);
        if let Validity::Invalid(cause) = self.tree.validate_against(&*self.store) {
            tracing::warn!(%cause, "refusing to commit invalid tree");
            return Err(EditError::Invalid(cause));
        }

        let total = self.planned_units();
        self.progress.set_total(total);
        tracing::info!(
            file = %self.tree.file_path().display(),
            units = total,
            "committing staged tree"
        );

        let root = self.tree.root();
        match self.commit_children(root) {
            Ok(()) => {}
            Err(EditError::Cancelled) => {
                tracing::warn!("commit cancelled, returning partial report");
                self.report.cancelled = true;
            }
            Err(err) => return Err(err),
        }

        for id in self.tree.walk(root) {
            if let Some(state) = self.states.get(&id) {
                self.report
                    .node_states
                    .push((self.tree.display_path(id), *state));
            }
        }
        for id in std::mem::take(&mut self.gone) {
            if self.tree.get(id).is_some() {
                self.tree.detach(id)?;
            }
        }
        self.normalize_actions();
        if !self.report.cancelled {
            self.progress.finish();
        }

        tracing::info!(
            committed = self.report.committed_paths.len(),
            failed = self.report.failed_paths.len(),
            skipped = self.report.skipped_paths.len(),
            leaves = self.report.leaves_written,
            cancelled = self.report.cancelled,
            "commit finished"
        );
        Ok(self.report)
    }

    fn commit_children(&mut self, parent: NodeId) -> Result<(), EditError> {
        let mut children = self.tree.children(parent).to_vec();
        children.sort_by_key(|c| {
            self.tree
                .get(*c)
                .map(|n| {
                    let leaf = n.tag().is_leaf();
                    let rank = if leaf { 0 } else { policy_rank(n.policy()) };
                    (phase(n.action()), leaf, rank, n.tag().priority())
                })
                .unwrap_or((u8::MAX, true, u8::MAX, u8::MAX))
        });
        for child in children {
            if self.cancel.is_cancelled() {
                return Err(EditError::Cancelled);
            }
            if self.states.get(&child) == Some(&NodeState::Skipped) {
                continue;
            }
            self.commit_node(child)?;
        }
        Ok(())
    }

    fn commit_node(&mut self, id: NodeId) -> Result<(), EditError> {
        let node = self.tree.node(id)?;
        let tag = node.tag();
        let action = node.action();
        let policy = node.policy();
        if tag == EditKind::Unsupported {
            return Ok(());
        }
        if matches!(action, EditAction::NoAction | EditAction::ModifyChildrenOnly) {
            if tag.is_container() {
                return self.commit_children(id);
            }
            return Ok(());
        }

        let path = self.tree.display_path(id);
        if action.is_create_or_copy() && tag.is_container() && self.overwritten_by_sibling(id) {
            self.displace(id, None);
            return Ok(());
        }
        self.states.insert(id, NodeState::Running);
        tracing::debug!(%path, %action, "committing node");

        if tag.is_leaf() {
            self.commit_leaf(id, path);
            return Ok(());
        }

        let result = match action {
            EditAction::Delete => self.delete_container(id),
            EditAction::Modify => self.modify_container(id),
            EditAction::Create => self.create_container(id),
            EditAction::Copy => self.copy_container(id),
            EditAction::NoAction | EditAction::ModifyChildrenOnly => Ok(()),
        };

        match result {
            Ok(()) => {
                self.states.insert(id, NodeState::Committed);
                let first_entry = self.report.committed_paths.len();
                if action != EditAction::Delete {
                    if let Some(target) = self.store_path_of(id) {
                        self.claimed.insert(
                            target,
                            Claim {
                                node: id,
                                policy,
                                first_entry,
                            },
                        );
                    }
                }
                // a rename picked while committing changes the path
                self.report
                    .committed_paths
                    .push(if action == EditAction::Delete {
                        path
                    } else {
                        self.tree.display_path(id)
                    });
                if action != EditAction::Delete {
                    self.commit_children(id)?;
                }
            }
            Err(EditError::Cancelled) => return Err(EditError::Cancelled),
            Err(err) => {
                tracing::warn!(%path, error = %err, "commit of node failed");
                self.states.insert(id, NodeState::Failed);
                self.report.failed_paths.push((path, err.to_string()));
                match action {
                    // the object is still where it was and its handle valid
                    EditAction::Modify => self.commit_children(id)?,
                    EditAction::Delete => {}
                    _ => self.skip_subtree(id),
                }
            }
        }
        Ok(())
    }

    fn commit_leaf(&mut self, id: NodeId, path: String) {
        let result = match self.tree.get(id).map(|n| n.tag()) {
            Some(EditKind::Column) => self.commit_column(id),
            Some(EditKind::Attribute) => self.commit_attribute(id),
            _ => Ok(false),
        };
        match result {
            Ok(written) => {
                self.states.insert(id, NodeState::Committed);
                if written {
                    self.report.leaves_written += 1;
                }
            }
            Err(err) => {
                tracing::warn!(%path, error = %err, "commit of leaf failed");
                self.states.insert(id, NodeState::Failed);
                self.report.failed_paths.push((path, err.to_string()));
            }
        }
    }

    fn skip_subtree(&mut self, id: NodeId) {
        for descendant in self.tree.descendants(id) {
            let Some(node) = self.tree.get(descendant) else {
                continue;
            };
            if node.tag() == EditKind::Unsupported {
                continue;
            }
            if node.tag().is_container() && node.action().is_pending() {
                self.report
                    .skipped_paths
                    .push(self.tree.display_path(descendant));
            }
            self.states.insert(descendant, NodeState::Skipped);
        }
    }

    /// Whether a sibling committed earlier with `Overwrite` took the name
    /// this unresolved new container wants
    fn overwritten_by_sibling(&self, id: NodeId) -> bool {
        let Some(node) = self.tree.get(id) else {
            return false;
        };
        if node.policy().family() != PolicyFamily::Unresolved {
            return false;
        }
        let Some(parent) = node.parent() else {
            return false;
        };
        let Some(parent_path) = self.store_path_of(parent) else {
            return false;
        };
        self.claimed
            .get(&parent_path.join(node.name()))
            .is_some_and(|claim| claim.node != id && claim.policy == OverwritePolicy::Overwrite)
    }

    /// Drop a node an overwriting sibling replaced, together with its
    /// subtree and whatever of it was already reported as committed
    fn displace(&mut self, id: NodeId, first_entry: Option<usize>) {
        let path = self.tree.display_path(id);
        if let Some(first) = first_entry {
            let prefix = format!("{}/", path);
            let first = first.min(self.report.committed_paths.len());
            let tail = self.report.committed_paths.split_off(first);
            self.report
                .committed_paths
                .extend(tail.into_iter().filter(|p| *p != path && !p.starts_with(&prefix)));
        }
        tracing::info!(%path, "replaced by an overwriting sibling");
        self.report.skipped_paths.push(path);
        self.skip_subtree(id);
        self.states.insert(id, NodeState::Skipped);
        self.gone.push(id);
    }

    /* Containers */

    fn delete_container(&mut self, id: NodeId) -> Result<(), EditError> {
        let (parent, name) = self.locate(id)?;
        self.store.delete_object(parent, &name)?;
        self.gone.push(id);
        Ok(())
    }

    fn modify_container(&mut self, id: NodeId) -> Result<(), EditError> {
        let (old_parent, stored_name) = self.locate(id)?;
        let node = self.tree.node(id)?;
        let new_name = node.name().to_string();
        let policy = node.policy();
        let parent = node.parent().ok_or(EditError::UnknownNode)?;
        let new_parent = self.handle_of(parent)?;

        let current = self.store.path_of(old_parent)?.join(&stored_name);
        let target = self.store.path_of(new_parent)?.join(&new_name);
        if current != target {
            if existing_object(&*self.store, &target).is_some() {
                self.clear_target(id, parent, new_parent, &target, policy)?;
            }
            let handle = self
                .store
                .move_object(old_parent, &stored_name, new_parent, &new_name)?;
            self.tree.bind(id, Some(handle))?;
            tracing::info!(from = %current, to = %target, "moved object");
        }
        self.reanchor(id)
    }

    fn create_container(&mut self, id: NodeId) -> Result<(), EditError> {
        let (parent_handle, name, existing) = self.prepare_new(id)?;
        let handle = match existing {
            Some(handle) => handle,
            None => match self.tree.node(id)?.tag() {
                EditKind::DataSet => {
                    self.warn_unknown_rows(id);
                    let (specs, columns) = self.new_column_specs(id)?;
                    let handle = self.store.create_dataset(parent_handle, &name, &specs)?;
                    self.created_columns.extend(columns);
                    handle
                }
                _ => self.store.create_group(parent_handle, &name)?,
            },
        };
        self.tree.bind(id, Some(handle))?;
        self.reanchor(id)
    }

    fn copy_container(&mut self, id: NodeId) -> Result<(), EditError> {
        let node = self.tree.node(id)?;
        let path = self.tree.display_path(id);
        let source = node
            .source_path()
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        let source_file = node.source_file().cloned();
        let (parent_handle, name, existing) = self.prepare_new(id)?;
        let batch_rows = self.options.batch_rows;

        let foreign = match &source_file {
            Some(file) => Some(self.source_store(file)?),
            None => None,
        };
        let handle = match (existing, foreign) {
            (Some(target), Some(foreign)) => {
                let snapshot = transfer::snapshot(foreign, &source)?;
                transfer::merge_into(&mut *self.store, target, &snapshot, batch_rows)?;
                target
            }
            (Some(target), None) => {
                let snapshot = transfer::snapshot(&*self.store, &source)?;
                transfer::merge_into(&mut *self.store, target, &snapshot, batch_rows)?;
                target
            }
            (None, Some(foreign)) => {
                let snapshot = transfer::snapshot(foreign, &source)?;
                transfer::recreate(&mut *self.store, parent_handle, &name, &snapshot, batch_rows)?
            }
            (None, None) => self.store.copy_object(&source, parent_handle, &name)?,
        };
        tracing::info!(from = %source, to = %self.store.path_of(handle)?, "copied object");
        self.tree.bind(id, Some(handle))?;
        self.reanchor(id)
    }

    /// Resolve what occupies the target of a new container
    ///
    /// Returns the parent handle, the name to use, and the handle of an
    /// existing object to merge into.
    fn prepare_new(&mut self, id: NodeId) -> Result<(Handle, String, Option<Handle>), EditError> {
        let node = self.tree.node(id)?;
        let policy = node.policy();
        let mut name = node.name().to_string();
        let parent = node.parent().ok_or(EditError::UnknownNode)?;
        let parent_handle = self.handle_of(parent)?;
        let parent_path = self.store.path_of(parent_handle)?;
        let target = parent_path.join(&name);

        let Some(kind) = existing_object(&*self.store, &target) else {
            return Ok((parent_handle, name, None));
        };
        match policy {
            OverwritePolicy::Integrate => {
                tracing::debug!(path = %target, ?kind, "integrating into existing object");
                return Ok((parent_handle, name, Some(self.store.open(&target)?)));
            }
            OverwritePolicy::Rename => {
                let store = &*self.store;
                name = unique_name(&name, |n| existing_object(store, &parent_path.join(n)).is_some());
                tracing::info!(path = %target, new_name = %name, "renamed to avoid existing object");
                self.tree.node_mut(id)?.name = name.clone();
            }
            _ => self.clear_target(id, parent, parent_handle, &target, policy)?,
        }
        Ok((parent_handle, name, None))
    }

    /// Make room at `target` for node `id`, deleting the occupant if the
    /// policy allows it
    fn clear_target(
        &mut self,
        id: NodeId,
        parent: NodeId,
        parent_handle: Handle,
        target: &StorePath,
        policy: OverwritePolicy,
    ) -> Result<(), EditError> {
        if policy != OverwritePolicy::Overwrite {
            return Err(StoreError::AlreadyExists(target.to_string()).into());
        }
        self.store.delete_object(parent_handle, target.name())?;
        tracing::info!(path = %target, "overwrote existing object");

        // a sibling committed earlier in this commit held the name
        let displaced = self
            .claimed
            .remove(target)
            .filter(|claim| claim.node != id)
            .map(|claim| {
                self.displace(claim.node, Some(claim.first_entry));
                claim.node
            });

        // mirrors of the deleted object have nothing left to commit
        let tree_target = self.tree.target_path(parent).join(target.name());
        let siblings = self.tree.children(parent).to_vec();
        for sibling in siblings {
            if sibling == id || Some(sibling) == displaced {
                continue;
            }
            let mirrors_target = self.tree.get(sibling).is_some_and(|n| {
                n.tag().namespace() == Namespace::Objects
                    && n.action().refers_to_existing()
                    && n.source_path() == Some(&tree_target)
            });
            if mirrors_target {
                self.states.insert(sibling, NodeState::Skipped);
                for descendant in self.tree.descendants(sibling) {
                    self.states.insert(descendant, NodeState::Skipped);
                }
                self.gone.push(sibling);
            }
        }
        Ok(())
    }

    /// Specs of the staged columns created together with a new dataset
    fn new_column_specs(&self, dataset: NodeId) -> Result<(Vec<ColumnSpec>, Vec<NodeId>), EditError> {
        let mut specs = Vec::new();
        let mut ids = Vec::new();
        for child in self.tree.children(dataset) {
            let node = self.tree.node(*child)?;
            if node.action() != EditAction::Create {
                continue;
            }
            let Some(column) = node.column() else {
                continue;
            };
            let spec = column
                .spec(node.name())
                .ok_or_else(|| EditError::UnresolvedType(self.tree.display_path(*child)))?;
            specs.push(spec);
            ids.push(*child);
        }
        Ok((specs, ids))
    }

    /* Leaves */

    fn commit_column(&mut self, id: NodeId) -> Result<bool, EditError> {
        let node = self.tree.node(id)?;
        let path = self.tree.display_path(id);
        let action = node.action();
        let policy = node.policy();
        let name = node.name().to_string();
        let stored_name = node.stored_name().map(str::to_string);
        let source_path = node.source_path().cloned();
        let source_file = node.source_file().cloned();
        let column = node.column().cloned().ok_or(EditError::UnknownNode)?;
        let dataset = node.parent().ok_or(EditError::UnknownNode)?;
        let dataset_handle = self.handle_of(dataset)?;
        let info = self.store.dataset_info(dataset_handle)?;
        let spec = column.spec(&name);

        let index = match action {
            EditAction::Delete => {
                let stored = stored_name.unwrap_or(name);
                let index = info
                    .column_index(&stored)
                    .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                self.store.delete_column(dataset_handle, index)?;
                self.gone.push(id);
                return Ok(false);
            }
            EditAction::Modify => {
                let stored = stored_name.unwrap_or_else(|| name.clone());
                let mut index = info
                    .column_index(&stored)
                    .ok_or_else(|| StoreError::NotFound(path.clone()))?;
                if stored != name {
                    if let Some(occupant) = info.column_index(&name) {
                        if policy != OverwritePolicy::Overwrite {
                            return Err(StoreError::AlreadyExists(path).into());
                        }
                        self.store.delete_column(dataset_handle, occupant)?;
                        if occupant < index {
                            index -= 1;
                        }
                    }
                }
                let spec = spec.ok_or_else(|| EditError::UnresolvedType(path.clone()))?;
                self.store.alter_column(dataset_handle, index, &spec)?;
                if column.source.is_stored() {
                    self.reanchor(id)?;
                    return Ok(true);
                }
                index
            }
            EditAction::Create | EditAction::Copy => {
                if self.created_columns.contains(&id) {
                    info.column_index(&name)
                        .ok_or_else(|| StoreError::NotFound(path.clone()))?
                } else {
                    let mut spec = spec.ok_or_else(|| EditError::UnresolvedType(path.clone()))?;
                    if let Some(occupant) = info.column_index(&name) {
                        match policy {
                            OverwritePolicy::Overwrite => {
                                self.store.delete_column(dataset_handle, occupant)?
                            }
                            OverwritePolicy::Rename => {
                                spec.name = unique_name(&name, |n| info.column_index(n).is_some());
                                self.tree.node_mut(id)?.name = spec.name.clone();
                            }
                            _ => return Err(StoreError::AlreadyExists(path).into()),
                        }
                    }
                    self.store.add_column(dataset_handle, &spec)?
                }
            }
            EditAction::NoAction | EditAction::ModifyChildrenOnly => return Ok(false),
        };

        let values = match (&column.source, action) {
            (ValueSource::Stored { .. }, EditAction::Copy) => {
                let source = source_path.ok_or_else(|| StoreError::NotFound(path.clone()))?;
                self.read_source_column(&source, source_file.as_ref())?
            }
            _ => self.column_values(dataset, &column)?,
        };
        self.write_column(dataset_handle, index, &values)?;
        self.reanchor(id)?;
        Ok(true)
    }

    fn commit_attribute(&mut self, id: NodeId) -> Result<bool, EditError> {
        let node = self.tree.node(id)?;
        let path = self.tree.display_path(id);
        let action = node.action();
        let policy = node.policy();
        let mut name = node.name().to_string();
        let stored_name = node.stored_name().map(str::to_string);
        let source_path = node.source_path().cloned();
        let source_file = node.source_file().cloned();
        let attribute = node.attribute().cloned().ok_or(EditError::UnknownNode)?;
        let owner = node.parent().ok_or(EditError::UnknownNode)?;
        let owner_handle = self.handle_of(owner)?;
        let exists = |store: &dyn HierarchicalStore, name: &str| {
            store
                .attribute_names(owner_handle)
                .is_ok_and(|names| names.iter().any(|n| n == name))
        };

        let (logical_type, value) = match action {
            EditAction::Delete => {
                let stored = stored_name.unwrap_or(name);
                self.store.delete_attribute(owner_handle, &stored)?;
                self.gone.push(id);
                return Ok(false);
            }
            EditAction::Modify => {
                let stored = stored_name.unwrap_or_else(|| name.clone());
                let (old_type, old_value) = self.store.read_attribute(owner_handle, &stored)?;
                let resolved = match self.attribute_value(&path, &attribute)? {
                    Some(resolved) => resolved,
                    None => (attribute.logical_type.unwrap_or(old_type), old_value),
                };
                if stored != name {
                    if exists(&*self.store, &name) && policy != OverwritePolicy::Overwrite {
                        return Err(StoreError::AlreadyExists(path).into());
                    }
                    self.store.delete_attribute(owner_handle, &stored)?;
                }
                resolved
            }
            EditAction::Create | EditAction::Copy => {
                if exists(&*self.store, &name) {
                    match policy {
                        OverwritePolicy::Overwrite => {}
                        OverwritePolicy::Rename => {
                            let store = &*self.store;
                            name = unique_name(&name, |n| exists(store, n));
                            self.tree.node_mut(id)?.name = name.clone();
                        }
                        _ => return Err(StoreError::AlreadyExists(path).into()),
                    }
                }
                match self.attribute_value(&path, &attribute)? {
                    Some(resolved) => resolved,
                    None => {
                        let source =
                            source_path.ok_or_else(|| StoreError::NotFound(path.clone()))?;
                        self.read_source_attribute(&source, source_file.as_ref())?
                    }
                }
            }
            EditAction::NoAction | EditAction::ModifyChildrenOnly => return Ok(false),
        };

        self.store
            .write_attribute(owner_handle, &name, logical_type, &value)?;
        self.progress.advance(1);
        self.reanchor(id)?;
        Ok(true)
    }

    /// Staged attribute value, `None` when it is the stored one
    fn attribute_value(
        &self,
        path: &str,
        attribute: &AttributeEdit,
    ) -> Result<Option<(LogicalType, Value)>, EditError> {
        let value = match &attribute.value {
            AttributeValue::Literal { value } => value.clone(),
            AttributeValue::Variable { name } => self
                .options
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EditError::MissingInput(format!("variable {}", name)))?,
            AttributeValue::Stored => return Ok(None),
        };
        let logical_type = attribute
            .logical_type
            .or_else(|| value.logical_type())
            .ok_or_else(|| EditError::UnresolvedType(path.to_string()))?;
        Ok(Some((logical_type, value)))
    }

    /// Rows to write for a staged column
    fn column_values(&self, dataset: NodeId, column: &ColumnEdit) -> Result<Vec<Value>, EditError> {
        let rows = self.dataset_rows(dataset).unwrap_or(0) as usize;
        let pad = self.tree.settings().row_count_policy == RowCountPolicy::Pad;
        let mut values = match &column.source {
            ValueSource::Literal { values } => values.clone(),
            ValueSource::Fixed { value } => vec![value.clone(); rows],
            ValueSource::Input { column } => self
                .options
                .input
                .get(column)
                .cloned()
                .ok_or_else(|| EditError::MissingInput(format!("input column {}", column)))?,
            ValueSource::Stored { .. } => Vec::new(),
        };
        if pad && values.len() < rows && !column.source.is_stored() {
            values.resize(rows, Value::Missing);
        }
        Ok(values)
    }

    /// Row count a dataset will have, `None` when nothing determines it
    fn dataset_rows(&self, dataset: NodeId) -> Option<u64> {
        match self.tree.resolved_row_count(dataset) {
            Ok(Some(rows)) => Some(rows),
            _ => self.tree.input_row_count().or_else(|| {
                self.tree
                    .get(dataset)
                    .and_then(|n| n.dataset())
                    .and_then(|d| d.stored_rows)
            }),
        }
    }

    fn warn_unknown_rows(&self, dataset: NodeId) {
        if self.dataset_rows(dataset).is_some() {
            return;
        }
        let fixed = self.tree.children(dataset).iter().any(|c| {
            self.tree
                .get(*c)
                .and_then(|n| n.column())
                .is_some_and(|column| matches!(column.source, ValueSource::Fixed { .. }))
        });
        if fixed {
            tracing::warn!(
                path = %self.tree.display_path(dataset),
                "row count of new dataset is unknown, fixed value columns stay empty"
            );
        }
    }

    fn write_column(&mut self, dataset: Handle, index: usize, values: &[Value]) -> Result<(), EditError> {
        let batch_rows = self.options.batch_rows.max(1);
        for (chunk_index, chunk) in values.chunks(batch_rows).enumerate() {
            let start = (chunk_index * batch_rows) as u64;
            let end = start + chunk.len() as u64;
            self.store
                .write_column_batch(dataset, index, start..end, chunk)?;
            self.progress.advance(chunk.len() as u64);
        }
        Ok(())
    }

    fn read_source_column(
        &self,
        source: &StorePath,
        source_file: Option<&PathBuf>,
    ) -> Result<Vec<Value>, EditError> {
        let store = match source_file {
            Some(file) => self.source_store(file)?,
            None => &*self.store,
        };
        let dataset_path = source
            .parent()
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
        let dataset = store.open(&dataset_path)?;
        let index = store
            .dataset_info(dataset)?
            .column_index(source.name())
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
        Ok(store.read_column(dataset, index)?)
    }

    fn read_source_attribute(
        &self,
        source: &StorePath,
        source_file: Option<&PathBuf>,
    ) -> Result<(LogicalType, Value), EditError> {
        let store = match source_file {
            Some(file) => self.source_store(file)?,
            None => &*self.store,
        };
        let owner_path = source
            .parent()
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
        let owner = store.open(&owner_path)?;
        Ok(store.read_attribute(owner, source.name())?)
    }

    /* Bookkeeping */

    fn source_store(&self, file: &Path) -> Result<&'a dyn HierarchicalStore, EditError> {
        self.options
            .sources
            .get(file)
            .copied()
            .ok_or_else(|| StoreError::NotFound(file.display().to_string()).into())
    }

    /// Current store path of a node bound to a store object
    fn store_path_of(&self, id: NodeId) -> Option<StorePath> {
        let handle = self.tree.get(id)?.handle()?;
        self.store.path_of(handle).ok()
    }

    fn handle_of(&self, id: NodeId) -> Result<Handle, EditError> {
        self.tree
            .node(id)?
            .handle()
            .ok_or_else(|| StoreError::NotFound(self.tree.display_path(id)).into())
    }

    /// Current parent handle and name of an existing object
    fn locate(&self, id: NodeId) -> Result<(Handle, String), EditError> {
        let node = self.tree.node(id)?;
        let current = match node.handle() {
            Some(handle) => self.store.path_of(handle)?,
            None => node
                .source_path()
                .cloned()
                .ok_or_else(|| StoreError::NotFound(self.tree.display_path(id)))?,
        };
        let parent = current
            .parent()
            .ok_or_else(|| StoreError::NotFound(current.to_string()))?;
        Ok((self.store.open(&parent)?, current.name().to_string()))
    }

    /// Anchor a committed node on its new location
    fn reanchor(&mut self, id: NodeId) -> Result<(), EditError> {
        let target = self.tree.target_path(id);
        let handle = self.tree.node(id)?.handle();
        let rows = match (self.tree.node(id)?.tag(), handle) {
            (EditKind::DataSet, Some(handle)) => Some(self.store.dataset_info(handle)?.row_count),
            (EditKind::Column, _) => {
                let dataset = self.tree.parent(id).ok_or(EditError::UnknownNode)?;
                let dataset_handle = self.handle_of(dataset)?;
                Some(self.store.dataset_info(dataset_handle)?.row_count)
            }
            _ => None,
        };

        // a new dataset only knows its rows once its columns are written
        let columns_pending = self.tree.children(id).iter().any(|c| {
            self.tree
                .get(*c)
                .is_some_and(|n| n.tag() == EditKind::Column && n.action().is_pending())
        });
        let tag = self.tree.node(id)?.tag();
        if let (EditKind::Column, Some(dataset)) = (tag, self.tree.parent(id)) {
            if let NodeKind::DataSet(edit) = &mut self.tree.node_mut(dataset)?.kind {
                edit.stored_rows = rows;
            }
        }

        let node = self.tree.node_mut(id)?;
        let previous = node.source_path.replace(target.clone());
        node.action = EditAction::NoAction;
        node.prior_action = None;
        node.policy = OverwritePolicy::None;
        node.source_file = None;
        match &mut node.kind {
            NodeKind::DataSet(dataset) if !columns_pending => dataset.stored_rows = rows,
            NodeKind::Column(column) => {
                column.source = ValueSource::Stored {
                    rows: rows.unwrap_or(0),
                }
            }
            NodeKind::Attribute(attribute) => attribute.value = AttributeValue::Stored,
            _ => {}
        }

        // descendants that mirrored the old location follow the object
        let Some(previous) = previous.filter(|p| *p != target) else {
            return Ok(());
        };
        for descendant in self.tree.descendants(id) {
            let Some(source) = self
                .tree
                .get(descendant)
                .and_then(|n| n.source_path())
                .and_then(|s| s.rebase(&previous, &target))
            else {
                continue;
            };
            let handle = match self.tree.node(descendant)?.tag() {
                EditKind::Group | EditKind::DataSet | EditKind::Unsupported => {
                    self.store.open(&source).ok()
                }
                _ => None,
            };
            let node = self.tree.node_mut(descendant)?;
            node.source_path = Some(source);
            node.handle = handle;
        }
        Ok(())
    }

    /// Work units of the whole commit: rows of written columns plus one
    /// per written attribute
    fn planned_units(&self) -> u64 {
        let mut total = 0u64;
        for id in self.tree.walk(self.tree.root()) {
            let Some(node) = self.tree.get(id) else {
                continue;
            };
            if !matches!(
                node.action(),
                EditAction::Create | EditAction::Copy | EditAction::Modify
            ) {
                continue;
            }
            match &node.kind {
                NodeKind::Column(column) => {
                    total += match (&column.source, node.action()) {
                        (ValueSource::Stored { rows }, EditAction::Copy) => *rows,
                        (ValueSource::Stored { .. }, _) => 0,
                        _ => node
                            .parent()
                            .and_then(|dataset| self.column_values(dataset, column).ok())
                            .map(|values| values.len() as u64)
                            .unwrap_or(0),
                    };
                }
                NodeKind::Attribute(_) => total += 1,
                _ => {}
            }
        }
        total
    }

    /// Recompute `NoAction` / `ModifyChildrenOnly` from what is still pending
    fn normalize_actions(&mut self) {
        let order = self.tree.walk(self.tree.root());
        for id in order.into_iter().rev() {
            let pending_child = self
                .tree
                .children(id)
                .iter()
                .any(|c| self.tree.get(*c).is_some_and(|n| n.action().is_pending()));
            if let Ok(node) = self.tree.node_mut(id) {
                if matches!(
                    node.action,
                    EditAction::NoAction | EditAction::ModifyChildrenOnly
                ) {
                    node.action = if pending_child {
                        EditAction::ModifyChildrenOnly
                    } else {
                        EditAction::NoAction
                    };
                }
            }
        }
    }
}

/// Kind of the object at `path`, ignoring attributes
fn existing_object(store: &dyn HierarchicalStore, path: &StorePath) -> Option<ObjectKind> {
    match store.kind_of(path)? {
        ObjectKind::Attribute => None,
        kind => Some(kind),
    }
}

impl EditTree {
    /// Apply the staged edits to `store`
    ///
    /// Fails without touching the store when the tree does not validate
    /// against it. Store failures are recorded in the report; a cancelled
    /// commit returns the partial report.
    pub fn commit(
        &mut self,
        store: &mut dyn HierarchicalStore,
        options: CommitOptions<'_>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<CommitReport, EditError> {
        CommitExecutor::new(self, store, options, progress, cancel.clone()).run()
    }
}
