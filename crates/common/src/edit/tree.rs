//! Arena backed staged edit tree
//!
//! Nodes live in a single `Vec` owned by the tree and refer to each other
//! only by [`NodeId`]. Parent links are plain indices, so checking whether
//! an attach would create a cycle is a walk up the parent chain.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::StorePath;
use crate::store::Handle;
use crate::types::LogicalType;

use super::action::EditAction;
use super::error::EditError;
use super::node::{
    AttributeEdit, AttributeValue, ColumnEdit, DataSetEdit, EditKind, EditNode, FileEdit,
    Namespace, NodeId, NodeKind, ValueSource,
};
use super::policy::OverwritePolicy;

/// What to do when the columns of one dataset disagree on their row count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCountPolicy {
    /// Validation fails
    #[default]
    Fail,
    /// Shorter columns are padded with missing values
    Pad,
}

/// Per-tree knobs that influence validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSettings {
    #[serde(default)]
    pub row_count_policy: RowCountPolicy,
    /// Legal suffixes of the store file name
    #[serde(default = "default_file_suffixes")]
    pub file_suffixes: Vec<String>,
}

fn default_file_suffixes() -> Vec<String> {
    vec![".h5".into(), ".hdf5".into(), ".he5".into()]
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            row_count_policy: RowCountPolicy::default(),
            file_suffixes: default_file_suffixes(),
        }
    }
}

/// Outcome of a delete toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The node is now staged for deletion
    Marked,
    /// The node got its previous action back
    Restored,
    /// The node only existed in the staged tree and was dropped
    Removed,
    Unchanged,
}

/// How [`EditTree::extract`] treats the copied nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyMode {
    /// Clone staged nodes as they are, remembering their origin
    Staged,
    /// Only the node itself and the create/copy parts of its subtree
    CreatesOnly,
    /// A store copy of an existing object: descendants become mirrors of
    /// the stored content
    StoreCopy,
}

/// Detached nodes with parent links relative to the fragment
pub(crate) type Fragment = Vec<(Option<usize>, EditNode)>;

/// A staged edit tree rooted at a file node
#[derive(Debug, Clone)]
pub struct EditTree {
    nodes: Vec<Option<EditNode>>,
    root: NodeId,
    input_row_count: Option<u64>,
    settings: TreeSettings,
}

impl EditTree {
    /// Create a tree for the store file at `file_path` with an empty root
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut root = EditNode::new(name, EditAction::NoAction, NodeKind::File(FileEdit { file_path }));
        root.source_path = Some(StorePath::root());
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            input_row_count: None,
            settings: TreeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: TreeSettings) -> Self {
        self.settings = settings;
        self
    }

    /* Getters */

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: TreeSettings) {
        self.settings = settings;
    }

    pub fn file_path(&self) -> &Path {
        match self.get(self.root).map(|n| &n.kind) {
            Some(NodeKind::File(file)) => &file.file_path,
            _ => Path::new(""),
        }
    }

    pub fn input_row_count(&self) -> Option<u64> {
        self.input_row_count
    }

    pub fn set_input_row_count(&mut self, rows: Option<u64>) {
        self.input_row_count = rows;
    }

    pub fn get(&self, id: NodeId) -> Option<&EditNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node(&self, id: NodeId) -> Result<&EditNode, EditError> {
        self.get(id).ok_or(EditError::UnknownNode)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut EditNode, EditError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(EditError::UnknownNode)
    }

    /// Number of nodes in the tree, including the root
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Pre-order walk starting at `id`, including `id`
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.get(current).is_none() || seen[current.0] {
                continue;
            }
            seen[current.0] = true;
            order.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        order
    }

    /// All descendants of `id` in pre-order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut all = self.walk(id);
        if !all.is_empty() {
            all.remove(0);
        }
        all
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<NodeId> {
        self.walk(self.root)
            .into_iter()
            .find(|id| self.get(*id).is_some_and(|n| n.id == uuid))
    }

    /// True when `ancestor` is `node` or lies on its parent chain
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                // broken parent chain, treat as cyclic
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Staged path of a node, derived from its ancestors' names
    pub fn target_path(&self, id: NodeId) -> StorePath {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == self.root {
                break;
            }
            match self.get(node_id) {
                Some(node) => {
                    names.push(node.name.as_str());
                    current = node.parent;
                }
                None => break,
            }
            if names.len() > self.nodes.len() {
                break;
            }
        }
        names.reverse();
        StorePath::new(&names.join("/"))
    }

    /// Path used in reports; attributes are shown as `owner@name`
    pub fn display_path(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(node) if node.tag() == EditKind::Attribute => {
                let owner = node
                    .parent
                    .map(|p| self.target_path(p))
                    .unwrap_or_default();
                format!("{}@{}", owner, node.name)
            }
            _ => self.target_path(id).to_string(),
        }
    }

    /// First live child of `parent` named `name` in `namespace`
    pub fn child_named(&self, parent: NodeId, name: &str, namespace: Namespace) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|c| {
            self.get(*c).is_some_and(|n| {
                n.name == name && n.tag().namespace() == namespace && n.is_live()
            })
        })
    }

    /// Resolve a staged object path (groups, datasets) to a node
    pub fn lookup(&self, path: &StorePath) -> Option<NodeId> {
        let mut current = self.root;
        for component in path.components() {
            current = self.child_named(current, component, Namespace::Objects)?;
        }
        Some(current)
    }

    /// Whether any descendant of `id` carries a staged edit
    pub fn has_pending_descendants(&self, id: NodeId) -> bool {
        self.descendants(id)
            .into_iter()
            .any(|d| self.get(d).is_some_and(|n| n.action.is_pending()))
    }

    /* Staging */

    /// Create a new group below `parent`
    pub fn new_group(&mut self, parent: NodeId, name: &str) -> Result<NodeId, EditError> {
        self.insert(parent, EditNode::new(name, EditAction::Create, NodeKind::Group))
    }

    /// Create a new dataset below `parent` with the given columns
    pub fn new_dataset<S: Into<String>>(
        &mut self,
        parent: NodeId,
        name: &str,
        columns: impl IntoIterator<Item = (S, ColumnEdit)>,
    ) -> Result<NodeId, EditError> {
        let dataset = self.insert(
            parent,
            EditNode::new(
                name,
                EditAction::Create,
                NodeKind::DataSet(DataSetEdit::default()),
            ),
        )?;
        for (column_name, column) in columns {
            self.new_column_edit(dataset, &column_name.into(), column)?;
        }
        Ok(dataset)
    }

    /// Add a column to a staged or existing dataset
    pub fn new_column(
        &mut self,
        dataset: NodeId,
        name: &str,
        logical_type: LogicalType,
        source: ValueSource,
    ) -> Result<NodeId, EditError> {
        self.new_column_edit(dataset, name, ColumnEdit::new(logical_type, source))
    }

    pub fn new_column_edit(
        &mut self,
        dataset: NodeId,
        name: &str,
        column: ColumnEdit,
    ) -> Result<NodeId, EditError> {
        self.insert(
            dataset,
            EditNode::new(name, EditAction::Create, NodeKind::Column(column)),
        )
    }

    /// Attach a new attribute to a group or dataset
    pub fn new_attribute(
        &mut self,
        parent: NodeId,
        name: &str,
        logical_type: Option<LogicalType>,
        value: AttributeValue,
    ) -> Result<NodeId, EditError> {
        let attribute = AttributeEdit {
            logical_type,
            value,
        };
        self.insert(
            parent,
            EditNode::new(name, EditAction::Create, NodeKind::Attribute(attribute)),
        )
    }

    /// Stage a copy of `source` (a node of this tree) as `name` below `parent`
    pub fn new_copy(
        &mut self,
        parent: NodeId,
        source: NodeId,
        name: &str,
    ) -> Result<NodeId, EditError> {
        if self.is_ancestor_or_self(source, parent) {
            return Err(EditError::CyclicAttachment {
                node: self.display_path(source),
                target: self.display_path(parent),
            });
        }
        let mut fragment = self.extract(source, self.copy_mode_for(source)?)?;
        forget_origin(&mut fragment);
        let copy = self.graft(parent, fragment)?;
        self.node_mut(copy)?.name = name.to_string();
        Ok(copy)
    }

    /// Stage a copy of a node of another tree, possibly of another file
    pub fn new_copy_from(
        &mut self,
        parent: NodeId,
        source_tree: &EditTree,
        source: NodeId,
        name: &str,
    ) -> Result<NodeId, EditError> {
        let mut fragment = source_tree.extract(source, source_tree.copy_mode_for(source)?)?;
        forget_origin(&mut fragment);
        if source_tree.file_path() != self.file_path() {
            if let Some((_, top)) = fragment.first_mut() {
                if top.action == EditAction::Copy {
                    top.source_file = Some(source_tree.file_path().to_path_buf());
                }
            }
        }
        let copy = self.graft(parent, fragment)?;
        self.node_mut(copy)?.name = name.to_string();
        Ok(copy)
    }

    fn copy_mode_for(&self, source: NodeId) -> Result<CopyMode, EditError> {
        let node = self.node(source)?;
        if source == self.root || node.tag() == EditKind::Unsupported {
            return Err(EditError::IllegalAction {
                path: self.display_path(source),
                action: EditAction::Copy,
            });
        }
        Ok(if node.action.refers_to_existing() && node.source_path.is_some() {
            CopyMode::StoreCopy
        } else {
            CopyMode::Staged
        })
    }

    /// Rename a node
    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), EditError> {
        if id == self.root {
            return Err(EditError::RootImmutable("renamed"));
        }
        let path = self.display_path(id);
        let node = self.node_mut(id)?;
        match node.action {
            EditAction::Delete => {
                return Err(EditError::IllegalAction {
                    path,
                    action: EditAction::Modify,
                })
            }
            EditAction::NoAction | EditAction::ModifyChildrenOnly => {
                node.action = EditAction::Modify
            }
            _ => {}
        }
        node.name = name.to_string();
        tracing::debug!(from = %path, to = %name, "renamed staged node");
        self.promote_ancestors(id);
        Ok(())
    }

    /// Choose how `id` resolves name clashes
    pub fn set_policy(&mut self, id: NodeId, policy: OverwritePolicy) -> Result<(), EditError> {
        let node = self.node_mut(id)?;
        if !policy.available_for(node.tag(), node.action) {
            return Err(EditError::IllegalPolicy {
                policy,
                kind: node.tag(),
                action: node.action,
            });
        }
        node.policy = policy;
        Ok(())
    }

    /// Override the store representation of a column
    pub fn set_column_store_type(
        &mut self,
        id: NodeId,
        store_type: Option<crate::types::StoreTypeOverride>,
    ) -> Result<(), EditError> {
        self.modify_payload(id, |kind| match kind {
            NodeKind::Column(column) => {
                column.store_type = store_type;
                true
            }
            _ => false,
        })
    }

    /// Replace where a column's rows come from
    pub fn set_column_source(&mut self, id: NodeId, source: ValueSource) -> Result<(), EditError> {
        self.modify_payload(id, |kind| match kind {
            NodeKind::Column(column) => {
                column.source = source;
                true
            }
            _ => false,
        })
    }

    /// Replace the type and value of an attribute
    pub fn set_attribute_value(
        &mut self,
        id: NodeId,
        logical_type: Option<LogicalType>,
        value: AttributeValue,
    ) -> Result<(), EditError> {
        self.modify_payload(id, |kind| match kind {
            NodeKind::Attribute(attribute) => {
                attribute.logical_type = logical_type;
                attribute.value = value;
                true
            }
            _ => false,
        })
    }

    fn modify_payload(
        &mut self,
        id: NodeId,
        apply: impl FnOnce(&mut NodeKind) -> bool,
    ) -> Result<(), EditError> {
        let path = self.display_path(id);
        let node = self.node_mut(id)?;
        if node.action.is_delete() {
            return Err(EditError::IllegalAction {
                path,
                action: EditAction::Modify,
            });
        }
        if !apply(&mut node.kind) {
            return Err(EditError::IllegalAction {
                path,
                action: EditAction::Modify,
            });
        }
        if matches!(
            node.action,
            EditAction::NoAction | EditAction::ModifyChildrenOnly
        ) {
            node.action = EditAction::Modify;
        }
        self.promote_ancestors(id);
        Ok(())
    }

    /// Stage (`true`) or unstage (`false`) the deletion of a node
    ///
    /// Undeleting restores the action the node had before it was first
    /// deleted; deleting an already deleted node changes nothing. Deleting a
    /// node that only exists in the staged tree drops it.
    pub fn mark_deleted(&mut self, id: NodeId, deleted: bool) -> Result<DeleteOutcome, EditError> {
        if id == self.root {
            return Err(EditError::RootImmutable("deleted"));
        }
        let path = self.display_path(id);
        let node = self.node(id)?;
        if node.tag() == EditKind::Unsupported {
            return Err(EditError::IllegalAction {
                path,
                action: EditAction::Delete,
            });
        }

        if !deleted {
            let node = self.node_mut(id)?;
            if !node.action.is_delete() {
                return Ok(DeleteOutcome::Unchanged);
            }
            node.action = node.prior_action.take().unwrap_or_default();
            tracing::debug!(%path, action = %node.action, "restored deleted node");
            return Ok(DeleteOutcome::Restored);
        }

        let action = node.action;
        match action {
            EditAction::Delete => Ok(DeleteOutcome::Unchanged),
            EditAction::Create | EditAction::Copy => {
                self.remove(id)?;
                Ok(DeleteOutcome::Removed)
            }
            _ if self.has_pending_descendants(id) => Err(EditError::PendingDescendants(path)),
            action => {
                let node = self.node_mut(id)?;
                node.prior_action = Some(action);
                node.action = EditAction::Delete;
                tracing::debug!(%path, "staged deletion");
                self.promote_ancestors(id);
                Ok(DeleteOutcome::Marked)
            }
        }
    }

    /// Flip the deletion state of a node
    pub fn toggle_deleted(&mut self, id: NodeId) -> Result<DeleteOutcome, EditError> {
        let deleted = self.node(id)?.action.is_delete();
        self.mark_deleted(id, !deleted)
    }

    /// Reattach a group or dataset below another container
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), EditError> {
        if id == self.root {
            return Err(EditError::RootImmutable("moved"));
        }
        let node = self.node(id)?;
        let kind = node.tag();
        let path = self.display_path(id);
        if !matches!(kind, EditKind::Group | EditKind::DataSet) || node.action.is_delete() {
            return Err(EditError::IllegalAction {
                path,
                action: EditAction::Modify,
            });
        }
        let parent_node = self.node(new_parent)?;
        if !parent_node.tag().accepts(kind) {
            return Err(EditError::KindMismatch {
                parent: parent_node.tag(),
                child: kind,
            });
        }
        if parent_node.action.is_delete() {
            return Err(EditError::IllegalAction {
                path: self.display_path(new_parent),
                action: EditAction::Delete,
            });
        }
        if self.is_ancestor_or_self(id, new_parent) {
            return Err(EditError::CyclicAttachment {
                node: path,
                target: self.display_path(new_parent),
            });
        }

        if let Some(old_parent) = self.parent(id) {
            self.node_mut(old_parent)?.children.retain(|c| *c != id);
        }
        self.node_mut(new_parent)?.children.push(id);
        let node = self.node_mut(id)?;
        node.parent = Some(new_parent);
        if matches!(
            node.action,
            EditAction::NoAction | EditAction::ModifyChildrenOnly
        ) {
            node.action = EditAction::Modify;
        }
        tracing::debug!(from = %path, to = %self.display_path(id), "moved staged node");
        self.promote_ancestors(id);
        Ok(())
    }

    /// Drop a node that only exists in the staged tree, with its subtree
    pub fn remove(&mut self, id: NodeId) -> Result<(), EditError> {
        if id == self.root {
            return Err(EditError::RootImmutable("removed"));
        }
        for node_id in self.walk(id) {
            let node = self.node(node_id)?;
            if node.handle.is_some()
                || (node.action.refers_to_existing() && node.source_path.is_some())
            {
                return Err(EditError::NodeBound(self.display_path(node_id)));
            }
        }
        self.detach(id)
    }

    /// Remove `id` and its subtree from the arena without any checks
    pub(crate) fn detach(&mut self, id: NodeId) -> Result<(), EditError> {
        let subtree = self.walk(id);
        if let Some(parent) = self.parent(id) {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        for node_id in subtree {
            self.nodes[node_id.0] = None;
        }
        Ok(())
    }

    /// Resolved row count of a dataset
    ///
    /// `Ok(None)` when no column determines the count. `Err((expected,
    /// found))` when columns disagree and the policy does not allow padding.
    pub fn resolved_row_count(&self, dataset: NodeId) -> Result<Option<u64>, (u64, u64)> {
        let stored = self
            .get(dataset)
            .and_then(|n| n.dataset())
            .and_then(|d| d.stored_rows);
        let mut counts: Vec<u64> = self
            .children(dataset)
            .iter()
            .filter_map(|c| self.get(*c))
            .filter(|n| n.is_live())
            .filter_map(|n| n.column())
            .filter_map(|c| c.source.row_count(self.input_row_count))
            .collect();
        if counts.is_empty() {
            return Ok(stored);
        }
        match self.settings.row_count_policy {
            RowCountPolicy::Fail => {
                let expected = stored.unwrap_or(counts[0]);
                match counts.iter().find(|c| **c != expected) {
                    Some(found) => Err((expected, *found)),
                    None => Ok(Some(expected)),
                }
            }
            RowCountPolicy::Pad => {
                counts.extend(stored);
                Ok(counts.into_iter().max())
            }
        }
    }

    /* Internals shared with mirror, integration and commit */

    /// Attach a fresh node below `parent`
    pub(crate) fn insert(&mut self, parent: NodeId, node: EditNode) -> Result<NodeId, EditError> {
        self.check_attach(parent, node.tag())?;
        let pending = node.action.is_pending();
        let id = NodeId(self.nodes.len());
        let mut node = node;
        node.parent = Some(parent);
        self.nodes.push(Some(node));
        self.node_mut(parent)?.children.push(id);
        if pending {
            self.promote_ancestors(id);
        }
        Ok(id)
    }

    fn check_attach(&self, parent: NodeId, child: EditKind) -> Result<(), EditError> {
        let parent_node = self.node(parent)?;
        if !parent_node.tag().accepts(child) {
            return Err(EditError::KindMismatch {
                parent: parent_node.tag(),
                child,
            });
        }
        if parent_node.action.is_delete() {
            return Err(EditError::IllegalAction {
                path: self.display_path(parent),
                action: EditAction::Delete,
            });
        }
        Ok(())
    }

    /// Detached clone of the subtree at `id`
    pub(crate) fn extract(&self, id: NodeId, mode: CopyMode) -> Result<Fragment, EditError> {
        let mut fragment: Fragment = Vec::new();
        // (node, fragment index of its parent, inside new content)
        let mut stack: Vec<(NodeId, Option<usize>, bool)> = vec![(id, None, false)];
        while let Some((node_id, parent_index, inside_new)) = stack.pop() {
            let original = self.node(node_id)?;
            let is_top = parent_index.is_none();
            let keep = is_top
                || match mode {
                    CopyMode::Staged => true,
                    CopyMode::CreatesOnly => {
                        inside_new
                            || original.action.is_create_or_copy()
                            || self.has_creates_below(node_id)
                    }
                    CopyMode::StoreCopy => {
                        original.action.refers_to_existing() && original.source_path.is_some()
                    }
                };
            if !keep {
                continue;
            }

            let mut copy = original.clone();
            copy.id = Uuid::new_v4();
            copy.parent = None;
            copy.children = Vec::new();
            copy.handle = None;
            match mode {
                CopyMode::Staged | CopyMode::CreatesOnly => {
                    copy.integrated_from = Some(original.id);
                }
                CopyMode::StoreCopy => {
                    copy.integrated_from = None;
                    copy.prior_action = None;
                    copy.policy = OverwritePolicy::None;
                    copy.source_file = None;
                    if let Some(stored) = original.stored_name() {
                        copy.name = stored.to_string();
                    }
                    copy.action = if is_top {
                        EditAction::Copy
                    } else {
                        EditAction::NoAction
                    };
                    reset_to_stored(&mut copy.kind);
                }
            }
            let index = fragment.len();
            fragment.push((parent_index, copy));

            let inside_new = inside_new || original.action.is_create_or_copy();
            for child in original.children.iter().rev() {
                stack.push((*child, Some(index), inside_new));
            }
        }
        Ok(fragment)
    }

    fn has_creates_below(&self, id: NodeId) -> bool {
        self.descendants(id)
            .into_iter()
            .any(|d| self.get(d).is_some_and(|n| n.action.is_create_or_copy()))
    }

    /// Attach a detached fragment below `parent`, returning its top node
    pub(crate) fn graft(&mut self, parent: NodeId, fragment: Fragment) -> Result<NodeId, EditError> {
        let mut ids: Vec<NodeId> = Vec::with_capacity(fragment.len());
        let mut top = None;
        for (parent_index, node) in fragment {
            let attach_to = match parent_index {
                None => parent,
                Some(index) => ids[index],
            };
            let id = if parent_index.is_none() {
                let id = self.insert(attach_to, node)?;
                top = Some(id);
                id
            } else {
                let id = NodeId(self.nodes.len());
                let mut node = node;
                node.parent = Some(attach_to);
                self.nodes.push(Some(node));
                self.node_mut(attach_to)?.children.push(id);
                id
            };
            ids.push(id);
        }
        top.ok_or(EditError::UnknownNode)
    }

    /// Mark every `NoAction` ancestor of `id` as having staged children
    pub(crate) fn promote_ancestors(&mut self, id: NodeId) {
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            if let Some(node) = self.nodes[ancestor.0].as_mut() {
                if node.action == EditAction::NoAction {
                    node.action = EditAction::ModifyChildrenOnly;
                }
                current = node.parent;
            } else {
                break;
            }
        }
    }

    pub(crate) fn bind(&mut self, id: NodeId, handle: Option<Handle>) -> Result<(), EditError> {
        self.node_mut(id)?.handle = handle;
        Ok(())
    }

    pub(crate) fn push_node(&mut self, node: EditNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    pub(crate) fn replace_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }
}

fn forget_origin(fragment: &mut Fragment) {
    for (_, node) in fragment.iter_mut() {
        node.integrated_from = None;
    }
}

/// Turn a staged payload into the payload of a mirror of stored content
fn reset_to_stored(kind: &mut NodeKind) {
    match kind {
        NodeKind::Column(column) => {
            if !column.source.is_stored() {
                column.source = ValueSource::Stored { rows: 0 };
            }
        }
        NodeKind::Attribute(attribute) => attribute.value = AttributeValue::Stored,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn tree() -> EditTree {
        EditTree::new("/tmp/data.h5")
    }

    #[test]
    fn test_target_paths() {
        let mut tree = tree();
        let root = tree.root();
        let g = tree.new_group(root, "g").unwrap();
        let d = tree
            .new_dataset(
                g,
                "d",
                [(
                    "x",
                    ColumnEdit::new(LogicalType::Int, ValueSource::literal([Value::Int(1)])),
                )],
            )
            .unwrap();
        let a = tree
            .new_attribute(d, "units", Some(LogicalType::String), AttributeValue::Literal {
                value: Value::Str("m".into()),
            })
            .unwrap();
        assert_eq!(tree.target_path(root), StorePath::root());
        assert_eq!(tree.target_path(d).as_str(), "/g/d");
        assert_eq!(tree.display_path(a), "/g/d@units");
        assert_eq!(tree.lookup(&StorePath::new("/g/d")), Some(d));

        tree.set_name(g, "h").unwrap();
        assert_eq!(tree.target_path(d).as_str(), "/h/d");
    }

    #[test]
    fn test_kind_rules_on_insert() {
        let mut tree = tree();
        let root = tree.root();
        let g = tree.new_group(root, "g").unwrap();
        assert!(matches!(
            tree.new_column(g, "x", LogicalType::Int, ValueSource::Stored { rows: 0 }),
            Err(EditError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_move_into_descendant_rejected_without_mutation() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.new_group(root, "a").unwrap();
        let b = tree.new_group(a, "b").unwrap();
        let c = tree.new_group(b, "c").unwrap();
        let before: Vec<_> = tree.walk(root);

        assert!(matches!(
            tree.move_node(a, c),
            Err(EditError::CyclicAttachment { .. })
        ));
        assert!(matches!(
            tree.move_node(a, a),
            Err(EditError::CyclicAttachment { .. })
        ));
        assert_eq!(tree.walk(root), before);
        assert_eq!(tree.parent(a), Some(root));
    }

    #[test]
    fn test_copy_into_own_subtree_rejected() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.new_group(root, "a").unwrap();
        let b = tree.new_group(a, "b").unwrap();
        let count = tree.node_count();
        assert!(matches!(
            tree.new_copy(b, a, "again"),
            Err(EditError::CyclicAttachment { .. })
        ));
        assert_eq!(tree.node_count(), count);
    }

    #[test]
    fn test_delete_of_staged_node_removes_it() {
        let mut tree = tree();
        let root = tree.root();
        let g = tree.new_group(root, "g").unwrap();
        assert_eq!(tree.mark_deleted(g, true).unwrap(), DeleteOutcome::Removed);
        assert!(tree.get(g).is_none());
        assert!(tree.children(root).is_empty());
    }

    #[test]
    fn test_set_policy_legality() {
        let mut tree = tree();
        let root = tree.root();
        let g = tree.new_group(root, "g").unwrap();
        let a = tree
            .new_attribute(g, "a", Some(LogicalType::Int), AttributeValue::Literal {
                value: Value::Int(1),
            })
            .unwrap();
        assert!(tree.set_policy(g, OverwritePolicy::Integrate).is_ok());
        assert!(matches!(
            tree.set_policy(a, OverwritePolicy::Integrate),
            Err(EditError::IllegalPolicy { .. })
        ));
    }

    #[test]
    fn test_row_count_policies() {
        let mut tree = tree();
        let root = tree.root();
        let d = tree
            .new_dataset(
                root,
                "d",
                [
                    ("a", ColumnEdit::new(LogicalType::Int, ValueSource::literal([Value::Int(1), Value::Int(2)]))),
                    ("b", ColumnEdit::new(LogicalType::Int, ValueSource::literal([Value::Int(1)]))),
                    ("c", ColumnEdit::new(LogicalType::Int, ValueSource::Fixed { value: Value::Int(0) })),
                ],
            )
            .unwrap();
        assert_eq!(tree.resolved_row_count(d), Err((2, 1)));

        tree.set_settings(TreeSettings {
            row_count_policy: RowCountPolicy::Pad,
            ..TreeSettings::default()
        });
        assert_eq!(tree.resolved_row_count(d), Ok(Some(2)));
    }

    #[test]
    fn test_remove_staged_subtree() {
        let mut tree = tree();
        let root = tree.root();
        let g = tree.new_group(root, "g").unwrap();
        let inner = tree.new_group(g, "inner").unwrap();
        tree.remove(g).unwrap();
        assert!(tree.get(inner).is_none());
        assert_eq!(tree.node_count(), 1);
        assert!(matches!(tree.remove(root), Err(EditError::RootImmutable(_))));
    }
}
