//! Serialized form of a staged tree
//!
//! Children are keyed by node id so documents diff well; each child
//! carries its sibling position to restore the order. Store handles are
//! session bound and never written; call [`EditTree::rebind`] after
//! loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::StorePath;

use super::action::EditAction;
use super::error::EditError;
use super::node::{AttributeEdit, ColumnEdit, DataSetEdit, EditNode, FileEdit, NodeId, NodeKind};
use super::policy::OverwritePolicy;
use super::tree::{EditTree, TreeSettings};

/// Current document layout
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub version: u32,
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_row_count: Option<u64>,
    #[serde(default)]
    pub settings: TreeSettings,
    pub root: NodeDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDocument {
    File,
    Group,
    DataSet(DataSetEdit),
    Column(ColumnEdit),
    Attribute(AttributeEdit),
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: Uuid,
    pub name: String,
    pub kind: KindDocument,
    pub action: EditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_action: Option<EditAction>,
    #[serde(default)]
    pub policy: OverwritePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<StorePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrated_from: Option<Uuid>,
    #[serde(default)]
    pub position: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<Uuid, NodeDocument>,
}

impl TreeDocument {
    pub fn to_json(&self) -> Result<String, EditError> {
        serde_json::to_string_pretty(self).map_err(|e| EditError::Document(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, EditError> {
        serde_json::from_str(json).map_err(|e| EditError::Document(e.to_string()))
    }
}

impl EditTree {
    /// Serializable image of this tree
    pub fn to_document(&self) -> Result<TreeDocument, EditError> {
        Ok(TreeDocument {
            version: DOCUMENT_VERSION,
            file_path: self.file_path().to_path_buf(),
            input_row_count: self.input_row_count(),
            settings: self.settings().clone(),
            root: self.node_document(self.root(), 0)?,
        })
    }

    fn node_document(&self, id: NodeId, position: usize) -> Result<NodeDocument, EditError> {
        let node = self.node(id)?;
        let mut children = BTreeMap::new();
        for (index, child) in node.children().iter().enumerate() {
            let document = self.node_document(*child, index)?;
            children.insert(document.id, document);
        }
        let kind = match node.kind() {
            NodeKind::File(_) => KindDocument::File,
            NodeKind::Group => KindDocument::Group,
            NodeKind::DataSet(dataset) => KindDocument::DataSet(dataset.clone()),
            NodeKind::Column(column) => KindDocument::Column(column.clone()),
            NodeKind::Attribute(attribute) => KindDocument::Attribute(attribute.clone()),
            NodeKind::Unsupported => KindDocument::Unsupported,
        };
        Ok(NodeDocument {
            id: node.id(),
            name: node.name().to_string(),
            kind,
            action: node.action(),
            prior_action: node.prior_action(),
            policy: node.policy(),
            source_path: node.source_path().cloned(),
            source_file: node.source_file().cloned(),
            integrated_from: node.integrated_from(),
            position,
            children,
        })
    }

    /// Rebuild a tree from its document
    ///
    /// The result is unbound; structure is checked only as far as needed to
    /// build it, run [`EditTree::validate`] for the rest.
    pub fn from_document(document: &TreeDocument) -> Result<EditTree, EditError> {
        if document.version != DOCUMENT_VERSION {
            return Err(EditError::Document(format!(
                "unsupported document version {}",
                document.version
            )));
        }
        if document.root.kind != KindDocument::File {
            return Err(EditError::Document("root node is not a file".into()));
        }

        let mut tree = EditTree::new(document.file_path.clone()).with_settings(document.settings.clone());
        tree.set_input_row_count(document.input_row_count);
        tree.clear();
        let root = push_document(&mut tree, &document.root, None, &document.file_path)?;
        tree.replace_root(root);
        Ok(tree)
    }
}

fn push_document(
    tree: &mut EditTree,
    document: &NodeDocument,
    parent: Option<NodeId>,
    file_path: &Path,
) -> Result<NodeId, EditError> {
    let kind = match &document.kind {
        KindDocument::File => {
            if parent.is_some() {
                return Err(EditError::Document(format!(
                    "file node {} below the root",
                    document.id
                )));
            }
            NodeKind::File(FileEdit {
                file_path: file_path.to_path_buf(),
            })
        }
        KindDocument::Group => NodeKind::Group,
        KindDocument::DataSet(dataset) => NodeKind::DataSet(dataset.clone()),
        KindDocument::Column(column) => NodeKind::Column(column.clone()),
        KindDocument::Attribute(attribute) => NodeKind::Attribute(attribute.clone()),
        KindDocument::Unsupported => NodeKind::Unsupported,
    };

    let mut node = EditNode::new(document.name.clone(), document.action, kind);
    node.id = document.id;
    node.prior_action = document.prior_action;
    node.policy = document.policy;
    node.source_path = document.source_path.clone();
    node.source_file = document.source_file.clone();
    node.integrated_from = document.integrated_from;
    node.parent = parent;

    if let Some(parent) = parent {
        let parent_kind = tree.node(parent)?.tag();
        if !parent_kind.accepts(node.tag()) {
            return Err(EditError::KindMismatch {
                parent: parent_kind,
                child: node.tag(),
            });
        }
    }

    let id = tree.push_node(node);
    let mut children: Vec<&NodeDocument> = document.children.values().collect();
    children.sort_by_key(|c| c.position);
    for child in children {
        let child_id = push_document(tree, child, Some(id), file_path)?;
        tree.node_mut(id)?.children.push(child_id);
    }
    Ok(id)
}
