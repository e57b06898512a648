//! Staged edit nodes
//!
//! Every node of the staged tree is an [`EditNode`]; what kind of store
//! object it stands for, and the kind specific properties, live in the
//! [`NodeKind`] payload.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::StorePath;
use crate::store::{ColumnSpec, Handle};
use crate::types::{LogicalType, StoreTypeOverride, Value};

use super::action::EditAction;
use super::policy::OverwritePolicy;

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    File,
    Group,
    DataSet,
    Column,
    Attribute,
    Unsupported,
}

/// Sibling name scopes
///
/// Groups, datasets and foreign objects share one namespace inside a group.
/// Columns and attributes each have their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Objects,
    Columns,
    Attributes,
}

impl EditKind {
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::File | Self::Group | Self::DataSet | Self::Unsupported => Namespace::Objects,
            Self::Column => Namespace::Columns,
            Self::Attribute => Namespace::Attributes,
        }
    }

    /// Groups, files, and datasets
    pub fn is_container(&self) -> bool {
        matches!(self, Self::File | Self::Group | Self::DataSet)
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_container()
    }

    /// Commit ordering among siblings, lower first
    pub fn priority(&self) -> u8 {
        match self {
            Self::File | Self::Group => 0,
            Self::DataSet => 1,
            Self::Column | Self::Attribute => 2,
            Self::Unsupported => 3,
        }
    }

    /// Whether a node of this kind may hold a child of `child` kind
    pub fn accepts(&self, child: EditKind) -> bool {
        match self {
            Self::File | Self::Group => matches!(
                child,
                Self::Group | Self::DataSet | Self::Attribute | Self::Unsupported
            ),
            Self::DataSet => matches!(child, Self::Column | Self::Attribute),
            Self::Column | Self::Attribute | Self::Unsupported => false,
        }
    }
}

/// Where the rows of a column come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueSource {
    /// Explicit values, one per row
    Literal { values: Vec<Value> },
    /// One value repeated for every row of the dataset
    Fixed { value: Value },
    /// A named column of the caller supplied input table
    Input { column: String },
    /// Data already present in the store
    Stored { rows: u64 },
}

impl ValueSource {
    pub fn literal(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Literal {
            values: values.into_iter().collect(),
        }
    }

    /// Rows this source yields on its own, `None` when it adapts to the
    /// dataset (fixed values) or depends on an unknown input size
    pub fn row_count(&self, input_rows: Option<u64>) -> Option<u64> {
        match self {
            Self::Literal { values } => Some(values.len() as u64),
            Self::Fixed { .. } => None,
            Self::Input { .. } => input_rows,
            Self::Stored { rows } => Some(*rows),
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEdit {
    pub logical_type: Option<LogicalType>,
    pub store_type: Option<StoreTypeOverride>,
    pub source: ValueSource,
}

impl ColumnEdit {
    pub fn new(logical_type: LogicalType, source: ValueSource) -> Self {
        Self {
            logical_type: Some(logical_type),
            store_type: None,
            source,
        }
    }

    pub fn with_store_type(mut self, store_type: StoreTypeOverride) -> Self {
        self.store_type = Some(store_type);
        self
    }

    /// Column shape handed to the store, once the type is resolved
    pub fn spec(&self, name: &str) -> Option<ColumnSpec> {
        let logical = self.logical_type?;
        let spec = ColumnSpec::new(name, logical);
        Some(match self.store_type {
            Some(store_type) => spec.with_store_type(store_type),
            None => spec,
        })
    }
}

/// Value of a staged attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeValue {
    Literal { value: Value },
    /// Resolved from the commit's variable map
    Variable { name: String },
    /// Value already present in the store
    Stored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEdit {
    pub logical_type: Option<LogicalType>,
    pub value: AttributeValue,
}

impl AttributeEdit {
    pub fn literal(value: Value) -> Self {
        Self {
            logical_type: value.logical_type(),
            value: AttributeValue::Literal { value },
        }
    }

    pub fn variable(name: impl Into<String>, logical_type: Option<LogicalType>) -> Self {
        Self {
            logical_type,
            value: AttributeValue::Variable { name: name.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSetEdit {
    /// Row count of the stored dataset, for mirrored or copied datasets
    pub stored_rows: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEdit {
    pub file_path: PathBuf,
}

/// Kind specific payload of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    File(FileEdit),
    Group,
    DataSet(DataSetEdit),
    Column(ColumnEdit),
    Attribute(AttributeEdit),
    Unsupported,
}

impl NodeKind {
    pub fn tag(&self) -> EditKind {
        match self {
            Self::File(_) => EditKind::File,
            Self::Group => EditKind::Group,
            Self::DataSet(_) => EditKind::DataSet,
            Self::Column(_) => EditKind::Column,
            Self::Attribute(_) => EditKind::Attribute,
            Self::Unsupported => EditKind::Unsupported,
        }
    }
}

/// One node of a staged edit tree
#[derive(Debug, Clone)]
pub struct EditNode {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) source_path: Option<StorePath>,
    /// Store file the source lives in, when it is not the tree's own file
    pub(crate) source_file: Option<PathBuf>,
    pub(crate) action: EditAction,
    pub(crate) prior_action: Option<EditAction>,
    pub(crate) policy: OverwritePolicy,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) handle: Option<Handle>,
    pub(crate) integrated_from: Option<Uuid>,
    pub(crate) kind: NodeKind,
}

impl EditNode {
    pub(crate) fn new(name: impl Into<String>, action: EditAction, kind: NodeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_path: None,
            source_file: None,
            action,
            prior_action: None,
            policy: OverwritePolicy::None,
            parent: None,
            children: Vec::new(),
            handle: None,
            integrated_from: None,
            kind,
        }
    }

    /// A node mirroring an object that already exists at `source_path`
    pub(crate) fn mirror(source_path: StorePath, handle: Option<Handle>, kind: NodeKind) -> Self {
        let mut node = Self::new(source_path.name(), EditAction::NoAction, kind);
        node.source_path = Some(source_path);
        node.handle = handle;
        node
    }

    /* Getters */

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> Option<&StorePath> {
        self.source_path.as_ref()
    }

    pub fn source_file(&self) -> Option<&PathBuf> {
        self.source_file.as_ref()
    }

    pub fn action(&self) -> EditAction {
        self.action
    }

    pub fn prior_action(&self) -> Option<EditAction> {
        self.prior_action
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn integrated_from(&self) -> Option<Uuid> {
        self.integrated_from
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn tag(&self) -> EditKind {
        self.kind.tag()
    }

    pub fn column(&self) -> Option<&ColumnEdit> {
        match &self.kind {
            NodeKind::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn attribute(&self) -> Option<&AttributeEdit> {
        match &self.kind {
            NodeKind::Attribute(attribute) => Some(attribute),
            _ => None,
        }
    }

    pub fn dataset(&self) -> Option<&DataSetEdit> {
        match &self.kind {
            NodeKind::DataSet(dataset) => Some(dataset),
            _ => None,
        }
    }

    /// True when the node is live after commit (not staged for deletion)
    pub fn is_live(&self) -> bool {
        !self.action.is_delete()
    }

    /// Name the node has in the store right now, if it exists there
    pub(crate) fn stored_name(&self) -> Option<&str> {
        self.source_path.as_ref().map(|p| p.name())
    }

    /// Whether staged properties differ from what the store holds
    pub(crate) fn is_renamed(&self) -> bool {
        self.stored_name().is_some_and(|stored| stored != self.name)
    }
}
