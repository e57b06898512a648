//! Building a staged tree from the current store content

use std::path::PathBuf;

use crate::path::StorePath;
use crate::store::{Handle, HierarchicalStore};

use super::error::EditError;
use super::node::{
    AttributeEdit, AttributeValue, ColumnEdit, DataSetEdit, EditKind, EditNode, NodeId, NodeKind,
    ValueSource,
};
use super::tree::EditTree;

impl EditTree {
    /// Mirror everything in `store` as `NoAction` nodes
    ///
    /// Objects the staging layer cannot represent become `Unsupported`
    /// placeholders so that their names still take part in conflict checks.
    pub fn mirror(
        store: &dyn HierarchicalStore,
        file_path: impl Into<PathBuf>,
    ) -> Result<EditTree, EditError> {
        let mut tree = EditTree::new(file_path);
        let root = tree.root();
        tree.bind(root, Some(store.root()))?;
        mirror_group(&mut tree, store, root, store.root(), &StorePath::root())?;
        tracing::debug!(
            file = %tree.file_path().display(),
            nodes = tree.node_count(),
            "mirrored store"
        );
        Ok(tree)
    }

    /// Refresh the store handles of all nodes that refer to existing objects
    pub fn rebind(&mut self, store: &dyn HierarchicalStore) {
        for id in self.walk(self.root()) {
            let Some(node) = self.get(id) else {
                continue;
            };
            let handle = if id == self.root() {
                Some(store.root())
            } else {
                match (node.tag(), node.source_path()) {
                    (EditKind::Group | EditKind::DataSet | EditKind::Unsupported, Some(source))
                        if node.action().refers_to_existing() && node.source_file().is_none() =>
                    {
                        store.open(source).ok()
                    }
                    _ => None,
                }
            };
            if let Ok(node) = self.node_mut(id) {
                node.handle = handle;
            }
        }
    }
}

fn mirror_group(
    tree: &mut EditTree,
    store: &dyn HierarchicalStore,
    parent: NodeId,
    handle: Handle,
    path: &StorePath,
) -> Result<(), EditError> {
    let children = store.list_children(handle)?;

    mirror_attributes(tree, store, parent, handle, path, &children.attributes)?;
    for name in &children.groups {
        let child_path = path.join(name);
        let child_handle = store.open(&child_path)?;
        let id = tree.insert(
            parent,
            EditNode::mirror(child_path.clone(), Some(child_handle), NodeKind::Group),
        )?;
        mirror_group(tree, store, id, child_handle, &child_path)?;
    }
    for name in &children.datasets {
        let child_path = path.join(name);
        let child_handle = store.open(&child_path)?;
        mirror_dataset(tree, store, parent, child_handle, child_path)?;
    }
    for name in &children.unsupported {
        let child_path = path.join(name);
        let child_handle = store.open(&child_path).ok();
        tree.insert(
            parent,
            EditNode::mirror(child_path, child_handle, NodeKind::Unsupported),
        )?;
    }
    Ok(())
}

fn mirror_dataset(
    tree: &mut EditTree,
    store: &dyn HierarchicalStore,
    parent: NodeId,
    handle: Handle,
    path: StorePath,
) -> Result<(), EditError> {
    let info = store.dataset_info(handle)?;
    let kind = NodeKind::DataSet(DataSetEdit {
        stored_rows: Some(info.row_count),
    });
    let id = tree.insert(parent, EditNode::mirror(path.clone(), Some(handle), kind))?;

    for spec in info.columns {
        let column = ColumnEdit {
            logical_type: Some(spec.logical_type),
            store_type: Some(spec.store_type),
            source: ValueSource::Stored {
                rows: info.row_count,
            },
        };
        tree.insert(
            id,
            EditNode::mirror(path.join(&spec.name), None, NodeKind::Column(column)),
        )?;
    }

    let attributes = store.attribute_names(handle)?;
    mirror_attributes(tree, store, id, handle, &path, &attributes)
}

fn mirror_attributes(
    tree: &mut EditTree,
    store: &dyn HierarchicalStore,
    owner: NodeId,
    handle: Handle,
    path: &StorePath,
    names: &[String],
) -> Result<(), EditError> {
    for name in names {
        let (logical_type, _) = store.read_attribute(handle, name)?;
        let attribute = AttributeEdit {
            logical_type: Some(logical_type),
            value: AttributeValue::Stored,
        };
        tree.insert(
            owner,
            EditNode::mirror(path.join(name), None, NodeKind::Attribute(attribute)),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::EditAction;
    use crate::store::{ColumnSpec, MemoryStore};
    use crate::types::{LogicalType, Value};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let root = store.root();
        let g = store.create_group(root, "g").unwrap();
        let d = store
            .create_dataset(g, "d", &[ColumnSpec::new("x", LogicalType::Int)])
            .unwrap();
        store
            .write_column_batch(d, 0, 0..2, &[Value::Int(1), Value::Int(2)])
            .unwrap();
        store
            .write_attribute(d, "unit", LogicalType::String, &Value::Str("m".into()))
            .unwrap();
        store
    }

    #[test]
    fn test_mirror_reflects_store() {
        let store = store();
        let tree = EditTree::mirror(&store, "/tmp/a.h5").unwrap();
        let paths: Vec<_> = tree
            .walk(tree.root())
            .into_iter()
            .map(|id| tree.display_path(id))
            .collect();
        assert_eq!(paths, vec!["/", "/g", "/g/d", "/g/d/x", "/g/d@unit"]);

        let d = tree.lookup(&StorePath::new("/g/d")).unwrap();
        let node = tree.node(d).unwrap();
        assert_eq!(node.action(), EditAction::NoAction);
        assert_eq!(node.dataset().unwrap().stored_rows, Some(2));
        assert!(node.handle().is_some());
        assert!(tree.validate_against(&store).is_valid());
    }

    #[test]
    fn test_rebind_drops_stale_handles() {
        let mut store = store();
        let mut tree = EditTree::mirror(&store, "/tmp/a.h5").unwrap();
        let root = store.root();
        store.delete_object(root, "g").unwrap();
        tree.rebind(&store);
        let g = tree.lookup(&StorePath::new("/g")).unwrap();
        assert!(tree.node(g).unwrap().handle().is_none());
        assert!(tree.node(tree.root()).unwrap().handle().is_some());
    }
}
