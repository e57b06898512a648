//! In-memory store implementation
//!
//! Keeps the whole object hierarchy in an id keyed map. Useful for tests,
//! dry runs, and as the snapshot backed store behind the CLI. Failures can
//! be injected per operation and path to exercise partial commit handling.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::path::StorePath;
use crate::types::{coerce, LogicalType, Value};

use super::{
    Children, ColumnSpec, DataSetInfo, Handle, HierarchicalStore, ObjectKind, StoreError,
};

const ROOT_ID: u64 = 0;

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOp {
    CreateGroup,
    CreateDataSet,
    Delete,
    Move,
    Copy,
    AddColumn,
    AlterColumn,
    WriteColumn,
    WriteAttribute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredColumn {
    spec: ColumnSpec,
    values: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAttribute {
    logical_type: LogicalType,
    value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ObjectBody {
    Group { children: Vec<u64> },
    DataSet { columns: Vec<StoredColumn>, row_count: u64 },
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredObject {
    name: String,
    parent: Option<u64>,
    body: ObjectBody,
    #[serde(default)]
    attributes: BTreeMap<String, StoredAttribute>,
}

impl StoredObject {
    fn kind(&self) -> ObjectKind {
        match self.body {
            ObjectBody::Group { .. } => ObjectKind::Group,
            ObjectBody::DataSet { .. } => ObjectKind::DataSet,
            ObjectBody::Unsupported => ObjectKind::Unsupported,
        }
    }
}

/// Hierarchical store held entirely in memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    objects: BTreeMap<u64, StoredObject>,
    next_id: u64,
    #[serde(skip)]
    failures: Vec<(FailOp, StorePath)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with only the root group
    pub fn new() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(
            ROOT_ID,
            StoredObject {
                name: String::new(),
                parent: None,
                body: ObjectBody::Group {
                    children: Vec::new(),
                },
                attributes: BTreeMap::new(),
            },
        );
        Self {
            objects,
            next_id: ROOT_ID + 1,
            failures: Vec::new(),
        }
    }

    /// Load a JSON snapshot written by [`MemoryStore::save`]
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read(path)?;
        let store: Self = serde_json::from_slice(&data)?;
        tracing::debug!(path = %path.display(), objects = store.objects.len(), "loaded store snapshot");
        Ok(store)
    }

    /// Persist the store as a JSON snapshot
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        tracing::debug!(path = %path.display(), objects = self.objects.len(), "saved store snapshot");
        Ok(())
    }

    /// Make the next `op` targeting `path` fail (and every later one)
    pub fn fail_on(&mut self, op: FailOp, path: impl Into<StorePath>) {
        self.failures.push((op, path.into()));
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Plant an object the staging layer cannot represent
    pub fn add_unsupported(&mut self, parent: Handle, name: &str) -> Result<Handle, StoreError> {
        self.insert_child(parent, name, ObjectBody::Unsupported)
    }

    /// All column values of the dataset at `path`, in column order
    pub fn dataset_values(&self, path: &StorePath) -> Result<Vec<(String, Vec<Value>)>, StoreError> {
        let handle = self.open(path)?;
        match &self.object(handle)?.body {
            ObjectBody::DataSet { columns, .. } => Ok(columns
                .iter()
                .map(|c| (c.spec.name.clone(), c.values.clone()))
                .collect()),
            other => Err(self.kind_error(handle, ObjectKind::DataSet, other)),
        }
    }

    /// Number of objects, including the root
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn check_failure(&self, op: FailOp, path: &StorePath) -> Result<(), StoreError> {
        if self.failures.iter().any(|(o, p)| *o == op && p == path) {
            tracing::debug!(?op, %path, "injecting store failure");
            return Err(StoreError::Injected(format!("{:?} {}", op, path)));
        }
        Ok(())
    }

    fn object(&self, handle: Handle) -> Result<&StoredObject, StoreError> {
        self.objects
            .get(&handle.0)
            .ok_or(StoreError::InvalidHandle(handle))
    }

    fn object_mut(&mut self, handle: Handle) -> Result<&mut StoredObject, StoreError> {
        self.objects
            .get_mut(&handle.0)
            .ok_or(StoreError::InvalidHandle(handle))
    }

    fn kind_error(&self, handle: Handle, expected: ObjectKind, found: &ObjectBody) -> StoreError {
        let found = match found {
            ObjectBody::Group { .. } => ObjectKind::Group,
            ObjectBody::DataSet { .. } => ObjectKind::DataSet,
            ObjectBody::Unsupported => ObjectKind::Unsupported,
        };
        StoreError::KindMismatch {
            path: self.path_string(handle),
            expected,
            found,
        }
    }

    fn path_string(&self, handle: Handle) -> String {
        self.path_of(handle)
            .map(|p| p.to_string())
            .unwrap_or_else(|_| format!("{:?}", handle))
    }

    fn children_of(&self, handle: Handle) -> Result<&Vec<u64>, StoreError> {
        match &self.object(handle)?.body {
            ObjectBody::Group { children } => Ok(children),
            other => Err(self.kind_error(handle, ObjectKind::Group, other)),
        }
    }

    fn child_named(&self, parent: Handle, name: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .children_of(parent)?
            .iter()
            .copied()
            .find(|id| self.objects.get(id).map(|o| o.name.as_str()) == Some(name)))
    }

    fn insert_child(
        &mut self,
        parent: Handle,
        name: &str,
        body: ObjectBody,
    ) -> Result<Handle, StoreError> {
        if self.child_named(parent, name)?.is_some() {
            let path = self.path_of(parent)?.join(name);
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(
            id,
            StoredObject {
                name: name.to_string(),
                parent: Some(parent.0),
                body,
                attributes: BTreeMap::new(),
            },
        );
        if let ObjectBody::Group { children } = &mut self.object_mut(parent)?.body {
            children.push(id);
        }
        Ok(Handle(id))
    }

    fn detach(&mut self, parent: Handle, id: u64) -> Result<(), StoreError> {
        if let ObjectBody::Group { children } = &mut self.object_mut(parent)?.body {
            children.retain(|c| *c != id);
        }
        Ok(())
    }

    fn remove_subtree(&mut self, id: u64) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(object) = self.objects.remove(&current) {
                if let ObjectBody::Group { children } = object.body {
                    stack.extend(children);
                }
            }
        }
    }

    fn clone_subtree(&mut self, source: u64, new_parent: u64, new_name: &str) -> Result<u64, StoreError> {
        let original = self
            .objects
            .get(&source)
            .cloned()
            .ok_or(StoreError::InvalidHandle(Handle(source)))?;
        let id = self.next_id;
        self.next_id += 1;

        let (body, old_children) = match original.body {
            ObjectBody::Group { children } => (
                ObjectBody::Group {
                    children: Vec::new(),
                },
                children,
            ),
            other => (other, Vec::new()),
        };
        self.objects.insert(
            id,
            StoredObject {
                name: new_name.to_string(),
                parent: Some(new_parent),
                body,
                attributes: original.attributes,
            },
        );
        let mut new_children = Vec::with_capacity(old_children.len());
        for child in old_children {
            let name = self
                .objects
                .get(&child)
                .map(|o| o.name.clone())
                .unwrap_or_default();
            new_children.push(self.clone_subtree(child, id, &name)?);
        }
        if let Some(StoredObject {
            body: ObjectBody::Group { children },
            ..
        }) = self.objects.get_mut(&id)
        {
            *children = new_children;
        }
        Ok(id)
    }

    fn dataset_mut(
        &mut self,
        dataset: Handle,
    ) -> Result<(&mut Vec<StoredColumn>, &mut u64), StoreError> {
        let path = self.path_string(dataset);
        match &mut self.object_mut(dataset)?.body {
            ObjectBody::DataSet { columns, row_count } => Ok((columns, row_count)),
            ObjectBody::Group { .. } => Err(StoreError::KindMismatch {
                path,
                expected: ObjectKind::DataSet,
                found: ObjectKind::Group,
            }),
            ObjectBody::Unsupported => Err(StoreError::KindMismatch {
                path,
                expected: ObjectKind::DataSet,
                found: ObjectKind::Unsupported,
            }),
        }
    }
}

impl HierarchicalStore for MemoryStore {
    fn root(&self) -> Handle {
        Handle(ROOT_ID)
    }

    fn open(&self, path: &StorePath) -> Result<Handle, StoreError> {
        let mut current = Handle(ROOT_ID);
        for component in path.components() {
            current = match self.object(current)?.body {
                ObjectBody::Group { .. } => self
                    .child_named(current, component)?
                    .map(Handle)
                    .ok_or_else(|| StoreError::NotFound(path.to_string()))?,
                _ => return Err(StoreError::NotFound(path.to_string())),
            };
        }
        Ok(current)
    }

    fn path_of(&self, handle: Handle) -> Result<StorePath, StoreError> {
        let mut names = Vec::new();
        let mut current = self.object(handle)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.object(Handle(parent))?;
        }
        names.reverse();
        Ok(StorePath::new(&names.join("/")))
    }

    fn kind_of(&self, path: &StorePath) -> Option<ObjectKind> {
        if let Ok(handle) = self.open(path) {
            return self.object(handle).ok().map(StoredObject::kind);
        }
        // attributes are addressed as `<owner>/<name>`
        let owner = self.open(&path.parent()?).ok()?;
        self.object(owner)
            .ok()?
            .attributes
            .contains_key(path.name())
            .then_some(ObjectKind::Attribute)
    }

    fn create_group(&mut self, parent: Handle, name: &str) -> Result<Handle, StoreError> {
        let target = self.path_of(parent)?.join(name);
        self.check_failure(FailOp::CreateGroup, &target)?;
        let handle = self.insert_child(
            parent,
            name,
            ObjectBody::Group {
                children: Vec::new(),
            },
        )?;
        tracing::debug!(path = %target, "created group");
        Ok(handle)
    }

    fn create_dataset(
        &mut self,
        parent: Handle,
        name: &str,
        columns: &[ColumnSpec],
    ) -> Result<Handle, StoreError> {
        let target = self.path_of(parent)?.join(name);
        self.check_failure(FailOp::CreateDataSet, &target)?;
        let body = ObjectBody::DataSet {
            columns: columns
                .iter()
                .map(|spec| StoredColumn {
                    spec: spec.clone(),
                    values: Vec::new(),
                })
                .collect(),
            row_count: 0,
        };
        let handle = self.insert_child(parent, name, body)?;
        tracing::debug!(path = %target, columns = columns.len(), "created dataset");
        Ok(handle)
    }

    fn delete_object(&mut self, parent: Handle, name: &str) -> Result<(), StoreError> {
        let target = self.path_of(parent)?.join(name);
        self.check_failure(FailOp::Delete, &target)?;
        let id = self
            .child_named(parent, name)?
            .ok_or_else(|| StoreError::NotFound(target.to_string()))?;
        self.detach(parent, id)?;
        self.remove_subtree(id);
        tracing::debug!(path = %target, "deleted object");
        Ok(())
    }

    fn move_object(
        &mut self,
        old_parent: Handle,
        name: &str,
        new_parent: Handle,
        new_name: &str,
    ) -> Result<Handle, StoreError> {
        let source = self.path_of(old_parent)?.join(name);
        let target = self.path_of(new_parent)?.join(new_name);
        self.check_failure(FailOp::Move, &source)?;
        let id = self
            .child_named(old_parent, name)?
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
        if source.contains(&target) && source != target {
            return Err(StoreError::IntoItself(source.to_string()));
        }
        if source == target {
            return Ok(Handle(id));
        }
        if self.child_named(new_parent, new_name)?.is_some() {
            return Err(StoreError::AlreadyExists(target.to_string()));
        }
        // validate the destination is a group before detaching
        self.children_of(new_parent)?;
        self.detach(old_parent, id)?;
        let object = self.object_mut(Handle(id))?;
        object.name = new_name.to_string();
        object.parent = Some(new_parent.0);
        if let ObjectBody::Group { children } = &mut self.object_mut(new_parent)?.body {
            children.push(id);
        }
        tracing::debug!(from = %source, to = %target, "moved object");
        Ok(Handle(id))
    }

    fn copy_object(
        &mut self,
        source: &StorePath,
        new_parent: Handle,
        new_name: &str,
    ) -> Result<Handle, StoreError> {
        let target = self.path_of(new_parent)?.join(new_name);
        self.check_failure(FailOp::Copy, &target)?;
        let source_handle = self.open(source)?;
        if source.contains(&target) {
            return Err(StoreError::IntoItself(source.to_string()));
        }
        if self.child_named(new_parent, new_name)?.is_some() {
            return Err(StoreError::AlreadyExists(target.to_string()));
        }
        let id = self.clone_subtree(source_handle.0, new_parent.0, new_name)?;
        if let ObjectBody::Group { children } = &mut self.object_mut(new_parent)?.body {
            children.push(id);
        }
        tracing::debug!(from = %source, to = %target, "copied object");
        Ok(Handle(id))
    }

    fn list_children(&self, group: Handle) -> Result<Children, StoreError> {
        let mut listing = Children::default();
        for id in self.children_of(group)? {
            let object = self.object(Handle(*id))?;
            let name = object.name.clone();
            match object.body {
                ObjectBody::Group { .. } => listing.groups.push(name),
                ObjectBody::DataSet { .. } => listing.datasets.push(name),
                ObjectBody::Unsupported => listing.unsupported.push(name),
            }
        }
        listing.attributes = self.object(group)?.attributes.keys().cloned().collect();
        Ok(listing)
    }

    fn dataset_info(&self, dataset: Handle) -> Result<DataSetInfo, StoreError> {
        match &self.object(dataset)?.body {
            ObjectBody::DataSet { columns, row_count } => Ok(DataSetInfo {
                columns: columns.iter().map(|c| c.spec.clone()).collect(),
                row_count: *row_count,
            }),
            other => Err(self.kind_error(dataset, ObjectKind::DataSet, other)),
        }
    }

    fn read_column(&self, dataset: Handle, column_index: usize) -> Result<Vec<Value>, StoreError> {
        match &self.object(dataset)?.body {
            ObjectBody::DataSet { columns, .. } => columns
                .get(column_index)
                .map(|c| c.values.clone())
                .ok_or_else(|| StoreError::ColumnOutOfRange {
                    path: self.path_string(dataset),
                    index: column_index,
                }),
            other => Err(self.kind_error(dataset, ObjectKind::DataSet, other)),
        }
    }

    fn add_column(&mut self, dataset: Handle, spec: &ColumnSpec) -> Result<usize, StoreError> {
        let path = self.path_of(dataset)?.join(&spec.name);
        self.check_failure(FailOp::AddColumn, &path)?;
        let (columns, row_count) = self.dataset_mut(dataset)?;
        if columns.iter().any(|c| c.spec.name == spec.name) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        columns.push(StoredColumn {
            spec: spec.clone(),
            values: vec![Value::Missing; *row_count as usize],
        });
        Ok(columns.len() - 1)
    }

    fn delete_column(&mut self, dataset: Handle, column_index: usize) -> Result<(), StoreError> {
        let path = self.path_string(dataset);
        let (columns, _) = self.dataset_mut(dataset)?;
        if column_index >= columns.len() {
            return Err(StoreError::ColumnOutOfRange {
                path,
                index: column_index,
            });
        }
        columns.remove(column_index);
        Ok(())
    }

    fn alter_column(
        &mut self,
        dataset: Handle,
        column_index: usize,
        spec: &ColumnSpec,
    ) -> Result<(), StoreError> {
        let dataset_path = self.path_of(dataset)?;
        self.check_failure(FailOp::AlterColumn, &dataset_path.join(&spec.name))?;
        let (columns, _) = self.dataset_mut(dataset)?;
        if columns
            .iter()
            .enumerate()
            .any(|(i, c)| i != column_index && c.spec.name == spec.name)
        {
            return Err(StoreError::AlreadyExists(
                dataset_path.join(&spec.name).to_string(),
            ));
        }
        let column = columns
            .get_mut(column_index)
            .ok_or_else(|| StoreError::ColumnOutOfRange {
                path: dataset_path.to_string(),
                index: column_index,
            })?;
        let converted = column
            .values
            .iter()
            .map(|v| coerce(v, &spec.store_type))
            .collect::<Result<Vec<_>, _>>()?;
        column.values = converted;
        column.spec = spec.clone();
        Ok(())
    }

    fn write_column_batch(
        &mut self,
        dataset: Handle,
        column_index: usize,
        rows: Range<u64>,
        values: &[Value],
    ) -> Result<(), StoreError> {
        let dataset_path = self.path_of(dataset)?;
        let (columns, row_count) = self.dataset_mut(dataset)?;
        let rows_total = *row_count;
        let name = columns
            .get(column_index)
            .map(|c| c.spec.name.clone())
            .ok_or_else(|| StoreError::ColumnOutOfRange {
                path: dataset_path.to_string(),
                index: column_index,
            })?;
        if rows.end < rows.start || (rows.end - rows.start) as usize != values.len() {
            return Err(StoreError::RowRange {
                path: dataset_path.to_string(),
                start: rows.start,
                end: rows.end,
                rows: rows_total,
            });
        }
        self.check_failure(FailOp::WriteColumn, &dataset_path.join(&name))?;

        let (columns, row_count) = self.dataset_mut(dataset)?;
        if rows.end > *row_count {
            *row_count = rows.end;
            for column in columns.iter_mut() {
                column.values.resize(rows.end as usize, Value::Missing);
            }
        }
        let column = &mut columns[column_index];
        for (offset, value) in values.iter().enumerate() {
            column.values[rows.start as usize + offset] = coerce(value, &column.spec.store_type)?;
        }
        Ok(())
    }

    fn attribute_names(&self, handle: Handle) -> Result<Vec<String>, StoreError> {
        Ok(self.object(handle)?.attributes.keys().cloned().collect())
    }

    fn read_attribute(
        &self,
        handle: Handle,
        name: &str,
    ) -> Result<(LogicalType, Value), StoreError> {
        self.object(handle)?
            .attributes
            .get(name)
            .map(|a| (a.logical_type, a.value.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("{}@{}", self.path_string(handle), name)))
    }

    fn write_attribute(
        &mut self,
        handle: Handle,
        name: &str,
        logical_type: LogicalType,
        value: &Value,
    ) -> Result<(), StoreError> {
        let path = self.path_of(handle)?.join(name);
        self.check_failure(FailOp::WriteAttribute, &path)?;
        self.object_mut(handle)?.attributes.insert(
            name.to_string(),
            StoredAttribute {
                logical_type,
                value: value.clone(),
            },
        );
        Ok(())
    }

    fn delete_attribute(&mut self, handle: Handle, name: &str) -> Result<(), StoreError> {
        let path = self.path_string(handle);
        self.object_mut(handle)?
            .attributes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("{}@{}", path, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryStore {
        let mut store = MemoryStore::new();
        let root = store.root();
        let g = store.create_group(root, "g").unwrap();
        let d = store
            .create_dataset(g, "d", &[ColumnSpec::new("x", LogicalType::Int)])
            .unwrap();
        store
            .write_column_batch(d, 0, 0..3, &[Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap();
        store
            .write_attribute(g, "units", LogicalType::String, &Value::Str("m".into()))
            .unwrap();
        store
    }

    #[test]
    fn test_open_and_path_of() {
        let store = sample();
        let d = store.open(&StorePath::new("/g/d")).unwrap();
        assert_eq!(store.path_of(d).unwrap(), StorePath::new("/g/d"));
        assert!(store.open(&StorePath::new("/g/missing")).is_err());
        assert_eq!(store.kind_of(&StorePath::new("/g")), Some(ObjectKind::Group));
        assert_eq!(
            store.kind_of(&StorePath::new("/g/units")),
            Some(ObjectKind::Attribute)
        );
    }

    #[test]
    fn test_create_duplicate_fails() {
        let mut store = sample();
        let root = store.root();
        assert!(matches!(
            store.create_group(root, "g"),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_write_grows_dataset() {
        let mut store = sample();
        let d = store.open(&StorePath::new("/g/d")).unwrap();
        store.add_column(d, &ColumnSpec::new("y", LogicalType::Double)).unwrap();
        store
            .write_column_batch(d, 1, 2..4, &[Value::Double(0.5), Value::Double(1.5)])
            .unwrap();
        let info = store.dataset_info(d).unwrap();
        assert_eq!(info.row_count, 4);
        assert_eq!(
            store.read_column(d, 0).unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Missing]
        );
    }

    #[test]
    fn test_move_and_copy() {
        let mut store = sample();
        let root = store.root();
        let g = store.open(&StorePath::new("/g")).unwrap();
        store.copy_object(&StorePath::new("/g"), root, "g2").unwrap();
        assert!(store.exists(&StorePath::new("/g2/d")));
        assert_eq!(
            store.read_attribute(store.open(&StorePath::new("/g2")).unwrap(), "units").unwrap().1,
            Value::Str("m".into())
        );

        let moved = store.move_object(root, "g2", g, "inner").unwrap();
        assert_eq!(store.path_of(moved).unwrap(), StorePath::new("/g/inner"));
        assert!(matches!(
            store.move_object(root, "g", moved, "loop"),
            Err(StoreError::IntoItself(_))
        ));
    }

    #[test]
    fn test_injected_failure() {
        let mut store = MemoryStore::new();
        store.fail_on(FailOp::CreateGroup, "/a");
        let root = store.root();
        assert!(matches!(
            store.create_group(root, "a"),
            Err(StoreError::Injected(_))
        ));
        assert!(store.create_group(root, "b").is_ok());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        store.save(&path).unwrap();
        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(
            loaded.dataset_values(&StorePath::new("/g/d")).unwrap(),
            store.dataset_values(&StorePath::new("/g/d")).unwrap()
        );
    }
}
