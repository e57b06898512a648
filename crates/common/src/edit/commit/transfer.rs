//! Copying store content by value
//!
//! Used where a structural `copy_object` is not possible: copies between
//! two stores, and merging a copied source into an object that already
//! exists at the target.

use crate::path::StorePath;
use crate::store::{ColumnSpec, Handle, HierarchicalStore, ObjectKind, StoreError};
use crate::types::{LogicalType, Value};

/// In-memory image of a stored object and everything below it
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Snapshot {
    Group {
        attributes: Vec<(String, LogicalType, Value)>,
        children: Vec<(String, Snapshot)>,
    },
    DataSet {
        attributes: Vec<(String, LogicalType, Value)>,
        columns: Vec<(ColumnSpec, Vec<Value>)>,
    },
}

/// Read the object at `path` with all of its content
pub(crate) fn snapshot(store: &dyn HierarchicalStore, path: &StorePath) -> Result<Snapshot, StoreError> {
    let handle = store.open(path)?;
    let attributes = store
        .attribute_names(handle)?
        .into_iter()
        .map(|name| {
            let (logical_type, value) = store.read_attribute(handle, &name)?;
            Ok((name, logical_type, value))
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    match store.kind_of(path) {
        Some(ObjectKind::Group) => {
            let listing = store.list_children(handle)?;
            let mut children = Vec::new();
            for name in listing.groups.iter().chain(listing.datasets.iter()) {
                children.push((name.clone(), snapshot(store, &path.join(name))?));
            }
            for name in &listing.unsupported {
                tracing::warn!(path = %path.join(name), "foreign object not copied");
            }
            Ok(Snapshot::Group {
                attributes,
                children,
            })
        }
        Some(ObjectKind::DataSet) => {
            let info = store.dataset_info(handle)?;
            let mut columns = Vec::with_capacity(info.columns.len());
            for (index, spec) in info.columns.into_iter().enumerate() {
                columns.push((spec, store.read_column(handle, index)?));
            }
            Ok(Snapshot::DataSet {
                attributes,
                columns,
            })
        }
        Some(found) => Err(StoreError::KindMismatch {
            path: path.to_string(),
            expected: ObjectKind::Group,
            found,
        }),
        None => Err(StoreError::NotFound(path.to_string())),
    }
}

/// Create `snapshot` as `parent/name`
pub(crate) fn recreate(
    store: &mut dyn HierarchicalStore,
    parent: Handle,
    name: &str,
    snapshot: &Snapshot,
    batch_rows: usize,
) -> Result<Handle, StoreError> {
    match snapshot {
        Snapshot::Group {
            attributes,
            children,
        } => {
            let handle = store.create_group(parent, name)?;
            write_attributes(store, handle, attributes)?;
            for (child_name, child) in children {
                recreate(store, handle, child_name, child, batch_rows)?;
            }
            Ok(handle)
        }
        Snapshot::DataSet {
            attributes,
            columns,
        } => {
            let specs: Vec<ColumnSpec> = columns.iter().map(|(spec, _)| spec.clone()).collect();
            let handle = store.create_dataset(parent, name, &specs)?;
            for (index, (_, values)) in columns.iter().enumerate() {
                write_batched(store, handle, index, values, batch_rows)?;
            }
            write_attributes(store, handle, attributes)?;
            Ok(handle)
        }
    }
}

/// Merge `snapshot` into the existing object `target`
///
/// Missing children, columns and attributes are added; objects present on
/// both sides are merged recursively when both are groups and left alone
/// otherwise.
pub(crate) fn merge_into(
    store: &mut dyn HierarchicalStore,
    target: Handle,
    snapshot: &Snapshot,
    batch_rows: usize,
) -> Result<(), StoreError> {
    let target_path = store.path_of(target)?;
    match snapshot {
        Snapshot::Group {
            attributes,
            children,
        } => {
            let listing = store.list_children(target)?;
            let missing: Vec<_> = attributes
                .iter()
                .filter(|(name, _, _)| !listing.attributes.contains(name))
                .cloned()
                .collect();
            write_attributes(store, target, &missing)?;
            for (name, child) in children {
                let child_path = target_path.join(name);
                match (store.kind_of(&child_path), child) {
                    (None, _) => {
                        recreate(store, target, name, child, batch_rows)?;
                    }
                    (Some(ObjectKind::Group), Snapshot::Group { .. }) => {
                        let handle = store.open(&child_path)?;
                        merge_into(store, handle, child, batch_rows)?;
                    }
                    (Some(_), _) => {
                        tracing::debug!(path = %child_path, "kept existing object while merging");
                    }
                }
            }
        }
        Snapshot::DataSet {
            attributes,
            columns,
        } => {
            let info = store.dataset_info(target)?;
            for (spec, values) in columns {
                if info.column_index(&spec.name).is_some() {
                    continue;
                }
                let index = store.add_column(target, spec)?;
                write_batched(store, target, index, values, batch_rows)?;
            }
            let existing = store.attribute_names(target)?;
            let missing: Vec<_> = attributes
                .iter()
                .filter(|(name, _, _)| !existing.contains(name))
                .cloned()
                .collect();
            write_attributes(store, target, &missing)?;
        }
    }
    Ok(())
}

fn write_attributes(
    store: &mut dyn HierarchicalStore,
    handle: Handle,
    attributes: &[(String, LogicalType, Value)],
) -> Result<(), StoreError> {
    for (name, logical_type, value) in attributes {
        store.write_attribute(handle, name, *logical_type, value)?;
    }
    Ok(())
}

/// Write all of `values` into a column in chunks of `batch_rows`
pub(crate) fn write_batched(
    store: &mut dyn HierarchicalStore,
    dataset: Handle,
    column_index: usize,
    values: &[Value],
    batch_rows: usize,
) -> Result<(), StoreError> {
    let batch_rows = batch_rows.max(1);
    for (chunk_index, chunk) in values.chunks(batch_rows).enumerate() {
        let start = (chunk_index * batch_rows) as u64;
        let end = start + chunk.len() as u64;
        store.write_column_batch(dataset, column_index, start..end, chunk)?;
    }
    Ok(())
}
