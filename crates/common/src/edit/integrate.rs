//! Merging one staged tree into another
//!
//! The donor tree is walked top down next to the recipient. Donor nodes
//! that mirror existing objects find their counterpart by kind and source
//! path; donor nodes that create or copy content find the recipient node
//! an earlier integration made from them. Matched nodes take over the
//! donor's staged properties, unmatched ones are copied over.

use super::action::EditAction;
use super::conflict::unique_name;
use super::error::EditError;
use super::node::{EditNode, NodeId, NodeKind};
use super::policy::OverwritePolicy;
use super::tree::{CopyMode, EditTree};

/// What an integration changed in the recipient
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationReport {
    /// Donor nodes copied into the recipient, counting whole subtrees once
    pub nodes_added: usize,
    /// Recipient nodes that took over donor properties
    pub nodes_updated: usize,
    /// Donor paths left out because they abort on a clash
    pub dropped: Vec<String>,
    /// Copies given a fresh name, as (staged name, new name)
    pub renamed: Vec<(String, String)>,
}

impl IntegrationReport {
    /* Getters */

    pub fn is_noop(&self) -> bool {
        self.nodes_added == 0 && self.nodes_updated == 0 && self.dropped.is_empty()
    }
}

/// Integrates a donor tree into a recipient tree
#[derive(Debug)]
pub struct IntegrationEngine<'a> {
    recipient: &'a mut EditTree,
    donor: &'a EditTree,
    final_pass: bool,
    report: IntegrationReport,
}

impl<'a> IntegrationEngine<'a> {
    pub fn new(recipient: &'a mut EditTree, donor: &'a EditTree, final_pass: bool) -> Self {
        Self {
            recipient,
            donor,
            final_pass,
            report: IntegrationReport::default(),
        }
    }

    /// Merge the donor root into the recipient root
    pub fn run(mut self, input_row_count: Option<u64>) -> Result<IntegrationReport, EditError> {
        let recipient_root = self.recipient.root();
        let donor_root = self.donor.root();
        self.merge_children(recipient_root, donor_root)?;
        if let Some(rows) = input_row_count {
            self.recipient.set_input_row_count(Some(rows));
        }
        tracing::info!(
            added = self.report.nodes_added,
            updated = self.report.nodes_updated,
            dropped = self.report.dropped.len(),
            final_pass = self.final_pass,
            "integrated staged tree"
        );
        Ok(self.report)
    }

    fn merge_children(&mut self, recipient: NodeId, donor: NodeId) -> Result<(), EditError> {
        let donor_tree = self.donor;
        for &donor_child in donor_tree.children(donor) {
            let donor_node = donor_tree.node(donor_child)?;
            let counterpart = self.find_counterpart(recipient, donor_node);

            if self.final_pass
                && donor_node.policy() == OverwritePolicy::Abort
                && self.collides(recipient, donor_node, counterpart)
            {
                let path = donor_tree.display_path(donor_child);
                tracing::debug!(%path, "dropping aborting donor node");
                self.report.dropped.push(path);
                continue;
            }

            match counterpart {
                Some(existing) => {
                    if donor_node.action().is_pending()
                        && donor_node.action() != EditAction::ModifyChildrenOnly
                    {
                        self.copy_properties(existing, donor_node)?;
                        self.resolve_rename(existing)?;
                        self.report.nodes_updated += 1;
                    }
                    if donor_node.tag().is_container() {
                        self.merge_children(existing, donor_child)?;
                    }
                }
                None => {
                    let copy = self.copy_subtree(recipient, donor_child)?;
                    self.resolve_rename(copy)?;
                    self.report.nodes_added += 1;
                }
            }
        }
        Ok(())
    }

    /// Recipient child of `parent` that stands for `donor`
    fn find_counterpart(&self, parent: NodeId, donor: &EditNode) -> Option<NodeId> {
        self.recipient.children(parent).iter().copied().find(|c| {
            let Some(candidate) = self.recipient.get(*c) else {
                return false;
            };
            if candidate.tag() != donor.tag() {
                return false;
            }
            if donor.action().is_create_or_copy() {
                candidate.integrated_from() == Some(donor.id()) || candidate.id() == donor.id()
            } else {
                !candidate.action().is_create_or_copy()
                    && candidate.source_path().is_some()
                    && candidate.source_path() == donor.source_path()
            }
        })
    }

    /// Whether a live recipient sibling other than `counterpart` holds the
    /// donor's name
    fn collides(&self, parent: NodeId, donor: &EditNode, counterpart: Option<NodeId>) -> bool {
        self.recipient.children(parent).iter().any(|c| {
            Some(*c) != counterpart
                && self.recipient.get(*c).is_some_and(|n| {
                    n.is_live()
                        && n.name() == donor.name()
                        && n.tag().namespace() == donor.tag().namespace()
                })
        })
    }

    fn copy_properties(&mut self, target: NodeId, donor: &EditNode) -> Result<(), EditError> {
        let node = self.recipient.node_mut(target)?;
        node.name = donor.name.clone();
        node.action = donor.action;
        node.prior_action = donor.prior_action;
        node.policy = donor.policy;
        if !matches!(node.kind, NodeKind::File(_)) && node.kind.tag() == donor.kind.tag() {
            node.kind = donor.kind.clone();
        }
        self.recipient.promote_ancestors(target);
        Ok(())
    }

    fn copy_subtree(&mut self, parent: NodeId, donor: NodeId) -> Result<NodeId, EditError> {
        let donor_node = self.donor.node(donor)?;
        let mode = if donor_node.action().is_create_or_copy() {
            CopyMode::Staged
        } else {
            CopyMode::CreatesOnly
        };
        let mut fragment = self.donor.extract(donor, mode)?;
        if self.donor.file_path() != self.recipient.file_path() {
            let donor_file = self.donor.file_path().to_path_buf();
            for (_, node) in fragment.iter_mut() {
                if node.action == EditAction::Copy && node.source_file.is_none() {
                    node.source_file = Some(donor_file.clone());
                }
            }
        }
        let copy = self.recipient.graft(parent, fragment)?;
        for id in self.recipient.walk(copy) {
            if self
                .recipient
                .get(id)
                .is_some_and(|n| n.action().is_pending())
            {
                self.recipient.promote_ancestors(id);
            }
        }
        tracing::debug!(
            path = %self.recipient.display_path(copy),
            ?mode,
            "copied donor subtree"
        );
        Ok(copy)
    }

    /// In the final pass, give a colliding `Rename` copy a fresh name
    fn resolve_rename(&mut self, id: NodeId) -> Result<(), EditError> {
        if !self.final_pass {
            return Ok(());
        }
        let node = self.recipient.node(id)?;
        if node.policy() != OverwritePolicy::Rename || !node.action().is_create_or_copy() {
            return Ok(());
        }
        let Some(parent) = node.parent() else {
            return Ok(());
        };
        let namespace = node.tag().namespace();
        let taken = |name: &str| {
            self.recipient.children(parent).iter().any(|s| {
                *s != id
                    && self.recipient.get(*s).is_some_and(|n| {
                        n.is_live() && n.name() == name && n.tag().namespace() == namespace
                    })
            })
        };
        let current = node.name().to_string();
        if !taken(&current) {
            return Ok(());
        }
        let fresh = unique_name(&current, taken);
        tracing::debug!(from = %current, to = %fresh, "renamed integrated copy");
        self.recipient.node_mut(id)?.name = fresh.clone();
        self.report.renamed.push((current, fresh));
        Ok(())
    }
}

impl EditTree {
    /// Merge `donor` into this tree
    ///
    /// With `final_pass` set, donor nodes that abort on a clash are dropped
    /// and colliding copies with a `Rename` policy get a unique name.
    pub fn integrate(
        &mut self,
        donor: &EditTree,
        input_row_count: Option<u64>,
        final_pass: bool,
    ) -> Result<IntegrationReport, EditError> {
        IntegrationEngine::new(self, donor, final_pass).run(input_row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::node::{ColumnEdit, ValueSource};
    use crate::types::{LogicalType, Value};

    fn shape(tree: &EditTree) -> Vec<(String, EditAction)> {
        tree.walk(tree.root())
            .into_iter()
            .map(|id| {
                let node = tree.node(id).unwrap();
                (tree.display_path(id), node.action())
            })
            .collect()
    }

    fn donor() -> EditTree {
        let mut donor = EditTree::new("/tmp/a.h5");
        let root = donor.root();
        let g = donor.new_group(root, "g").unwrap();
        donor
            .new_dataset(
                g,
                "d",
                [(
                    "x",
                    ColumnEdit::new(LogicalType::Int, ValueSource::literal([Value::Int(1)])),
                )],
            )
            .unwrap();
        donor
    }

    #[test]
    fn test_integrate_into_empty_tree() {
        let donor = donor();
        let mut recipient = EditTree::new("/tmp/a.h5");
        let report = recipient.integrate(&donor, Some(4), false).unwrap();
        assert_eq!(report.nodes_added, 1);
        assert_eq!(shape(&recipient), shape(&donor));
        assert_eq!(recipient.input_row_count(), Some(4));
    }

    #[test]
    fn test_integrate_is_idempotent() {
        let donor = donor();
        let mut recipient = EditTree::new("/tmp/a.h5");
        recipient.integrate(&donor, None, true).unwrap();
        let once = shape(&recipient);
        let report = recipient.integrate(&donor, None, true).unwrap();
        assert_eq!(shape(&recipient), once);
        assert_eq!(report.nodes_added, 0);
    }

    #[test]
    fn test_final_pass_drops_abort() {
        let mut donor = EditTree::new("/tmp/a.h5");
        let droot = donor.root();
        let g = donor.new_group(droot, "g").unwrap();
        donor.set_policy(g, OverwritePolicy::Abort).unwrap();

        let mut recipient = EditTree::new("/tmp/a.h5");
        let rroot = recipient.root();
        recipient.new_group(rroot, "g").unwrap();

        let report = recipient.integrate(&donor, None, true).unwrap();
        assert_eq!(report.dropped, vec!["/g".to_string()]);
        assert_eq!(recipient.children(rroot).len(), 1);
    }

    #[test]
    fn test_final_pass_renames_copies() {
        let mut donor = EditTree::new("/tmp/a.h5");
        let droot = donor.root();
        let g = donor.new_group(droot, "g").unwrap();
        donor.set_policy(g, OverwritePolicy::Rename).unwrap();

        let mut recipient = EditTree::new("/tmp/a.h5");
        let rroot = recipient.root();
        recipient.new_group(rroot, "g").unwrap();

        let report = recipient.integrate(&donor, None, true).unwrap();
        assert_eq!(report.renamed, vec![("g".to_string(), "g(1)".to_string())]);
        let names: Vec<_> = recipient
            .children(rroot)
            .iter()
            .map(|c| recipient.node(*c).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["g", "g(1)"]);

        recipient.integrate(&donor, None, true).unwrap();
        assert_eq!(recipient.children(rroot).len(), 2);
    }
}
