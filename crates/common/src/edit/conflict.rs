//! Sibling name collisions
//!
//! Two children of the same parent collide when they share a namespace and
//! a name and neither is being deleted. For groups, datasets, and foreign
//! objects the policies of both sides decide whether the collision is
//! already resolved; columns and attributes collide on name alone.

use super::node::{EditKind, EditNode, NodeId};
use super::policy::{OverwritePolicy, PolicyFamily};
use super::tree::EditTree;

/// A pair of siblings holding the same name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub node: NodeId,
    pub other: NodeId,
}

impl Conflict {
    pub fn new(node: NodeId, other: NodeId) -> Self {
        Self { node, other }
    }
}

/// Pairwise collision predicate over the nodes of one tree
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector<'a> {
    tree: &'a EditTree,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(tree: &'a EditTree) -> Self {
        Self { tree }
    }

    /// Whether `a` and `b` collide
    pub fn is_in_conflict(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        match (self.tree.get(a), self.tree.get(b)) {
            (Some(left), Some(right)) => nodes_conflict(left, right),
            _ => false,
        }
    }

    /// All colliding pairs among the children of `parent`, each pair once
    pub fn conflicts_under(&self, parent: NodeId) -> Vec<Conflict> {
        let children = self.tree.children(parent);
        let mut conflicts = Vec::new();
        for (i, a) in children.iter().enumerate() {
            for b in &children[i + 1..] {
                if self.is_in_conflict(*a, *b) {
                    conflicts.push(Conflict::new(*a, *b));
                }
            }
        }
        conflicts
    }

    /// First sibling `node` collides with
    pub fn first_conflict(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.tree.parent(node)?;
        self.tree
            .children(parent)
            .iter()
            .copied()
            .find(|other| self.is_in_conflict(node, *other))
    }
}

/// Collision check for two nodes known to be siblings
pub(crate) fn nodes_conflict(a: &EditNode, b: &EditNode) -> bool {
    if a.id == b.id || a.parent != b.parent {
        return false;
    }
    if a.tag().namespace() != b.tag().namespace() || a.name != b.name {
        return false;
    }
    if a.action.is_delete() || b.action.is_delete() {
        return false;
    }
    match a.tag() {
        EditKind::Column | EditKind::Attribute => true,
        _ => policies_collide(a.policy, b.policy),
    }
}

/// Whether two container policies leave a name clash standing
pub(crate) fn policies_collide(a: OverwritePolicy, b: OverwritePolicy) -> bool {
    if a.family() == PolicyFamily::Resolving || b.family() == PolicyFamily::Resolving {
        return false;
    }
    a.family() == b.family()
}

/// First `name(n)`, n >= 1, for which `taken` is false
pub fn unique_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut n = 1u64;
    loop {
        let candidate = format!("{}({})", name, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
