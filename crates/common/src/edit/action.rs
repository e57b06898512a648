use std::fmt;

use serde::{Deserialize, Serialize};

/// What a staged node intends to do to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    /// Mirrors existing content, nothing to do
    #[default]
    NoAction,
    /// Materialize a new object
    Create,
    /// Structural copy of an existing object
    Copy,
    /// Remove the existing object
    Delete,
    /// Rename, move or re-type the existing object
    Modify,
    /// Nothing to do on this node, but descendants carry edits
    ModifyChildrenOnly,
}

impl EditAction {
    /// Whether this node will exist as new content after commit
    pub fn is_create_or_copy(&self) -> bool {
        matches!(self, Self::Create | Self::Copy)
    }

    /// Whether the node refers to an object that already exists in the store
    pub fn refers_to_existing(&self) -> bool {
        !self.is_create_or_copy()
    }

    /// Whether committing requires work on this node or below it
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::NoAction)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoAction => "none",
            Self::Create => "create",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::ModifyChildrenOnly => "modify-children",
        };
        f.write_str(name)
    }
}
