use std::fmt;

use serde::{Deserialize, Serialize};

use super::action::EditAction;
use super::node::EditKind;

/// How a staged node resolves a clash with an object of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Not decided yet; a clash is an error
    #[default]
    None,
    /// Refuse to touch an existing object
    Abort,
    /// Delete the existing object first
    Overwrite,
    /// Pick a fresh name such as `name(1)`
    Rename,
    /// Merge children into the existing container
    Integrate,
}

/// Policies grouped by how they treat a clash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFamily {
    /// `None` and `Abort`: the clash stays a clash
    Unresolved,
    /// `Overwrite`: the newcomer replaces the other side
    Replace,
    /// `Rename` and `Integrate`: the clash disappears by construction
    Resolving,
}

impl OverwritePolicy {
    pub const ALL: [OverwritePolicy; 5] = [
        Self::None,
        Self::Abort,
        Self::Overwrite,
        Self::Rename,
        Self::Integrate,
    ];

    pub fn family(&self) -> PolicyFamily {
        match self {
            Self::None | Self::Abort => PolicyFamily::Unresolved,
            Self::Overwrite => PolicyFamily::Replace,
            Self::Rename | Self::Integrate => PolicyFamily::Resolving,
        }
    }

    /// Whether this policy can be chosen for a node of `kind` doing `action`
    pub fn available_for(&self, kind: EditKind, action: EditAction) -> bool {
        match self {
            Self::None => true,
            _ if kind == EditKind::Unsupported => false,
            Self::Abort | Self::Overwrite => matches!(
                action,
                EditAction::Create | EditAction::Copy | EditAction::Modify
            ),
            Self::Rename => action.is_create_or_copy(),
            Self::Integrate => {
                matches!(
                    kind,
                    EditKind::Group | EditKind::File | EditKind::DataSet
                ) && action.is_create_or_copy()
            }
        }
    }

    /// All policies available for `kind` doing `action`
    pub fn available(kind: EditKind, action: EditAction) -> Vec<OverwritePolicy> {
        Self::ALL
            .into_iter()
            .filter(|p| p.available_for(kind, action))
            .collect()
    }
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Abort => "abort",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Integrate => "integrate",
        };
        f.write_str(name)
    }
}
