use std::fmt;

use serde::Serialize;

/// Commit state of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Committed,
    Failed,
    Skipped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Outcome of a commit
///
/// Only groups, datasets and the file show up in `committed_paths` and
/// `skipped_paths`. Failures of any node, leaves included, are listed in
/// `failed_paths` with the error text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitReport {
    pub committed_paths: Vec<String>,
    pub failed_paths: Vec<(String, String)>,
    pub skipped_paths: Vec<String>,
    /// Columns and attributes written
    pub leaves_written: usize,
    pub cancelled: bool,
    /// Final state of every node the walk reached, in walk order
    pub node_states: Vec<(String, NodeState)>,
}

impl CommitReport {
    /* Getters */

    pub fn is_success(&self) -> bool {
        self.failed_paths.is_empty() && self.skipped_paths.is_empty() && !self.cancelled
    }

    pub fn failed(&self, path: &str) -> bool {
        self.failed_paths.iter().any(|(p, _)| p == path)
    }

    pub fn state_of(&self, path: &str) -> Option<NodeState> {
        self.node_states
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, state)| *state)
    }
}
