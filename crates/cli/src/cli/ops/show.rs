use std::fmt;
use std::path::PathBuf;

use clap::Args;
use comfy_table::Table;
use owo_colors::OwoColorize;

use common::edit::{AttributeValue, EditAction, EditKind, NodeKind, OverwritePolicy, ValueSource};
use stagetree_cli::files::{self, FileError};

#[derive(Args, Debug, Clone)]
pub struct Show {
    /// Tree document to show
    pub tree: PathBuf,

    /// Only list nodes with staged edits
    #[arg(long)]
    pub pending: bool,
}

#[derive(Debug)]
pub struct NodeRow {
    pub path: String,
    pub kind: EditKind,
    pub action: EditAction,
    pub policy: OverwritePolicy,
    pub detail: String,
}

#[derive(Debug)]
pub struct ShowOutput {
    pub rows: Vec<NodeRow>,
}

fn action_cell(action: EditAction) -> String {
    match action {
        EditAction::NoAction => action.to_string().dimmed().to_string(),
        EditAction::Create | EditAction::Copy => action.to_string().green().to_string(),
        EditAction::Delete => action.to_string().red().to_string(),
        EditAction::Modify => action.to_string().yellow().to_string(),
        EditAction::ModifyChildrenOnly => action.to_string(),
    }
}

impl fmt::Display for ShowOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "No nodes to show");
        }

        let mut table = Table::new();
        table.set_header(vec!["PATH", "KIND", "ACTION", "POLICY", "DETAIL"]);
        for row in &self.rows {
            table.add_row(vec![
                row.path.clone(),
                format!("{:?}", row.kind).to_lowercase(),
                action_cell(row.action),
                row.policy.to_string(),
                row.detail.clone(),
            ]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    File(#[from] FileError),
}

fn detail(kind: &NodeKind) -> String {
    match kind {
        NodeKind::File(file) => file.file_path.display().to_string(),
        NodeKind::DataSet(dataset) => match dataset.stored_rows {
            Some(rows) => format!("{} rows", rows),
            None => String::new(),
        },
        NodeKind::Column(column) => {
            let ty = column
                .logical_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".into());
            let source = match &column.source {
                ValueSource::Literal { values } => format!("{} literal values", values.len()),
                ValueSource::Fixed { value } => format!("fixed {}", value),
                ValueSource::Input { column } => format!("input {}", column),
                ValueSource::Stored { rows } => format!("{} stored rows", rows),
            };
            format!("{} ({})", ty, source)
        }
        NodeKind::Attribute(attribute) => {
            let ty = attribute
                .logical_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".into());
            match &attribute.value {
                AttributeValue::Literal { value } => format!("{} = {}", ty, value),
                AttributeValue::Variable { name } => format!("{} = ${}", ty, name),
                AttributeValue::Stored => ty,
            }
        }
        NodeKind::Group | NodeKind::Unsupported => String::new(),
    }
}

impl crate::cli::op::Op for Show {
    type Error = ShowError;
    type Output = ShowOutput;

    fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let tree = files::load_tree(&self.tree)?;
        let rows = tree
            .walk(tree.root())
            .into_iter()
            .filter_map(|id| tree.get(id).map(|node| (id, node)))
            .filter(|(_, node)| !self.pending || node.action().is_pending())
            .map(|(id, node)| NodeRow {
                path: tree.display_path(id),
                kind: node.tag(),
                action: node.action(),
                policy: node.policy(),
                detail: detail(node.kind()),
            })
            .collect();
        Ok(ShowOutput { rows })
    }
}
