use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use common::edit::{EditError, EditTree};
use stagetree_cli::files::{self, FileError};

#[derive(Args, Debug, Clone)]
pub struct Mirror {
    /// Store snapshot to mirror (defaults to the configured store)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Store file name the staged edits are meant for, e.g. run.h5
    #[arg(long)]
    pub file: PathBuf,

    /// Where to write the tree document
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug)]
pub struct MirrorOutput {
    pub output: PathBuf,
    pub nodes: usize,
}

impl fmt::Display for MirrorOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} nodes to {}",
            "Mirrored".green().bold(),
            self.nodes,
            self.output.display().to_string().bold()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error(transparent)]
    File(#[from] FileError),
    #[error("mirror failed: {0}")]
    Edit(#[from] EditError),
    #[error("no store given and no default_store configured")]
    NoStore,
}

impl crate::cli::op::Op for Mirror {
    type Error = MirrorError;
    type Output = MirrorOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let store_path = ctx
            .store_path(self.store.as_deref())
            .ok_or(MirrorError::NoStore)?;
        let store = files::load_store(&store_path)?;

        let mut tree = EditTree::mirror(&store, self.file.clone())?;
        tree.set_settings(ctx.config.tree_settings());
        files::save_tree(&tree, &self.output)?;

        Ok(MirrorOutput {
            output: self.output.clone(),
            nodes: tree.node_count(),
        })
    }
}
