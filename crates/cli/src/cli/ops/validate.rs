use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use common::edit::{InvalidCause, Validity};
use stagetree_cli::files::{self, FileError};

#[derive(Args, Debug, Clone)]
pub struct Validate {
    /// Tree document to check
    pub tree: PathBuf,

    /// Also check against this store snapshot (defaults to the configured
    /// store, if any)
    #[arg(long)]
    pub store: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ValidateOutput {
    pub tree: PathBuf,
    pub against_store: bool,
}

impl fmt::Display for ValidateOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.tree.display().to_string().bold(),
            "is valid".green().bold()
        )?;
        if self.against_store {
            write!(f, " {}", "(checked against store)".dimmed())?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error(transparent)]
    File(#[from] FileError),
    #[error("invalid tree: {0}")]
    Invalid(InvalidCause),
}

impl crate::cli::op::Op for Validate {
    type Error = ValidateError;
    type Output = ValidateOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut tree = files::load_tree(&self.tree)?;

        let store_path = ctx.store_path(self.store.as_deref());
        let validity = match &store_path {
            Some(path) => {
                let store = files::load_store(path)?;
                tree.rebind(&store);
                tree.validate_against(&store)
            }
            None => tree.validate(),
        };

        match validity {
            Validity::Valid => Ok(ValidateOutput {
                tree: self.tree.clone(),
                against_store: store_path.is_some(),
            }),
            Validity::Invalid(cause) => Err(ValidateError::Invalid(cause)),
        }
    }
}
