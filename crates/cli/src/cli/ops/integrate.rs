use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use common::edit::{EditError, IntegrationReport};
use stagetree_cli::files::{self, FileError};

#[derive(Args, Debug, Clone)]
pub struct Integrate {
    /// Tree document receiving the edits
    pub recipient: PathBuf,

    /// Tree documents whose edits are merged in, in order
    #[arg(required = true)]
    pub donors: Vec<PathBuf>,

    /// Drop donor edits that abort on a clash and rename colliding copies
    #[arg(long)]
    pub final_pass: bool,

    /// Row count of the input table, used to size input fed columns
    #[arg(long)]
    pub input_rows: Option<u64>,

    /// Where to write the merged tree (defaults to the recipient)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct IntegrateOutput {
    pub output: PathBuf,
    pub report: IntegrationReport,
}

impl fmt::Display for IntegrateOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.report.is_noop() {
            return write!(f, "Nothing to integrate");
        }
        writeln!(
            f,
            "{} into {}",
            "Integrated".green().bold(),
            self.output.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Added:".dimmed(), self.report.nodes_added)?;
        write!(f, "  {} {}", "Updated:".dimmed(), self.report.nodes_updated)?;
        for path in &self.report.dropped {
            write!(f, "\n  {} {}", "Dropped:".yellow(), path)?;
        }
        for (from, to) in &self.report.renamed {
            write!(f, "\n  {} {} -> {}", "Renamed:".dimmed(), from, to)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrateError {
    #[error(transparent)]
    File(#[from] FileError),
    #[error("failed to integrate {path}: {source}")]
    Edit { path: PathBuf, source: EditError },
}

impl crate::cli::op::Op for Integrate {
    type Error = IntegrateError;
    type Output = IntegrateOutput;

    fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut recipient = files::load_tree(&self.recipient)?;
        let input_rows = self.input_rows.or(recipient.input_row_count());

        let mut report = IntegrationReport::default();
        for path in &self.donors {
            let donor = files::load_tree(path)?;
            let step = recipient
                .integrate(&donor, input_rows, self.final_pass)
                .map_err(|source| IntegrateError::Edit {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(
                donor = %path.display(),
                added = step.nodes_added,
                updated = step.nodes_updated,
                "integrated donor"
            );
            report.nodes_added += step.nodes_added;
            report.nodes_updated += step.nodes_updated;
            report.dropped.extend(step.dropped);
            report.renamed.extend(step.renamed);
        }

        let output = self.output.clone().unwrap_or_else(|| self.recipient.clone());
        files::save_tree(&recipient, &output)?;

        Ok(IntegrateOutput { output, report })
    }
}
