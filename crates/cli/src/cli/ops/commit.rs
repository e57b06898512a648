use std::fmt;
use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use common::edit::{CancelToken, CommitOptions, CommitReport, EditError, ProgressSink};
use common::store::MemoryStore;
use common::types::Value;
use stagetree_cli::files::{self, FileError};
use stagetree_cli::interrupt;

const BAR_LENGTH: u64 = 1000;

#[derive(Args, Debug, Clone)]
pub struct Commit {
    /// Tree document to commit
    pub tree: PathBuf,

    /// Store snapshot to apply the edits to (defaults to the configured store)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Rows written per store call (defaults to the configured value)
    #[arg(long)]
    pub batch_rows: Option<usize>,

    /// Value for an attribute staged as a variable, as NAME=VALUE
    #[arg(long = "var", value_parser = parse_variable)]
    pub variables: Vec<(String, Value)>,

    /// JSON input table for input fed columns
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Store snapshot standing in for another store file, as FILE=SNAPSHOT
    #[arg(long = "source", value_parser = parse_source)]
    pub sources: Vec<(PathBuf, PathBuf)>,

    /// Apply the edits without writing the store or the tree back
    #[arg(long)]
    pub dry_run: bool,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

fn parse_variable(raw: &str) -> Result<(String, Value), FileError> {
    files::parse_assignment(raw)
}

fn parse_source(raw: &str) -> Result<(PathBuf, PathBuf), String> {
    match raw.split_once('=') {
        Some((file, snapshot)) if !file.is_empty() && !snapshot.is_empty() => {
            Ok((PathBuf::from(file), PathBuf::from(snapshot)))
        }
        _ => Err(format!("expected FILE=SNAPSHOT, got {:?}", raw)),
    }
}

/// Progress bar fed by the commit's progress reports
struct BarProgress(ProgressBar);

impl BarProgress {
    fn new(hidden: bool) -> Self {
        if hidden {
            return Self(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(BAR_LENGTH);
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {percent:>3}%") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self(bar)
    }
}

impl ProgressSink for BarProgress {
    fn report(&mut self, fraction: f64) {
        self.0.set_position((fraction * BAR_LENGTH as f64).round() as u64);
    }
}

#[derive(Debug)]
pub struct CommitOutput {
    pub report: CommitReport,
    pub dry_run: bool,
}

impl fmt::Display for CommitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.report;
        let headline = if report.cancelled {
            "Cancelled".yellow().bold().to_string()
        } else if report.is_success() {
            "Committed".green().bold().to_string()
        } else {
            "Committed with failures".red().bold().to_string()
        };
        write!(
            f,
            "{} {} objects, {} leaves",
            headline,
            report.committed_paths.len(),
            report.leaves_written
        )?;
        if self.dry_run {
            write!(f, " {}", "(dry run, nothing saved)".dimmed())?;
        }
        for (path, error) in &report.failed_paths {
            write!(f, "\n  {} {}: {}", "Failed:".red(), path, error)?;
        }
        for path in &report.skipped_paths {
            write!(f, "\n  {} {}", "Skipped:".yellow(), path)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error(transparent)]
    File(#[from] FileError),
    #[error("commit failed: {0}")]
    Edit(#[from] EditError),
    #[error("no store given and no default_store configured")]
    NoStore,
}

impl crate::cli::op::Op for Commit {
    type Error = CommitError;
    type Output = CommitOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let store_path = ctx
            .store_path(self.store.as_deref())
            .ok_or(CommitError::NoStore)?;
        let mut tree = files::load_tree(&self.tree)?;
        let mut store = files::load_store(&store_path)?;

        let sources = self
            .sources
            .iter()
            .map(|(file, snapshot)| Ok((file.clone(), files::load_store(snapshot)?)))
            .collect::<Result<Vec<(PathBuf, MemoryStore)>, FileError>>()?;

        let mut options = CommitOptions::new()
            .with_batch_rows(self.batch_rows.unwrap_or(ctx.config.batch_rows));
        for (name, value) in &self.variables {
            options = options.with_variable(name.clone(), value.clone());
        }
        if let Some(input) = &self.input {
            for (name, values) in files::load_input(input)? {
                options = options.with_input_column(name, values);
            }
        }
        for (file, source) in &sources {
            options = options.with_source(file.clone(), source);
        }

        let cancel = CancelToken::new();
        if let Err(e) = interrupt::cancel_on_interrupt(cancel.clone()) {
            tracing::warn!(error = %e, "Ctrl-C will not cancel this commit");
        }

        let mut progress = BarProgress::new(self.no_progress);
        let report = tree.commit(&mut store, options, &mut progress, &cancel)?;
        progress.0.finish_and_clear();

        tracing::info!(
            committed = report.committed_paths.len(),
            failed = report.failed_paths.len(),
            skipped = report.skipped_paths.len(),
            "commit finished"
        );

        if !self.dry_run {
            files::save_store(&store, &store_path)?;
            files::save_tree(&tree, &self.tree)?;
        }

        Ok(CommitOutput {
            report,
            dry_run: self.dry_run,
        })
    }
}
