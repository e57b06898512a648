use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::op::{Op, OpContext};
use cli::ops;
use stagetree_cli::Config;

crate::command_enum! {
    (Mirror, ops::Mirror),
    (Show, ops::Show),
    (Validate, ops::Validate),
    (Integrate, ops::Integrate),
    (Commit, ops::Commit),
}

#[derive(Parser, Debug)]
#[command(name = "stagetree", version, about = "Stage, merge and commit edits to hierarchical stores")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the config file
    #[arg(long, global = true, env = "STAGETREE_CONFIG")]
    config: Option<PathBuf>,

    /// Log more (repeat for trace output)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<String> {
    let config = Config::load(cli.config.as_deref())?;
    let ctx = OpContext::new(config, cli.config.clone());
    tracing::debug!(config = ?ctx.config_path, batch_rows = ctx.config.batch_rows, "running command");
    let output = cli.command.execute(&ctx)?;
    Ok(output.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
