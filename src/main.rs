use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

mod algorithm;
mod cli;
mod config;
mod driver;
mod error;
mod header;
mod logging;
mod paths;
mod runner;
mod shells;
mod workspace;

use algorithm::manual::Manual;
use cli::{Command, RootArgs};
use driver::RunOptions;

fn main() -> ExitCode {
    let args = RootArgs::parse_from(cli::normalize_single_dash(std::env::args_os()));
    logging::init(args.global.verbosity());

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dwi2response: [ERROR] {err:#}");
            ExitCode::from(error::exit_code(&err))
        }
    }
}

fn run(args: RootArgs) -> Result<()> {
    let config = config::load()?;
    let options = RunOptions::new(&args.global, config);
    let summary = match args.command {
        Command::Manual(manual) => driver::execute(&Manual::new(manual), &options)?,
    };
    if let Some(scratch) = &summary.scratch {
        eprintln!("dwi2response: scratch directory kept at {}", scratch.display());
    }
    if !summary.warnings.is_empty() {
        tracing::debug!(count = summary.warnings.len(), "run finished with warnings");
    }
    Ok(())
}
