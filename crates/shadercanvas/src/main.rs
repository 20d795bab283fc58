mod cli;
mod config;
mod index;
mod paths;
mod run;

use std::process::ExitCode;

use anyhow::Result;
use cli::Command;
use index::{IndexOutcome, INVALID_DIRECTORY_EXIT};

fn main() -> Result<ExitCode> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Index(args)) => match index::run_index(&args.dir, args.write)? {
            IndexOutcome::Listed => Ok(ExitCode::SUCCESS),
            IndexOutcome::InvalidDirectory => Ok(ExitCode::from(INVALID_DIRECTORY_EXIT)),
        },
        None => run::run(cli.run).map(|()| ExitCode::SUCCESS),
    }
}
