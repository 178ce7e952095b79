mod cli;
mod commands;
mod config;
mod engine;
mod manifest;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Options shared by every command
pub struct Globals {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
    pub manifest: PathBuf,
    pub state: Option<PathBuf>,
}

fn log_level(verbose: u8, quiet: bool) -> log::LevelFilter {
    if quiet {
        return log::LevelFilter::Error;
    }
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG, when set, refines the level picked by -v/-q
    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose, cli.quiet))
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let globals = Globals {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        manifest: cli.manifest,
        state: cli.state,
    };
    log::trace!("verbosity {}", globals.verbose);

    match run(cli.command, &globals) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, globals: &Globals) -> Result<()> {
    match command {
        Command::Refresh => commands::refresh::run(globals),
        Command::Plan(args) => commands::plan::run(globals, args.target.as_deref()),
        Command::Apply(args) => commands::apply::apply(globals, &args),
        Command::Destroy(args) => commands::apply::destroy(globals, &args),
        Command::Import { address, id } => commands::import::run(globals, &address, &id),
        Command::Show { target } => commands::show::run(globals, target.as_deref()),
        Command::Validate => commands::validate::run(globals),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ytconverge", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level(0, false), log::LevelFilter::Warn);
        assert_eq!(log_level(2, false), log::LevelFilter::Debug);
        assert_eq!(log_level(7, false), log::LevelFilter::Trace);
        assert_eq!(log_level(3, true), log::LevelFilter::Error);
    }
}
