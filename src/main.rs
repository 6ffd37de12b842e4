mod cli;
mod commands;
mod config;
mod source;
mod transport;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Overrides;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code for failures detected before anything was changed remotely
const EXIT_PRE_FLIGHT: u8 = 2;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub project: Option<PathBuf>,
    pub overrides: Overrides,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        project: cli.project,
        overrides: Overrides {
            host: cli.host,
            user: cli.user,
        },
    };

    match run(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Show(args) => commands::show::run(ctx, args),
        Command::Plan(args) => commands::plan::run(ctx, args),
        Command::Apply(args) => commands::apply::run(ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "dbtopo", &mut io::stdout());
            Ok(())
        }
    }
}

fn report(error: &anyhow::Error) -> ExitCode {
    ui::error(&format!("{error:#}"));

    match error.downcast_ref::<reconcile::Error>() {
        Some(e) => {
            let category = e.category();
            eprintln!("  {}", category.description());
            eprintln!("  {}", category.advice());
            if category.is_pre_flight() {
                ExitCode::from(EXIT_PRE_FLIGHT)
            } else {
                ExitCode::FAILURE
            }
        }
        None => ExitCode::FAILURE,
    }
}
