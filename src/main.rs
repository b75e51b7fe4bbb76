mod cli;
mod commands;
mod config;
mod progress;
mod specfile;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub url: Option<String>,
    pub token: Option<String>,
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
        url: cli.url,
        token: cli.token,
    };

    match run(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            commands::report(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Validate(args) => commands::cluster::validate(ctx, &args.spec),
        Command::Versions { channel_group } => commands::versions::run(ctx, &channel_group),
        Command::Plan(args) => commands::cluster::plan(ctx, &args.spec),
        Command::Apply { spec, yes } => commands::cluster::apply(ctx, &spec.spec, yes),
        Command::Show(args) => commands::cluster::show(ctx, &args.spec),
        Command::Destroy {
            spec,
            yes,
            no_wait,
            timeout,
        } => commands::cluster::destroy(ctx, &spec.spec, yes, no_wait, timeout),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "rosaform", &mut io::stdout());
            Ok(())
        }
    }
}
