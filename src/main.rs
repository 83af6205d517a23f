mod cli;
mod commands;
mod config;
mod deploy;
mod package;
mod paths;
mod service;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::PakdropConfig;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: PakdropConfig,
    pub config_path: PathBuf,
}

fn main() -> Result<()> {
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

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "pakdrop", &mut io::stdout());
        return Ok(());
    }

    let config_path = paths::config_file(cli.config.as_deref())?;
    let config = PakdropConfig::load(&config_path)?;

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config,
        config_path,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Rollback { backup, target } => commands::rollback::run(&ctx, &backup, &target),
        Command::Plan { source } => commands::plan::run(&ctx, &source),
        Command::Deploy(args) => commands::deploy::run(&ctx, args),
        Command::Clean(args) => commands::clean::run(&ctx, args),
        Command::Service(cmd) => commands::service::run(&ctx, cmd),
        Command::Config(cmd) => commands::config::run(&ctx, cmd),
        Command::History { limit } => commands::history::run(&ctx, limit),
        Command::Completions { .. } => Ok(()),
    }
}
