use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pakdrop")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Apply update packages to an installation, with backup and rollback", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/pakdrop/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply an update package to a target directory
    Apply(ApplyArgs),

    /// Replay a backup tree onto a target directory
    Rollback {
        /// Backup directory written by a previous apply
        backup: PathBuf,
        /// Directory to restore
        target: PathBuf,
    },

    /// Show what a package would do, phase by phase
    Plan {
        /// Package directory
        source: PathBuf,
    },

    /// Stop the service, apply a package, clean up and restart
    Deploy(DeployArgs),

    /// Remove everything inside a directory
    Clean(CleanArgs),

    /// Control the service that owns the installation
    #[command(subcommand)]
    Service(ServiceCommand),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show recent deployments
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Package directory
    pub source: PathBuf,

    /// Installation directory to update
    pub target: PathBuf,

    /// Record inverse operations here and roll back on failure
    #[arg(short, long, value_name = "DIR")]
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Package directory or .zip archive
    pub package: PathBuf,

    /// Installation directory (overrides [deploy] target)
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Service to stop and restart (overrides [service] name)
    #[arg(short, long, value_name = "NAME")]
    pub service: Option<String>,

    /// Leave the package in place after a successful deploy
    #[arg(long)]
    pub keep_package: bool,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Directory to empty
    pub dir: PathBuf,

    /// Keep directories with this name and everything below them
    #[arg(short, long, value_name = "NAME")]
    pub exclude: Option<String>,

    /// Also remove the directory itself
    #[arg(long)]
    pub remove_root: bool,
}

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Start a service and wait until it runs
    Start {
        name: String,
        /// Seconds to wait (default: [service] timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Stop a service and wait until it is stopped
    Stop {
        name: String,
        /// Seconds to wait (default: [service] timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show service status
    Status { name: String },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,
}
