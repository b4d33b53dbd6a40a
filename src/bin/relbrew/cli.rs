//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use relbrew::util::shell::ColorChoice;

/// relbrew - release a Haskell package to Hackage and a Homebrew tap
#[derive(Parser)]
#[command(name = "relbrew")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    /// Configuration file to use instead of the global one
    #[arg(long, global = true, value_name = "PATH", env = "RELBREW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the relbrew version
    Version,

    /// Release the package in the current directory
    Release(ReleaseArgs),

    /// Interactively fill in the configuration file
    #[command(name = "config_setup", alias = "config-setup")]
    ConfigSetup,

    /// Print one configuration value
    #[command(name = "config_get", alias = "config-get")]
    ConfigGet(ConfigGetArgs),

    /// Change one configuration value
    #[command(name = "config_set", alias = "config-set")]
    ConfigSet(ConfigSetArgs),
}

#[derive(Args)]
pub struct ReleaseArgs {
    /// Never wait for input; commits, tags and pushes are left to the operator
    #[arg(long)]
    pub non_interactive: bool,

    /// Release this version instead of the next patch version
    #[arg(long = "version", value_name = "VERSION")]
    pub release_version: Option<String>,

    /// Do not commit, tag or push
    #[arg(long)]
    pub skip_git: bool,

    /// Do not build or publish the package on Hackage
    #[arg(long)]
    pub skip_hackage: bool,

    /// Do not build a Homebrew bottle
    #[arg(long)]
    pub skip_bottles: bool,

    /// Do not upload the bottle to a GitHub release
    #[arg(long)]
    pub skip_github: bool,
}

#[derive(Args)]
pub struct ConfigGetArgs {
    /// Configuration key
    pub key: String,
}

#[derive(Args)]
pub struct ConfigSetArgs {
    /// Configuration key
    pub key: String,

    /// New value; lists are comma-separated
    pub value: String,
}
