//! relbrew CLI - release Haskell packages to Hackage and Homebrew

use anyhow::Result;
use clap::Parser;
use miette::Diagnostic;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use relbrew::core::bottle::BottleError;
use relbrew::core::formula::FormulaError;
use relbrew::core::manifest::ManifestError;
use relbrew::ops::hash::HashError;
use relbrew::ops::release::ReleaseError;
use relbrew::util::{GlobalContext, Shell};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        if let Some(help) = help_for(&e) {
            eprintln!("help: {}", help);
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("relbrew=debug")
    } else {
        EnvFilter::new("relbrew=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let shell = Shell::from_flags(cli.quiet, cli.verbose, cli.color);
    let ctx = GlobalContext::new(cli.config)?;

    match cli.command {
        Commands::Version => commands::version::execute(),
        Commands::Release(args) => commands::release::execute(&ctx, &shell, args),
        Commands::ConfigSetup => commands::config::setup(&ctx, &shell),
        Commands::ConfigGet(args) => commands::config::get(&ctx, args),
        Commands::ConfigSet(args) => commands::config::set(&ctx, &shell, args),
    }
}

/// The `help` line of the first diagnostic in the error chain.
fn help_for(e: &anyhow::Error) -> Option<String> {
    e.chain().find_map(|cause| {
        let diagnostic: &dyn Diagnostic = if let Some(d) = cause.downcast_ref::<ReleaseError>() {
            d
        } else if let Some(d) = cause.downcast_ref::<ManifestError>() {
            d
        } else if let Some(d) = cause.downcast_ref::<FormulaError>() {
            d
        } else if let Some(d) = cause.downcast_ref::<BottleError>() {
            d
        } else if let Some(d) = cause.downcast_ref::<HashError>() {
            d
        } else {
            return None;
        };
        diagnostic.help().map(|h| h.to_string())
    })
}
