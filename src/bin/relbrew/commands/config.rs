//! `relbrew config_setup`, `config_get` and `config_set` commands

use anyhow::{bail, Result};

use crate::cli::{ConfigGetArgs, ConfigSetArgs};
use relbrew::ops::prompt::{Prompter, TerminalPrompter};
use relbrew::util::config::{mask, Config, KEYS};
use relbrew::util::shell::Status;
use relbrew::util::{GlobalContext, Shell};

/// Keys asked for by `config_setup`, with their prompts.
const SETUP_KEYS: &[(&str, &str)] = &[
    ("hackage_username", "Hackage username"),
    ("hackage_password", "Hackage password"),
    ("github_token", "GitHub token"),
    ("default_formula_template", "Default formula template"),
    ("bottle_platforms", "Bottle platforms (comma-separated)"),
    ("tap_dir", "Homebrew tap directory"),
];

pub fn setup(ctx: &GlobalContext, shell: &Shell) -> Result<()> {
    let mut config = ctx.load_config()?;
    shell.note(format!("configuring {}", ctx.config_path().display()));
    shell.note("press Enter to keep the current value");

    fill_in(&mut config, &mut TerminalPrompter::stdio())?;

    ctx.save_config(&config)?;
    shell.status(Status::Updated, ctx.config_path().display());
    Ok(())
}

/// Ask for each setup key; an empty answer keeps the current value.
fn fill_in(config: &mut Config, prompter: &mut dyn Prompter) -> Result<()> {
    for &(key, label) in SETUP_KEYS {
        let current = config.get(key).unwrap_or_default();
        let shown = mask(key, &current);
        let question = if shown.is_empty() {
            format!("{}:", label)
        } else {
            format!("{} [{}]:", label, shown)
        };

        let answer = prompter.ask(&question, "")?;
        if !answer.trim().is_empty() {
            config.set(key, answer.trim())?;
        }
    }
    Ok(())
}

pub fn get(ctx: &GlobalContext, args: ConfigGetArgs) -> Result<()> {
    let config = ctx.load_config()?;
    match config.get(&args.key) {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => unknown_key(&args.key),
    }
}

pub fn set(ctx: &GlobalContext, shell: &Shell, args: ConfigSetArgs) -> Result<()> {
    let mut config = ctx.load_config()?;
    if !config.set(&args.key, &args.value)? {
        return unknown_key(&args.key);
    }
    ctx.save_config(&config)?;
    shell.status(
        Status::Updated,
        format!("{} = {}", args.key, mask(&args.key, &args.value)),
    );
    Ok(())
}

fn unknown_key(key: &str) -> Result<()> {
    bail!(
        "unknown configuration key `{}` (expected one of: {})",
        key,
        KEYS.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_fill_in_keeps_blank_answers() {
        let mut config = Config::default();
        config.github_token = "ghp_existing".to_string();

        // username, password, token (kept), template (kept), platforms, tap (kept)
        let input = "alice\ns3cret\n\n\narm64_sonoma, x86_64_linux\n\n";
        let mut prompter = TerminalPrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new());
        fill_in(&mut config, &mut prompter).unwrap();

        assert_eq!(config.hackage_username, "alice");
        assert_eq!(config.hackage_password, "s3cret");
        assert_eq!(config.github_token, "ghp_existing");
        assert_eq!(config.default_formula_template, "standard");
        assert_eq!(config.bottle_platforms, vec!["arm64_sonoma", "x86_64_linux"]);
        assert!(config.tap_dir.is_none());
    }
}
