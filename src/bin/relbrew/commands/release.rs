//! `relbrew release` command

use anyhow::Result;

use crate::cli::ReleaseArgs;
use relbrew::ops::hash::{thread_sleep, HashResolver, ReqwestTransport};
use relbrew::ops::prompt::{NonInteractive, Prompter, TerminalPrompter};
use relbrew::ops::release::{ReleaseOptions, ReleasePipeline};
use relbrew::util::process::{find_executable, SystemRunner};
use relbrew::util::shell::Status;
use relbrew::util::{GlobalContext, Shell};

pub fn execute(ctx: &GlobalContext, shell: &Shell, args: ReleaseArgs) -> Result<()> {
    let config = ctx.load_config()?;
    preflight(shell, &args);

    let options = ReleaseOptions {
        version: args.release_version,
        skip_git: args.skip_git,
        skip_hackage: args.skip_hackage,
        skip_bottles: args.skip_bottles,
        skip_github: args.skip_github,
    };

    let mut prompter: Box<dyn Prompter> = if args.non_interactive {
        Box::new(NonInteractive)
    } else {
        Box::new(TerminalPrompter::stdio())
    };
    let mut runner = SystemRunner;
    let resolver = HashResolver::new(ReqwestTransport::new()?, thread_sleep).with_config(&config);

    let report = ReleasePipeline::new(
        ctx.cwd(),
        &config,
        shell,
        &mut runner,
        prompter.as_mut(),
        resolver,
    )
    .run(&options)?;

    report.print(shell);
    let failures = report.failures().count();
    if failures == 0 {
        shell.status(Status::Finished, format!("release {}", report.version));
    } else {
        shell.warn(format!(
            "release {} finished with {} failed stage{}",
            report.version,
            failures,
            if failures == 1 { "" } else { "s" }
        ));
    }
    Ok(())
}

/// Warn early about tools the selected stages will need.
fn preflight(shell: &Shell, args: &ReleaseArgs) {
    let mut tools = vec!["cabal"];
    if !args.skip_git {
        tools.push("git");
    }
    if !args.skip_bottles {
        tools.push("brew");
        if !args.skip_github {
            tools.push("gh");
        }
    }
    for tool in tools {
        match find_executable(tool) {
            Some(path) => tracing::debug!("found {} at {}", tool, path.display()),
            None => shell.warn(format!("`{}` not found on PATH", tool)),
        }
    }
}
