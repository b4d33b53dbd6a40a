//! Version control through the `git` CLI.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::core::formula::release_root_url;
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::Shell;

static GITHUB_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").expect("valid regex")
});

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_REMOTE: &str = "origin";

/// `owner/repo` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    /// Placeholder used when the remote cannot be read.
    pub fn fallback() -> Self {
        RepoSlug {
            owner: "user".to_string(),
            repo: "repo".to_string(),
        }
    }

    /// Parse an SSH or HTTPS GitHub remote URL.
    pub fn from_remote_url(url: &str) -> Option<Self> {
        let caps = GITHUB_REMOTE.captures(url.trim())?;
        Some(RepoSlug {
            owner: caps[1].to_string(),
            repo: caps[2].to_string(),
        })
    }

    /// Download root of the `v<version>` release.
    pub fn release_url(&self, version: &str) -> String {
        release_root_url(&self.owner, &self.repo, version)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Tag name for a release.
pub fn tag_name(version: &str) -> String {
    format!("v{}", version)
}

fn git(dir: &Path) -> ProcessBuilder {
    ProcessBuilder::new("git").cwd(dir)
}

/// Slug of the `origin` remote, or [`RepoSlug::fallback`] with a warning.
pub fn remote_slug(runner: &mut dyn CommandRunner, dir: &Path, shell: &Shell) -> RepoSlug {
    let cmd = git(dir).args(["remote", "get-url", DEFAULT_REMOTE]);
    let slug = match runner.output(&cmd) {
        Ok(out) if out.success() => RepoSlug::from_remote_url(&out.stdout),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("{:#}", e);
            None
        }
    };
    slug.unwrap_or_else(|| {
        let fallback = RepoSlug::fallback();
        shell.warn(format!(
            "could not determine the GitHub repository; using {}",
            fallback
        ));
        fallback
    })
}

/// The checked-out branch, falling back to [`DEFAULT_BRANCH`].
pub fn current_branch(runner: &mut dyn CommandRunner, dir: &Path) -> String {
    let cmd = git(dir).args(["rev-parse", "--abbrev-ref", "HEAD"]);
    match runner.output(&cmd) {
        Ok(out) if out.success() => {
            let branch = out.stdout.trim();
            if branch.is_empty() || branch == "HEAD" {
                DEFAULT_BRANCH.to_string()
            } else {
                branch.to_string()
            }
        }
        _ => DEFAULT_BRANCH.to_string(),
    }
}

/// Stage `paths` and commit them.
pub fn commit(
    runner: &mut dyn CommandRunner,
    dir: &Path,
    paths: &[&Path],
    message: &str,
) -> Result<()> {
    runner.run_checked(&git(dir).arg("add").args(paths.iter().map(|p| p.as_os_str())))?;
    runner.run_checked(&git(dir).args(["commit", "-m", message]))
}

pub fn tag_exists(runner: &mut dyn CommandRunner, dir: &Path, tag: &str) -> bool {
    let reference = format!("refs/tags/{}", tag);
    runner.succeeds(&git(dir).args(["rev-parse", "--verify", "--quiet", reference.as_str()]))
}

/// Create an annotated tag; `force` moves an existing one.
pub fn create_tag(
    runner: &mut dyn CommandRunner,
    dir: &Path,
    tag: &str,
    message: &str,
    force: bool,
) -> Result<()> {
    let flag = if force { "-fa" } else { "-a" };
    runner.run_checked(&git(dir).args(["tag", flag, tag, "-m", message]))
}

/// Push `refspec` (a branch or tag) to `origin`.
pub fn push(
    runner: &mut dyn CommandRunner,
    dir: &Path,
    refspec: &str,
    force: bool,
) -> Result<()> {
    let mut cmd = git(dir).arg("push");
    if force {
        cmd = cmd.arg("--force");
    }
    runner.run_checked(&cmd.args([DEFAULT_REMOTE, refspec]))
}
