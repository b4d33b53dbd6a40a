//! Homebrew tap operations: locating the formula, rewriting it, building a
//! bottle and publishing it on a GitHub release.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::bottle::{self, BottleRecord};
use crate::core::formula;
use crate::ops::git::{self, RepoSlug};
use crate::ops::prompt::{Gate, Prompter};
use crate::util::config::Config;
use crate::util::fs::{expand_home, glob_files, move_file, newest_match, read_to_string, write_if_changed};
use crate::util::hash::sha256_file;
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

/// Directory inside the tap that finished bottles are moved to.
pub const BOTTLES_DIR: &str = "bottles";

/// Places a tap checkout is looked for, in order, after the configured one.
pub fn tap_candidates(project_root: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(parent) = project_root.parent() {
        candidates.push(parent.join("homebrew-tap"));
    }
    candidates.push(expand_home("~/homebrew-tap"));
    candidates.push(expand_home("~/Projects/homebrew-tap"));
    candidates
}

/// Find the tap checkout.
///
/// `tap_dir` from the configuration wins, then the usual locations; an
/// interactive session finally asks for a path.
pub fn find_tap(
    config: &Config,
    project_root: &Path,
    prompter: &mut dyn Prompter,
    shell: &Shell,
) -> Result<Option<PathBuf>> {
    let configured = config.tap_dir.iter().cloned();
    if let Some(dir) = configured
        .chain(tap_candidates(project_root))
        .find(|dir| dir.is_dir())
    {
        tracing::debug!("using tap at {}", dir.display());
        return Ok(Some(dir));
    }

    if prompter.is_interactive() {
        shell.note("Homebrew tap directory not found in the usual locations");
        let answer = prompter.ask("Path to your Homebrew tap:", "")?;
        let dir = expand_home(answer.trim());
        if !answer.trim().is_empty() && dir.is_dir() {
            return Ok(Some(dir));
        }
    }

    Ok(None)
}

/// `Formula/<name>.rb`, or any `<name>.rb` elsewhere in the tap.
pub fn find_formula(tap: &Path, name: &str) -> Result<Option<PathBuf>> {
    let file = format!("{}.rb", name);
    let standard = tap.join("Formula").join(&file);
    if standard.is_file() {
        return Ok(Some(standard));
    }
    Ok(glob_files(tap, &format!("**/{}", file))?.into_iter().next())
}

/// Point the formula at the published tarball.
///
/// Returns whether the file changed.
pub fn update_formula_primary(
    path: &Path,
    package_name: &str,
    version: &str,
    sha256: &str,
) -> Result<bool> {
    let doc = read_to_string(path)?;
    let updated = formula::update_primary(&doc, package_name, version, sha256)
        .with_context(|| format!("failed to update {}", path.display()))?;
    write_if_changed(path, &updated)
}

/// Merge a bottle into the formula's `bottle do` block.
pub fn update_formula_bottle(path: &Path, record: &BottleRecord, root_url: &str) -> Result<bool> {
    let doc = read_to_string(path)?;
    let updated = formula::merge_bottle_block(&doc, record, root_url)
        .with_context(|| format!("failed to add bottle to {}", path.display()))?;
    write_if_changed(path, &updated)
}

/// Commit a formula change in the tap and push it, if the operator agrees.
///
/// Returns whether a commit was made.
pub fn commit_formula(
    runner: &mut dyn CommandRunner,
    formula_path: &Path,
    message: &str,
    prompter: &mut dyn Prompter,
    shell: &Shell,
) -> Result<bool> {
    let dir = formula_path.parent().unwrap_or(Path::new("."));
    if !prompter.confirm(Gate::CommitFormula, &format!("Commit formula change ({})?", message))? {
        shell.status(Status::Skipped, "formula commit");
        return Ok(false);
    }

    let file = formula_path.file_name().map_or(formula_path, Path::new);
    git::commit(runner, dir, &[file], message)?;
    shell.status(Status::Committed, message);

    if prompter.confirm(Gate::Push, "Push formula change?")? {
        let branch = git::current_branch(runner, dir);
        git::push(runner, dir, &branch, false)?;
        shell.status(Status::Pushed, format!("tap {}", branch));
    }
    Ok(true)
}

fn brew(tap: &Path) -> ProcessBuilder {
    ProcessBuilder::new("brew").cwd(tap)
}

/// Build a bottle for `name` from the tap and move it to `<tap>/bottles/`.
pub fn build_bottle(
    runner: &mut dyn CommandRunner,
    tap: &Path,
    name: &str,
    version: &str,
    slug: &RepoSlug,
    shell: &Shell,
) -> Result<BottleRecord> {
    let tap_name = format!("{}/tap", slug.owner);
    let qualified = format!("{}/{}", tap_name, name);

    // Start from a clean install and a tap pointing at this checkout
    for cleanup in [
        brew(tap).args(["uninstall", "--force", name]),
        brew(tap).args(["untap", tap_name.as_str()]),
    ] {
        match runner.output(&cleanup) {
            Ok(out) if out.success() => {}
            Ok(out) => tracing::debug!(
                "`{}` exited with {:?}: {}",
                cleanup.display_command(),
                out.code,
                out.stderr.trim()
            ),
            Err(e) => tracing::debug!("`{}` failed: {:#}", cleanup.display_command(), e),
        }
    }
    let tap_cmd = brew(tap).arg("tap").arg(&tap_name).arg(tap);
    if !runner.succeeds(&tap_cmd) {
        shell.warn(format!("`{}` failed; continuing", tap_cmd.display_command()));
    }

    let spinner = shell.spinner(Status::Building, format!("bottle for {}", qualified));
    runner.run_checked(&brew(tap).args(["install", "--build-bottle", qualified.as_str()]))?;
    runner.run_checked(
        &brew(tap)
            .args(["bottle", "--json"])
            .arg(format!("--root-url={}", slug.release_url(version)))
            .arg(&qualified),
    )?;
    drop(spinner);

    let json_path = newest_match(tap, "*.json")?
        .with_context(|| format!("no bottle JSON written in {}", tap.display()))?;
    let json = read_to_string(&json_path)?;
    let record = bottle::extract(&json, version, tap)?;

    let local = record.local_path(tap);
    let actual = sha256_file(&local)?;
    if actual != record.sha256 {
        shell.warn(format!(
            "sha256 of {} is {}, build output says {}",
            record.local_filename, actual, record.sha256
        ));
    }

    let dest = tap.join(BOTTLES_DIR).join(&record.local_filename);
    move_file(&local, &dest)?;
    shell.status(
        Status::Created,
        format!("bottle {}/{}", BOTTLES_DIR, record.local_filename),
    );
    Ok(record)
}

fn gh(project_root: &Path, token: &str) -> ProcessBuilder {
    let cmd = ProcessBuilder::new("gh").cwd(project_root);
    if token.is_empty() {
        cmd
    } else {
        cmd.env("GH_TOKEN", token)
    }
}

/// Attach a built bottle to the `v<version>` GitHub release.
///
/// The release is created with `notes` when it does not exist yet. The
/// bottle is renamed to the file name the formula's `root_url` expects.
pub fn upload_bottle(
    runner: &mut dyn CommandRunner,
    project_root: &Path,
    tap: &Path,
    record: &BottleRecord,
    notes: &str,
    github_token: &str,
    shell: &Shell,
) -> Result<()> {
    if !runner.succeeds(&gh(project_root, github_token).arg("--version")) {
        bail!("GitHub CLI (`gh`) not found; install it to upload bottles");
    }

    let tag = git::tag_name(&record.version);
    if !runner.succeeds(&gh(project_root, github_token).args(["release", "view", tag.as_str()])) {
        let title = format!("Release {}", tag);
        let notes = if notes.trim().is_empty() {
            format!("Release {} with Homebrew bottle support.", tag)
        } else {
            notes.to_string()
        };
        runner.run_checked(&gh(project_root, github_token).args([
            "release",
            "create",
            tag.as_str(),
            "--title",
            title.as_str(),
            "--notes",
            notes.as_str(),
        ]))?;
        shell.status(Status::Created, format!("GitHub release {}", tag));
    }

    let bottles = tap.join(BOTTLES_DIR);
    let src = bottles.join(&record.local_filename);
    let dst = bottles.join(&record.expected_filename);
    if src != dst {
        move_file(&src, &dst)?;
    }

    let spinner = shell.spinner(Status::Uploading, &record.expected_filename);
    runner.run_checked(
        &gh(project_root, github_token)
            .args(["release", "upload", tag.as_str()])
            .arg(&dst)
            .arg("--clobber"),
    )?;
    drop(spinner);
    shell.status(
        Status::Uploaded,
        format!("{} to release {}", record.expected_filename, tag),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::prompt::NonInteractive;
    use crate::test_support::fixtures::{bottle_json, FORMULA_WITH_BOTTLE, SAMPLE_FORMULA};
    use crate::test_support::{MockExecutor, MockProcessOutput, ScriptedPrompter};
    use tempfile::TempDir;

    fn slug() -> RepoSlug {
        RepoSlug {
            owner: "owner".to_string(),
            repo: "sample-project".to_string(),
        }
    }

    fn record(tap: &Path) -> BottleRecord {
        let local = "sample-project--0.1.3.arm64_sonoma.bottle.tar.gz";
        std::fs::write(tap.join(local), "bottle bytes").unwrap();
        let json = bottle_json("sample-project", "0.1.3", "arm64_sonoma", local);
        bottle::extract(&json, "0.1.3", tap).unwrap()
    }

    #[test]
    fn test_find_tap_prefers_config() {
        let tmp = TempDir::new().unwrap();
        let tap = tmp.path().join("my-tap");
        std::fs::create_dir_all(&tap).unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();

        let config = Config {
            tap_dir: Some(tap.clone()),
            ..Config::default()
        };
        let found = find_tap(&config, &project, &mut NonInteractive, &Shell::quiet()).unwrap();
        assert_eq!(found, Some(tap));
    }

    #[test]
    fn test_find_tap_sibling() {
        let tmp = TempDir::new().unwrap();
        let tap = tmp.path().join("homebrew-tap");
        std::fs::create_dir_all(&tap).unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();

        let found = find_tap(&Config::default(), &project, &mut NonInteractive, &Shell::quiet())
            .unwrap();
        assert_eq!(found, Some(tap));
    }

    #[test]
    fn test_find_tap_asks_interactively() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("nested/project");
        std::fs::create_dir_all(&project).unwrap();
        let tap = tmp.path().join("elsewhere");
        std::fs::create_dir_all(&tap).unwrap();

        let mut prompter = ScriptedPrompter::interactive();
        prompter.answer_input(tap.display().to_string());

        let found = find_tap(&Config::default(), &project, &mut prompter, &Shell::quiet()).unwrap();
        assert_eq!(found, Some(tap));
    }

    #[test]
    fn test_find_formula() {
        let tmp = TempDir::new().unwrap();
        assert!(find_formula(tmp.path(), "foo").unwrap().is_none());

        let nested = tmp.path().join("Casks/extra");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("foo.rb"), "").unwrap();
        assert_eq!(find_formula(tmp.path(), "foo").unwrap(), Some(nested.join("foo.rb")));

        let standard = tmp.path().join("Formula");
        std::fs::create_dir_all(&standard).unwrap();
        std::fs::write(standard.join("foo.rb"), "").unwrap();
        assert_eq!(find_formula(tmp.path(), "foo").unwrap(), Some(standard.join("foo.rb")));
    }

    #[test]
    fn test_update_formula_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sample-project.rb");
        std::fs::write(&path, SAMPLE_FORMULA).unwrap();

        assert!(update_formula_primary(&path, "sample-project", "0.1.3", "deadbeef").unwrap());
        assert!(!update_formula_primary(&path, "sample-project", "0.1.3", "deadbeef").unwrap());

        let rec = record(tmp.path());
        assert!(update_formula_bottle(&path, &rec, &slug().release_url("0.1.3")).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(&format!("arm64_sonoma: \"{}\"", rec.sha256)));
    }

    #[test]
    fn test_update_formula_reports_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.rb");
        std::fs::write(&path, "class Broken < Formula\nend\n").unwrap();

        let err = update_formula_primary(&path, "broken", "1.0.0", "aa").unwrap_err();
        assert!(err.downcast_ref::<formula::FormulaError>().is_some());
    }

    #[test]
    fn test_commit_formula_declined() {
        let mut exec = MockExecutor::new();
        let mut prompter = ScriptedPrompter::interactive();
        prompter.answer(Gate::CommitFormula, false);

        let committed = commit_formula(
            &mut exec,
            Path::new("/tap/Formula/foo.rb"),
            "Update formula to version 1.0.1",
            &mut prompter,
            &Shell::quiet(),
        )
        .unwrap();
        assert!(!committed);
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_commit_formula_non_interactive() {
        let mut exec = MockExecutor::new();
        let mut prompter = ScriptedPrompter::non_interactive();

        let committed = commit_formula(
            &mut exec,
            Path::new("/tap/Formula/foo.rb"),
            "Update formula to version 1.0.1",
            &mut prompter,
            &Shell::quiet(),
        )
        .unwrap();
        assert!(!committed);
        assert_eq!(prompter.questions().len(), 1);
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_commit_formula_confirmed() {
        let mut exec = MockExecutor::new();
        exec.expect(
            "git rev-parse --abbrev-ref HEAD",
            MockProcessOutput::success("master\n"),
        );
        exec.set_default(MockProcessOutput::success(""));

        let committed = commit_formula(
            &mut exec,
            Path::new("/tap/Formula/foo.rb"),
            "Update formula to version 1.0.1",
            &mut ScriptedPrompter::interactive(),
            &Shell::quiet(),
        )
        .unwrap();
        assert!(committed);

        assert_eq!(
            exec.calls(),
            [
                "git add foo.rb",
                "git commit -m Update formula to version 1.0.1",
                "git rev-parse --abbrev-ref HEAD",
                "git push origin master",
            ]
        );
        assert!(exec
            .cwds()
            .iter()
            .all(|c| c.as_deref() == Some(Path::new("/tap/Formula"))));
    }

    #[test]
    fn test_build_bottle() {
        let tmp = TempDir::new().unwrap();
        let tap = tmp.path();
        let local = "sample-project--0.1.3.arm64_sonoma.bottle.1.tar.gz";
        std::fs::write(tap.join(local), "bottle bytes").unwrap();
        std::fs::write(
            tap.join("sample-project.json"),
            bottle_json("sample-project", "0.1.3", "arm64_sonoma", local),
        )
        .unwrap();

        let mut exec = MockExecutor::new();
        // Nothing to clean up on a fresh machine
        exec.expect_contains("--force", MockProcessOutput::failure(1, "No such keg"));
        exec.expect_contains("untap", MockProcessOutput::failure(1, "No available tap"));
        exec.set_default(MockProcessOutput::success(""));

        let rec = build_bottle(&mut exec, tap, "sample-project", "0.1.3", &slug(), &Shell::quiet())
            .unwrap();

        assert_eq!(rec.rebuild, Some(1));
        assert!(!tap.join(local).exists());
        assert!(tap.join(BOTTLES_DIR).join(local).is_file());
        assert!(exec
            .calls()
            .iter()
            .any(|c| c == "brew install --build-bottle owner/tap/sample-project"));
        assert!(exec.calls().iter().any(|c| c
            == "brew bottle --json --root-url=https://github.com/owner/sample-project/releases/download/v0.1.3 owner/tap/sample-project"));
    }

    #[test]
    fn test_build_bottle_install_failure() {
        let tmp = TempDir::new().unwrap();
        let mut exec = MockExecutor::new();
        exec.expect_prefix("brew install", MockProcessOutput::failure(1, "build failed"));
        exec.set_default(MockProcessOutput::success(""));

        let err = build_bottle(
            &mut exec,
            tmp.path(),
            "sample-project",
            "0.1.3",
            &slug(),
            &Shell::quiet(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("brew install"));
        assert!(!exec.calls().iter().any(|c| c.starts_with("brew bottle")));
    }

    #[test]
    fn test_upload_bottle_creates_release() {
        let tmp = TempDir::new().unwrap();
        let tap = tmp.path();
        let rec = record(tap);
        std::fs::create_dir_all(tap.join(BOTTLES_DIR)).unwrap();
        std::fs::rename(tap.join(&rec.local_filename), rec.local_path(&tap.join(BOTTLES_DIR)))
            .unwrap();

        let mut exec = MockExecutor::new();
        exec.expect_prefix("gh release view", MockProcessOutput::failure(1, "release not found"));
        exec.set_default(MockProcessOutput::success(""));

        upload_bottle(
            &mut exec,
            Path::new("/project"),
            tap,
            &rec,
            "- Faster startup",
            "ghp_token",
            &Shell::quiet(),
        )
        .unwrap();

        let dst = tap.join(BOTTLES_DIR).join(&rec.expected_filename);
        assert!(dst.is_file());
        let calls = exec.calls();
        assert_eq!(calls[0], "gh --version");
        assert_eq!(calls[1], "gh release view v0.1.3");
        assert_eq!(
            calls[2],
            "gh release create v0.1.3 --title Release v0.1.3 --notes - Faster startup"
        );
        assert_eq!(
            calls[3],
            format!("gh release upload v0.1.3 {} --clobber", dst.display())
        );
    }

    #[test]
    fn test_upload_bottle_requires_gh() {
        let tmp = TempDir::new().unwrap();
        let rec = record(tmp.path());
        let mut exec = MockExecutor::new();
        exec.expect("gh --version", MockProcessOutput::failure(127, "not found"));

        let err = upload_bottle(&mut exec, tmp.path(), tmp.path(), &rec, "", "", &Shell::quiet())
            .unwrap_err();
        assert!(err.to_string().contains("gh"));
        assert_eq!(exec.calls().len(), 1);
    }

    #[test]
    fn test_merge_into_existing_block_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sample-project.rb");
        std::fs::write(&path, FORMULA_WITH_BOTTLE).unwrap();
        let rec = record(tmp.path());

        update_formula_bottle(&path, &rec, &slug().release_url("0.1.3")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("bottle do").count(), 1);
        assert!(content.contains("releases/download/v0.1.3"));
    }
}
