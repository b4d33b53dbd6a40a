//! The `relbrew release` pipeline.
//!
//! Stages run strictly in order:
//!
//! 1. determine the version, bump the manifest, add a changelog section;
//! 2. run the test suite;
//! 3. commit, tag and push (skippable as a group);
//! 4. publish to Hackage and hash the published tarball;
//! 5. point the Homebrew formula at the new tarball;
//! 6. build, upload and record a bottle (skippable as a group).
//!
//! Nothing is rolled back: a failing stage stops the stages that depend on
//! it and leaves the effects of earlier ones in place. Every stage ends up in
//! the returned [`ReleaseReport`].

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use miette::Diagnostic;
use thiserror::Error;

use crate::core::bottle::BottleRecord;
use crate::core::changelog::{self, Insertion, CHANGELOG_FILE};
use crate::core::formula::hackage_tarball_url;
use crate::core::manifest::Manifest;
use crate::core::version::increment_version;
use crate::ops::git::{self, RepoSlug};
use crate::ops::hackage;
use crate::ops::hash::{HashResolver, HttpTransport, Sleep};
use crate::ops::homebrew;
use crate::ops::prompt::{Gate, Prompter};
use crate::util::config::Config;
use crate::util::fs::find_file_with_extension;
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

/// Editor used for the changelog when `$EDITOR` is unset.
pub const DEFAULT_EDITOR: &str = "nano";

#[derive(Debug, Error, Diagnostic)]
pub enum ReleaseError {
    #[error("no .cabal file found in {} or its subdirectories", root.display())]
    #[diagnostic(
        code(relbrew::release::manifest_not_found),
        help("run `relbrew release` from the root of a Haskell package")
    )]
    ManifestNotFound { root: PathBuf },

    #[error("tests failed (`{command}`); aborting release")]
    #[diagnostic(
        code(relbrew::release::tests_failed),
        help("fix the test suite, or run interactively to continue past failing tests")
    )]
    TestsFailed { command: String },

    #[error("release aborted: {reason}")]
    #[diagnostic(code(relbrew::release::aborted))]
    Aborted { reason: String },
}

/// Switches for one release run.
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    /// Release this version instead of the suggested increment
    pub version: Option<String>,
    pub skip_git: bool,
    pub skip_hackage: bool,
    pub skip_bottles: bool,
    pub skip_github: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DetermineVersion,
    UpdateManifest,
    UpdateChangelog,
    RunTests,
    Commit,
    Tag,
    Push,
    Publish,
    ResolveHash,
    UpdateFormulaPrimary,
    BuildBottle,
    Upload,
    UpdateFormulaBottle,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DetermineVersion => "version",
            Stage::UpdateManifest => "manifest",
            Stage::UpdateChangelog => "changelog",
            Stage::RunTests => "tests",
            Stage::Commit => "commit",
            Stage::Tag => "tag",
            Stage::Push => "push",
            Stage::Publish => "hackage",
            Stage::ResolveHash => "sha256",
            Stage::UpdateFormulaPrimary => "formula",
            Stage::BuildBottle => "bottle",
            Stage::Upload => "upload",
            Stage::UpdateFormulaBottle => "formula bottle",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Done,
    Skipped(String),
    Failed(String),
}

impl StageOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, StageOutcome::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

/// What happened to each stage of a release.
#[derive(Debug, Clone, Default)]
pub struct ReleaseReport {
    pub version: String,
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl ReleaseReport {
    fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.stages.push((stage, outcome));
    }

    fn skip_all(&mut self, stages: &[Stage], reason: &str) {
        for &stage in stages {
            self.record(stage, StageOutcome::Skipped(reason.to_string()));
        }
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &(Stage, StageOutcome)> {
        self.stages.iter().filter(|(_, outcome)| outcome.is_failed())
    }

    /// Print one status line per stage.
    pub fn print(&self, shell: &Shell) {
        for (stage, outcome) in &self.stages {
            match outcome {
                StageOutcome::Done => shell.status(Status::Finished, stage),
                StageOutcome::Skipped(reason) => {
                    shell.status(Status::Skipped, format!("{} ({})", stage, reason))
                }
                StageOutcome::Failed(reason) => {
                    shell.status(Status::Error, format!("{}: {}", stage, reason))
                }
            }
        }
    }
}

const BOTTLE_STAGES: &[Stage] = &[Stage::BuildBottle, Stage::Upload, Stage::UpdateFormulaBottle];

/// Drives one release of the package at `project_root`.
pub struct ReleasePipeline<'a, T, S> {
    project_root: PathBuf,
    config: &'a Config,
    shell: &'a Shell,
    runner: &'a mut dyn CommandRunner,
    prompter: &'a mut dyn Prompter,
    resolver: HashResolver<T, S>,
    today: NaiveDate,
}

impl<'a, T: HttpTransport, S: Sleep> ReleasePipeline<'a, T, S> {
    pub fn new(
        project_root: impl Into<PathBuf>,
        config: &'a Config,
        shell: &'a Shell,
        runner: &'a mut dyn CommandRunner,
        prompter: &'a mut dyn Prompter,
        resolver: HashResolver<T, S>,
    ) -> Self {
        ReleasePipeline {
            project_root: project_root.into(),
            config,
            shell,
            runner,
            prompter,
            resolver,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Date written into the changelog section.
    pub fn with_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn run(&mut self, options: &ReleaseOptions) -> Result<ReleaseReport> {
        let interactive = self.prompter.is_interactive();
        let mut report = ReleaseReport::default();

        let manifest_path = find_file_with_extension(&self.project_root, "cabal").ok_or_else(|| {
            ReleaseError::ManifestNotFound {
                root: self.project_root.clone(),
            }
        })?;
        let mut manifest = Manifest::read(&manifest_path)?;
        if let Err(e) = manifest.check_complete() {
            tracing::warn!("{}", e);
            self.shell.warn(&e);
        }
        self.shell.note(format!(
            "current version of {}: {}",
            manifest.name(),
            manifest.version()
        ));

        // Version
        let version = self.determine_version(manifest.version(), options)?;
        report.version = version.clone();
        report.record(Stage::DetermineVersion, StageOutcome::Done);
        self.shell.note(format!("preparing release {}", version));

        // Manifest
        manifest.update_version(&version)?;
        if manifest.version() != version {
            return Err(ReleaseError::Aborted {
                reason: format!(
                    "{} has version `{}` after the update, expected `{}`",
                    manifest_path.display(),
                    manifest.version(),
                    version
                ),
            }
            .into());
        }
        self.shell.status(Status::Updated, format!("{} to {}", file_label(&manifest_path), version));
        report.record(Stage::UpdateManifest, StageOutcome::Done);

        // Changelog
        let changelog_path = self.project_root.join(CHANGELOG_FILE);
        let outcome = self.update_changelog(&changelog_path, &version, interactive)?;
        report.record(Stage::UpdateChangelog, outcome);

        // Tests
        let outcome = self.run_tests()?;
        report.record(Stage::RunTests, outcome);

        // Version control
        if options.skip_git {
            report.skip_all(&[Stage::Commit, Stage::Tag, Stage::Push], "--skip-git");
        } else {
            self.version_control(&mut report, &manifest_path, &changelog_path, &version)?;
        }

        // Hackage
        let name = manifest.name().to_string();
        if options.skip_hackage {
            report.record(Stage::Publish, StageOutcome::Skipped("--skip-hackage".to_string()));
        } else {
            let outcome = self.publish(&name, &version, interactive)?;
            let failed = outcome.is_failed();
            report.record(Stage::Publish, outcome);
            if failed {
                report.skip_all(
                    &[Stage::ResolveHash, Stage::UpdateFormulaPrimary],
                    "publish failed",
                );
                report.skip_all(BOTTLE_STAGES, "publish failed");
                return Ok(report);
            }
        }

        let url = hackage_tarball_url(&name, &version);
        let sha256 = match self.resolver.resolve(&url, interactive, self.shell) {
            Ok(hash) => {
                self.shell.note(format!("sha256 {}", hash));
                report.record(Stage::ResolveHash, StageOutcome::Done);
                hash
            }
            Err(e) => {
                self.shell.error(&e);
                report.record(Stage::ResolveHash, StageOutcome::Failed(e.to_string()));
                report.record(
                    Stage::UpdateFormulaPrimary,
                    StageOutcome::Skipped("no sha256".to_string()),
                );
                report.skip_all(BOTTLE_STAGES, "no sha256");
                return Ok(report);
            }
        };

        // Formula
        let Some(tap) = homebrew::find_tap(self.config, &self.project_root, self.prompter, self.shell)?
        else {
            self.shell.warn("no Homebrew tap found; formula not updated");
            report.record(
                Stage::UpdateFormulaPrimary,
                StageOutcome::Skipped("no Homebrew tap found".to_string()),
            );
            report.skip_all(BOTTLE_STAGES, "no Homebrew tap found");
            return Ok(report);
        };
        let formula_path = match self.update_formula(&tap, &name, &version, &sha256) {
            Ok(path) => {
                report.record(Stage::UpdateFormulaPrimary, StageOutcome::Done);
                path
            }
            Err(e) => {
                self.shell.error(format!("{:#}", e));
                report.record(Stage::UpdateFormulaPrimary, StageOutcome::Failed(format!("{:#}", e)));
                report.skip_all(BOTTLE_STAGES, "formula not updated");
                return Ok(report);
            }
        };

        // Bottle
        if options.skip_bottles {
            report.skip_all(BOTTLE_STAGES, "--skip-bottles");
            return Ok(report);
        }
        self.bottle(&mut report, options, &tap, &formula_path, &name, &version, &changelog_path)?;

        Ok(report)
    }

    fn determine_version(&mut self, current: &str, options: &ReleaseOptions) -> Result<String> {
        if let Some(explicit) = options.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            return Ok(explicit.to_string());
        }
        let suggested = increment_version(current);
        let answer = self.prompter.ask("New version:", &suggested)?;
        let answer = answer.trim();
        Ok(if answer.is_empty() { suggested } else { answer.to_string() })
    }

    fn update_changelog(&mut self, path: &Path, version: &str, interactive: bool) -> Result<StageOutcome> {
        if changelog::insert_version(path, version, self.today)? == Insertion::AlreadyPresent {
            return Ok(StageOutcome::Skipped(format!(
                "{} already has a {} section",
                CHANGELOG_FILE, version
            )));
        }
        self.shell.status(Status::Updated, format!("{} with {}", CHANGELOG_FILE, version));

        if interactive {
            let editor = std::env::var("EDITOR")
                .ok()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_EDITOR.to_string());
            match ProcessBuilder::from_command_line(&editor) {
                Ok(Some(cmd)) => {
                    let cmd = cmd.arg(path).cwd(&self.project_root);
                    match self.runner.run(&cmd) {
                        Ok(Some(0)) => {}
                        Ok(code) => self.shell.warn(format!(
                            "editor exited with {:?}; edit {} by hand",
                            code, CHANGELOG_FILE
                        )),
                        Err(e) => self.shell.warn(format!("{:#}", e)),
                    }
                }
                Ok(None) => {}
                Err(e) => self.shell.warn(format!("{:#}; edit {} by hand", e, CHANGELOG_FILE)),
            }
            self.prompter
                .pause("Press Enter when the changelog is ready...")?;
        }
        Ok(StageOutcome::Done)
    }

    fn run_tests(&mut self) -> Result<StageOutcome> {
        let (command, passed) = match ProcessBuilder::from_command_line(&self.config.test_command) {
            Ok(None) => {
                return Ok(StageOutcome::Skipped("no test command configured".to_string()));
            }
            Ok(Some(cmd)) => {
                let cmd = cmd.cwd(&self.project_root);
                let command = cmd.display_command();
                self.shell.status(Status::Testing, &command);
                let passed = match self.runner.run(&cmd) {
                    Ok(code) => code == Some(0),
                    Err(e) => {
                        self.shell.error(format!("{:#}", e));
                        false
                    }
                };
                (command, passed)
            }
            // A command that cannot be parsed counts as a failing suite
            Err(e) => {
                self.shell.error(format!("{:#}", e));
                (self.config.test_command.trim().to_string(), false)
            }
        };
        if passed {
            return Ok(StageOutcome::Done);
        }

        if self
            .prompter
            .confirm(Gate::ContinueAfterTestFailure, "Tests failed. Continue anyway?")?
        {
            self.shell.warn("continuing with failing tests");
            Ok(StageOutcome::Failed(format!("`{}` failed", command)))
        } else {
            Err(ReleaseError::TestsFailed { command }.into())
        }
    }

    fn version_control(
        &mut self,
        report: &mut ReleaseReport,
        manifest_path: &Path,
        changelog_path: &Path,
        version: &str,
    ) -> Result<()> {
        let root = self.project_root.clone();

        // Commit
        let commit = if self.prompter.confirm(Gate::Commit, "Commit version bump and changelog?")? {
            let files = [relative(manifest_path, &root), relative(changelog_path, &root)];
            let message = format!("Bump version to {}", version);
            match git::commit(self.runner, &root, &files, &message) {
                Ok(()) => {
                    self.shell.status(Status::Committed, &message);
                    StageOutcome::Done
                }
                Err(e) => self.failed(e),
            }
        } else {
            self.declined()
        };
        let committed = commit.is_done();
        report.record(Stage::Commit, commit);

        // Tag, independent of the commit: a re-run has nothing left to commit
        let tag = git::tag_name(version);
        let mut force_push_tag = false;
        let tag_outcome = if self.prompter.confirm(Gate::Tag, &format!("Create tag {}?", tag))? {
            let message = format!("Release version {}", version);
            let exists = git::tag_exists(self.runner, &root, &tag);
            if exists
                && !self.prompter.confirm(
                    Gate::RetagExisting,
                    &format!("Tag {} already exists. Update it?", tag),
                )?
            {
                StageOutcome::Skipped(format!("{} already exists", tag))
            } else {
                match git::create_tag(self.runner, &root, &tag, &message, exists) {
                    Ok(()) => {
                        force_push_tag = exists;
                        self.shell.status(Status::Tagged, &tag);
                        StageOutcome::Done
                    }
                    Err(e) => self.failed(e),
                }
            }
        } else {
            self.declined()
        };
        let tagged = tag_outcome.is_done();
        report.record(Stage::Tag, tag_outcome);

        // Push
        let push = if !committed && !tagged {
            StageOutcome::Skipped("nothing to push".to_string())
        } else if self.prompter.confirm(Gate::Push, "Push to origin?")? {
            let tag = tagged.then_some((tag.as_str(), force_push_tag));
            self.push(&root, committed, tag)
        } else {
            self.declined()
        };
        report.record(Stage::Push, push);
        Ok(())
    }

    /// Push the current branch and/or `(tag, force)`.
    ///
    /// Every ref is attempted; the outcome lists each one that was rejected.
    fn push(&mut self, root: &Path, branch: bool, tag: Option<(&str, bool)>) -> StageOutcome {
        let mut refs = Vec::new();
        if branch {
            refs.push((git::current_branch(self.runner, root), false));
        }
        if let Some((tag, force)) = tag {
            refs.push((tag.to_string(), force));
        }

        let mut rejected = Vec::new();
        for (reference, force) in refs {
            match git::push(self.runner, root, &reference, force) {
                Ok(()) => self.shell.status(Status::Pushed, &reference),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    self.shell.error(&reason);
                    rejected.push(reason);
                }
            }
        }

        if rejected.is_empty() {
            StageOutcome::Done
        } else {
            StageOutcome::Failed(rejected.join("; "))
        }
    }

    fn publish(&mut self, name: &str, version: &str, interactive: bool) -> Result<StageOutcome> {
        let tarball = match hackage::build_package(self.runner, &self.project_root, name, version, self.shell) {
            Ok(path) => path,
            Err(e) => return Ok(self.failed(e)),
        };

        if !self.prompter.confirm(
            Gate::Publish,
            &format!("Upload {} to Hackage now?", file_label(&tarball)),
        )? {
            self.shell.note(format!(
                "upload later with `cabal upload --publish {}`",
                tarball.display()
            ));
            return Ok(StageOutcome::Skipped("declined".to_string()));
        }

        // Interactive runs let cabal ask for credentials itself
        let credentials = if interactive {
            None
        } else {
            self.config.hackage_credentials()
        };
        Ok(
            match hackage::upload(self.runner, &self.project_root, &tarball, credentials, self.shell) {
                Ok(()) => StageOutcome::Done,
                Err(e) => self.failed(e),
            },
        )
    }

    fn update_formula(&mut self, tap: &Path, name: &str, version: &str, sha256: &str) -> Result<PathBuf> {
        let formula_path = homebrew::find_formula(tap, name)?.ok_or_else(|| {
            anyhow::anyhow!("formula {}.rb not found in {}", name, tap.display())
        })?;

        homebrew::update_formula_primary(&formula_path, name, version, sha256)?;
        self.shell.status(
            Status::Updated,
            format!("{} to {}", file_label(&formula_path), version),
        );

        let message = format!("Update formula to version {}", version);
        if let Err(e) = homebrew::commit_formula(self.runner, &formula_path, &message, self.prompter, self.shell) {
            self.shell.warn(format!("formula commit failed: {:#}", e));
        }
        Ok(formula_path)
    }

    #[allow(clippy::too_many_arguments)]
    fn bottle(
        &mut self,
        report: &mut ReleaseReport,
        options: &ReleaseOptions,
        tap: &Path,
        formula_path: &Path,
        name: &str,
        version: &str,
        changelog_path: &Path,
    ) -> Result<()> {
        if !self
            .prompter
            .confirm(Gate::BuildBottles, &format!("Build a Homebrew bottle for {}?", version))?
        {
            report.skip_all(BOTTLE_STAGES, "declined");
            return Ok(());
        }

        let slug = git::remote_slug(self.runner, &self.project_root, self.shell);
        let record = match homebrew::build_bottle(self.runner, tap, name, version, &slug, self.shell) {
            Ok(record) => {
                report.record(Stage::BuildBottle, StageOutcome::Done);
                record
            }
            Err(e) => {
                let outcome = self.failed(e);
                report.record(Stage::BuildBottle, outcome);
                report.skip_all(&[Stage::Upload, Stage::UpdateFormulaBottle], "no bottle");
                return Ok(());
            }
        };

        if options.skip_github {
            report.record(Stage::Upload, StageOutcome::Skipped("--skip-github".to_string()));
            report.record(
                Stage::UpdateFormulaBottle,
                StageOutcome::Skipped("bottle not uploaded".to_string()),
            );
            return Ok(());
        }
        if !self.prompter.confirm(
            Gate::Upload,
            &format!("Upload bottle to GitHub release {}?", git::tag_name(version)),
        )? {
            report.record(Stage::Upload, StageOutcome::Skipped("declined".to_string()));
            report.record(
                Stage::UpdateFormulaBottle,
                StageOutcome::Skipped("bottle not uploaded".to_string()),
            );
            return Ok(());
        }

        let latest = changelog::extract_latest(changelog_path)?;
        let notes = if latest.version == version { latest.notes } else { String::new() };
        if let Err(e) = homebrew::upload_bottle(
            self.runner,
            &self.project_root,
            tap,
            &record,
            &notes,
            &self.config.github_token,
            self.shell,
        ) {
            let outcome = self.failed(e);
            report.record(Stage::Upload, outcome);
            report.record(
                Stage::UpdateFormulaBottle,
                StageOutcome::Skipped("bottle not uploaded".to_string()),
            );
            return Ok(());
        }
        report.record(Stage::Upload, StageOutcome::Done);

        let outcome = match self.record_bottle(formula_path, &record, &slug) {
            Ok(()) => StageOutcome::Done,
            Err(e) => self.failed(e),
        };
        report.record(Stage::UpdateFormulaBottle, outcome);
        Ok(())
    }

    fn record_bottle(&mut self, formula_path: &Path, record: &BottleRecord, slug: &RepoSlug) -> Result<()> {
        homebrew::update_formula_bottle(formula_path, record, &slug.release_url(&record.version))?;
        self.shell.status(
            Status::Updated,
            format!("{} bottle for {}", file_label(formula_path), record.tag),
        );

        let message = format!("Add bottle for version {}", record.version);
        if let Err(e) = homebrew::commit_formula(self.runner, formula_path, &message, self.prompter, self.shell) {
            self.shell.warn(format!("formula commit failed: {:#}", e));
        }
        Ok(())
    }

    /// Outcome for a gate that was answered "no".
    fn declined(&self) -> StageOutcome {
        if self.prompter.is_interactive() {
            StageOutcome::Skipped("declined".to_string())
        } else {
            StageOutcome::Skipped("needs confirmation (non-interactive run)".to_string())
        }
    }

    fn failed(&self, e: anyhow::Error) -> StageOutcome {
        let reason = format!("{:#}", e);
        self.shell.error(&reason);
        StageOutcome::Failed(reason)
    }
}

fn relative<'p>(path: &'p Path, root: &Path) -> &'p Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
