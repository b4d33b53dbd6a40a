//! Subprocess execution utilities.
//!
//! Every external collaborator (cabal, git, brew, gh, the editor) is invoked
//! through a [`CommandRunner`]. Commands carry their own working directory,
//! so the process-wide current directory is never changed.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use thiserror::Error;

/// A shelled-out collaborator exited unsuccessfully.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("`{command}` failed with exit code {}", exit_code(.code))]
    Failed { command: String, code: Option<i32> },
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    /// Argument values hidden from [`ProcessBuilder::display_command`]
    masked: Vec<String>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            masked: Vec::new(),
        }
    }

    /// Build from a shell-style command line such as
    /// `cabal test --test-options='-p foo'`.
    ///
    /// Returns `Ok(None)` for an empty command line and an error when the
    /// quoting is unbalanced.
    pub fn from_command_line(line: &str) -> Result<Option<Self>> {
        let words = shlex::split(line)
            .with_context(|| format!("invalid quoting in command `{}`", line.trim()))?;
        let mut words = words.into_iter();
        Ok(words
            .next()
            .map(|program| ProcessBuilder::new(program).args(words)))
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Hide an argument value (a password, say) when the command is displayed.
    pub fn mask(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.masked.push(secret);
        }
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory, if one was set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Display the command for messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|arg| {
            if self.masked.contains(arg) {
                "********".to_string()
            } else {
                arg.clone()
            }
        }));
        parts.join(" ")
    }
}

/// Result of running a command with captured output.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes external commands.
pub trait CommandRunner {
    /// Run with inherited stdio so the operator sees (and can answer) the
    /// tool directly. Returns the exit code.
    fn run(&mut self, cmd: &ProcessBuilder) -> Result<Option<i32>>;

    /// Run with captured stdout/stderr.
    fn output(&mut self, cmd: &ProcessBuilder) -> Result<CommandOutput>;

    /// Run and turn a non-zero exit into [`CommandError::Failed`].
    fn run_checked(&mut self, cmd: &ProcessBuilder) -> Result<()> {
        let code = self.run(cmd)?;
        if code != Some(0) {
            return Err(CommandError::Failed {
                command: cmd.display_command(),
                code,
            }
            .into());
        }
        Ok(())
    }

    /// Run and report only whether the command succeeded. Spawn failures
    /// count as unsuccessful.
    fn succeeds(&mut self, cmd: &ProcessBuilder) -> bool {
        match self.output(cmd) {
            Ok(out) => out.success(),
            Err(e) => {
                tracing::debug!("{:#}", e);
                false
            }
        }
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, cmd: &ProcessBuilder) -> Result<Option<i32>> {
        tracing::debug!("running `{}`", cmd.display_command());
        let status = cmd
            .build_command()
            .status()
            .with_context(|| format!("failed to execute `{}`", cmd.program.display()))?;
        Ok(status.code())
    }

    fn output(&mut self, cmd: &ProcessBuilder) -> Result<CommandOutput> {
        tracing::debug!("running `{}` (captured)", cmd.display_command());
        let output = cmd
            .build_command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn `{}`", cmd.program.display()))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
