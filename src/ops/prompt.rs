//! Operator confirmation.
//!
//! Every question the release asks goes through a [`Prompter`]. A terminal
//! session reads answers from stdin; a non-interactive run answers each
//! [`Gate`] with a fixed value.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

/// The decisions a release may need from the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    /// Carry on with publishing even though the test suite failed
    ContinueAfterTestFailure,
    Commit,
    Tag,
    /// Move an existing tag to the new commit
    RetagExisting,
    Push,
    Publish,
    /// Commit and push a formula change in the tap
    CommitFormula,
    BuildBottles,
    Upload,
}

impl Gate {
    /// Answer suggested at the prompt.
    pub fn default_answer(self) -> bool {
        !matches!(self, Gate::ContinueAfterTestFailure | Gate::RetagExisting)
    }

    /// Answer used when nobody is asked. Commits, tags and pushes, in the
    /// project and in the tap, always need an operator.
    pub fn unattended_answer(self) -> bool {
        match self {
            Gate::Commit | Gate::Tag | Gate::Push | Gate::CommitFormula => false,
            gate => gate.default_answer(),
        }
    }
}

/// Source of operator decisions.
pub trait Prompter {
    fn is_interactive(&self) -> bool;

    /// Yes/no question for `gate`.
    fn confirm(&mut self, gate: Gate, question: &str) -> Result<bool>;

    /// Free-form answer; an empty answer selects `default`.
    fn ask(&mut self, question: &str, default: &str) -> Result<String>;

    /// Block until the operator is ready to continue.
    fn pause(&mut self, message: &str) -> Result<()>;
}

/// Fixed answers, for `--non-interactive` runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn confirm(&mut self, gate: Gate, question: &str) -> Result<bool> {
        let answer = gate.unattended_answer();
        tracing::debug!("{} -> {} (non-interactive)", question, answer);
        Ok(answer)
    }

    fn ask(&mut self, _question: &str, default: &str) -> Result<String> {
        Ok(default.to_string())
    }

    fn pause(&mut self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Line-based prompts on a reader/writer pair.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompter<io::StdinLock<'static>, io::Stderr> {
    /// Questions on stderr, answers from stdin.
    pub fn stdio() -> Self {
        TerminalPrompter::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        TerminalPrompter { input, output }
    }

    /// Print `prompt` and read one trimmed line. `None` at end of input.
    fn read_answer(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{} ", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read answer")?;
        if read == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn is_interactive(&self) -> bool {
        true
    }

    fn confirm(&mut self, gate: Gate, question: &str) -> Result<bool> {
        let default = gate.default_answer();
        let hint = if default { "[Y/n]" } else { "[y/N]" };

        loop {
            let Some(answer) = self.read_answer(&format!("{} {}", question, hint))? else {
                return Ok(default);
            };
            match answer.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "Please answer yes or no.")?,
            }
        }
    }

    fn ask(&mut self, question: &str, default: &str) -> Result<String> {
        let prompt = if default.is_empty() {
            question.to_string()
        } else {
            format!("{} [{}]", question, default)
        };
        Ok(match self.read_answer(&prompt)? {
            Some(answer) if !answer.is_empty() => answer,
            _ => default.to_string(),
        })
    }

    fn pause(&mut self, message: &str) -> Result<()> {
        self.read_answer(message)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn terminal(input: &str) -> TerminalPrompter<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalPrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_default_answers() {
        assert!(Gate::Commit.default_answer());
        assert!(Gate::Publish.default_answer());
        assert!(!Gate::ContinueAfterTestFailure.default_answer());
        assert!(!Gate::RetagExisting.default_answer());
    }

    #[test]
    fn test_non_interactive() {
        let mut p = NonInteractive;
        assert!(!p.is_interactive());
        assert!(p.confirm(Gate::Upload, "Upload?").unwrap());
        assert!(!p.confirm(Gate::ContinueAfterTestFailure, "Continue?").unwrap());
        assert_eq!(p.ask("Version?", "1.0.1").unwrap(), "1.0.1");
    }

    #[test]
    fn test_non_interactive_leaves_version_control_alone() {
        let mut p = NonInteractive;
        for gate in [Gate::Commit, Gate::Tag, Gate::Push, Gate::CommitFormula] {
            assert!(gate.default_answer(), "{:?}", gate);
            assert!(!p.confirm(gate, "?").unwrap(), "{:?}", gate);
        }
        assert!(p.confirm(Gate::Publish, "Publish?").unwrap());
        assert!(p.confirm(Gate::BuildBottles, "Build?").unwrap());
    }

    #[test]
    fn test_confirm_answers() {
        let mut p = terminal("y\nNO\n\n");
        assert!(p.confirm(Gate::RetagExisting, "Retag?").unwrap());
        assert!(!p.confirm(Gate::Commit, "Commit?").unwrap());
        // Empty line takes the gate's default
        assert!(p.confirm(Gate::Push, "Push?").unwrap());
    }

    #[test]
    fn test_confirm_reprompts() {
        let mut p = terminal("maybe\nyes\n");
        assert!(p.confirm(Gate::Tag, "Tag?").unwrap());
        let output = String::from_utf8(p.output.clone()).unwrap();
        assert!(output.contains("Please answer yes or no."));
        assert_eq!(output.matches("Tag? [Y/n]").count(), 2);
    }

    #[test]
    fn test_confirm_eof_uses_default() {
        let mut p = terminal("");
        assert!(!p.confirm(Gate::ContinueAfterTestFailure, "Continue?").unwrap());
    }

    #[test]
    fn test_ask() {
        let mut p = terminal("2.0.0\n\n");
        assert_eq!(p.ask("Version?", "1.0.1").unwrap(), "2.0.0");
        assert_eq!(p.ask("Version?", "1.0.1").unwrap(), "1.0.1");
        assert_eq!(p.ask("Version?", "1.0.1").unwrap(), "1.0.1");
    }
}
