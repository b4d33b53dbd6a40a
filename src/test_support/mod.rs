//! Test utilities and mocks for relbrew unit tests.
//!
//! The release touches `cabal`, `git`, `brew`, `gh`, Hackage over HTTP and
//! an operator at a terminal. Each has a mock here so the pipeline can be
//! driven end to end without any of them.
//!
//! # Example
//!
//! ```rust,ignore
//! use relbrew::test_support::{MockExecutor, MockProcessOutput};
//!
//! #[test]
//! fn test_example() {
//!     let mut exec = MockExecutor::new();
//!     exec.expect("git rev-parse --abbrev-ref HEAD", MockProcessOutput::success("main\n"));
//!     exec.set_default(MockProcessOutput::success(""));
//!
//!     // Pass `&mut exec` wherever a `&mut dyn CommandRunner` is expected...
//! }
//! ```

pub mod fixtures;

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::ops::hash::{HttpResponse, HttpTransport};
use crate::ops::prompt::{Gate, Prompter};
use crate::util::process::{CommandOutput, CommandRunner, ProcessBuilder};

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    fn to_command_output(&self) -> CommandOutput {
        CommandOutput {
            code: Some(self.status),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in MockExecutor.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on the displayed command line.
    Exact(String),
    StartsWith(String),
    Contains(String),
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s.as_str()),
            CommandPattern::Contains(s) => cmd.contains(s.as_str()),
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    pub pattern: CommandPattern,
    pub output: MockProcessOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    pub used: usize,
}

impl CommandExpectation {
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
        }
    }

    /// Limit how many calls this expectation answers.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    pub fn available(&self) -> bool {
        self.times.map_or(true, |n| self.used < n)
    }
}

/// Mock [`CommandRunner`].
///
/// Commands are matched on [`ProcessBuilder::display_command`], first
/// against the expectations in the order they were added, then the
/// default. A command nothing matches is an error.
#[derive(Debug, Default)]
pub struct MockExecutor {
    expectations: Vec<CommandExpectation>,
    calls: Vec<String>,
    cwds: Vec<Option<PathBuf>>,
    default_output: Option<MockProcessOutput>,
}

impl MockExecutor {
    pub fn new() -> Self {
        MockExecutor::default()
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&mut self, cmd: &str, output: MockProcessOutput) -> &mut Self {
        self.expectations.push(CommandExpectation::new(
            CommandPattern::Exact(cmd.to_string()),
            output,
        ));
        self
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&mut self, prefix: &str, output: MockProcessOutput) -> &mut Self {
        self.expectations.push(CommandExpectation::new(
            CommandPattern::StartsWith(prefix.to_string()),
            output,
        ));
        self
    }

    pub fn expect_contains(&mut self, substring: &str, output: MockProcessOutput) -> &mut Self {
        self.expectations.push(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            output,
        ));
        self
    }

    pub fn expect_pattern(&mut self, expectation: CommandExpectation) -> &mut Self {
        self.expectations.push(expectation);
        self
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&mut self, output: MockProcessOutput) -> &mut Self {
        self.default_output = Some(output);
        self
    }

    /// Commands run so far, as displayed.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Working directory of each call, parallel to [`calls`](Self::calls).
    pub fn cwds(&self) -> &[Option<PathBuf>] {
        &self.cwds
    }

    /// Verify that every expectation with a call count was used exactly
    /// that often.
    pub fn verify(&self) -> Result<()> {
        for (i, exp) in self.expectations.iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    bail!(
                        "expectation {} was used {} times, expected {}",
                        i,
                        exp.used,
                        expected
                    );
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, cmd: &ProcessBuilder) -> Result<MockProcessOutput> {
        let full_cmd = cmd.display_command();
        self.calls.push(full_cmd.clone());
        self.cwds.push(cmd.get_cwd().map(|p| p.to_path_buf()));

        for exp in &mut self.expectations {
            if exp.available() && exp.pattern.matches(&full_cmd) {
                exp.used += 1;
                return Ok(exp.output.clone());
            }
        }

        if let Some(ref default) = self.default_output {
            return Ok(default.clone());
        }

        bail!("unexpected command: {}", full_cmd)
    }
}

impl CommandRunner for MockExecutor {
    fn run(&mut self, cmd: &ProcessBuilder) -> Result<Option<i32>> {
        Ok(Some(self.dispatch(cmd)?.status))
    }

    fn output(&mut self, cmd: &ProcessBuilder) -> Result<CommandOutput> {
        Ok(self.dispatch(cmd)?.to_command_output())
    }
}

/// Mock HTTP response.
#[derive(Debug, Clone)]
pub struct MockHttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl MockHttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        MockHttpResponse {
            status: 200,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        MockHttpResponse {
            status: 404,
            body: b"Not Found".to_vec(),
        }
    }

    pub fn server_error(message: &str) -> Self {
        MockHttpResponse {
            status: 500,
            body: message.as_bytes().to_vec(),
        }
    }
}

/// Mock [`HttpTransport`].
///
/// Queued replies are consumed first, one per request. After that a URL is
/// answered by an exact mock, then a prefix mock, then the default.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    queue: VecDeque<Result<MockHttpResponse, String>>,
    responses: HashMap<String, MockHttpResponse>,
    requests: Vec<String>,
    default_response: Option<MockHttpResponse>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        MockHttpClient::default()
    }

    /// Add a response for a URL (or URL prefix).
    pub fn mock_url(&mut self, url: &str, response: MockHttpResponse) -> &mut Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Set a default response for unmatched URLs.
    pub fn set_default(&mut self, response: MockHttpResponse) -> &mut Self {
        self.default_response = Some(response);
        self
    }

    /// Answer the next request with `response`.
    pub fn enqueue(&mut self, response: MockHttpResponse) -> &mut Self {
        self.queue.push_back(Ok(response));
        self
    }

    /// Fail the next request at the transport level.
    pub fn enqueue_error(&mut self, message: &str) -> &mut Self {
        self.queue.push_back(Err(message.to_string()));
        self
    }

    /// URLs requested so far.
    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    fn lookup(&self, url: &str) -> Option<&MockHttpResponse> {
        self.responses
            .get(url)
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|(pattern, _)| url.starts_with(pattern.as_str()))
                    .map(|(_, response)| response)
            })
            .or(self.default_response.as_ref())
    }
}

impl HttpTransport for MockHttpClient {
    fn get(&mut self, url: &str) -> Result<HttpResponse> {
        self.requests.push(url.to_string());

        let response = match self.queue.pop_front() {
            Some(Ok(response)) => response,
            Some(Err(message)) => bail!("request to {} failed: {}", url, message),
            None => match self.lookup(url) {
                Some(response) => response.clone(),
                None => bail!("no mock response for URL: {}", url),
            },
        };
        Ok(HttpResponse {
            status: response.status,
            body: response.body,
        })
    }
}

/// [`Prompter`] with scripted answers.
///
/// Confirmations take the next answer queued for their gate and otherwise
/// the gate's default. Free-form questions take the next queued input and
/// otherwise their default.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    interactive: bool,
    answers: HashMap<Gate, VecDeque<bool>>,
    inputs: VecDeque<String>,
    questions: Vec<String>,
    pauses: usize,
}

impl ScriptedPrompter {
    pub fn interactive() -> Self {
        ScriptedPrompter {
            interactive: true,
            ..ScriptedPrompter::default()
        }
    }

    pub fn non_interactive() -> Self {
        ScriptedPrompter::default()
    }

    pub fn answer(&mut self, gate: Gate, answer: bool) -> &mut Self {
        self.answers.entry(gate).or_default().push_back(answer);
        self
    }

    pub fn answer_input(&mut self, input: impl Into<String>) -> &mut Self {
        self.inputs.push_back(input.into());
        self
    }

    /// Every question asked, in order.
    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn pauses(&self) -> usize {
        self.pauses
    }
}

impl Prompter for ScriptedPrompter {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&mut self, gate: Gate, question: &str) -> Result<bool> {
        self.questions.push(question.to_string());
        Ok(self
            .answers
            .get_mut(&gate)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                if self.interactive {
                    gate.default_answer()
                } else {
                    gate.unattended_answer()
                }
            }))
    }

    fn ask(&mut self, question: &str, default: &str) -> Result<String> {
        self.questions.push(format!("{} [{}]", question, default));
        Ok(self
            .inputs
            .pop_front()
            .filter(|input| !input.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    fn pause(&mut self, message: &str) -> Result<()> {
        self.questions.push(message.to_string());
        self.pauses += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_executor_matching() {
        let mut exec = MockExecutor::new();
        exec.expect("git --version", MockProcessOutput::success("git version 2.44.0"));
        exec.expect_prefix("git push", MockProcessOutput::failure(1, "rejected"));

        let out = exec.output(&ProcessBuilder::new("git").arg("--version")).unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("2.44.0"));

        let push = ProcessBuilder::new("git").args(["push", "origin", "main"]).cwd("/work");
        assert_eq!(exec.run(&push).unwrap(), Some(1));
        assert!(exec.run_checked(&push).is_err());

        assert!(exec.output(&ProcessBuilder::new("brew")).is_err());
        assert_eq!(exec.calls().len(), 4);
        assert_eq!(exec.cwds()[1].as_deref(), Some(std::path::Path::new("/work")));
    }

    #[test]
    fn test_mock_executor_times() {
        let mut exec = MockExecutor::new();
        exec.expect_pattern(
            CommandExpectation::new(
                CommandPattern::Contains("sdist".to_string()),
                MockProcessOutput::failure(1, "first try"),
            )
            .times(1),
        );
        exec.set_default(MockProcessOutput::success(""));

        let sdist = ProcessBuilder::new("cabal").arg("sdist");
        assert!(!exec.succeeds(&sdist));
        assert!(exec.succeeds(&sdist));
        exec.verify().unwrap();
    }

    #[test]
    fn test_mock_http_client_order() {
        let mut http = MockHttpClient::new();
        http.mock_url("https://hackage.haskell.org/package/", MockHttpResponse::ok(b"prefix".to_vec()));
        http.enqueue_error("timeout");

        assert!(http.get("https://hackage.haskell.org/package/foo").is_err());
        let response = http.get("https://hackage.haskell.org/package/foo").unwrap();
        assert_eq!(response.body, b"prefix");
        assert!(http.get("https://example.com/").is_err());
        assert_eq!(http.requests().len(), 3);
    }

    #[test]
    fn test_scripted_prompter() {
        let mut prompter = ScriptedPrompter::interactive();
        prompter.answer(Gate::Commit, false).answer_input("2.0.0");

        assert!(!prompter.confirm(Gate::Commit, "Commit?").unwrap());
        assert!(prompter.confirm(Gate::Commit, "Commit?").unwrap());
        assert!(!prompter.confirm(Gate::RetagExisting, "Retag?").unwrap());
        assert_eq!(prompter.ask("Version:", "1.0.1").unwrap(), "2.0.0");
        assert_eq!(prompter.ask("Version:", "1.0.1").unwrap(), "1.0.1");
        assert_eq!(prompter.questions().len(), 5);
    }
}
