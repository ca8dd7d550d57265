//! Test utilities for quay unit tests.
//!
//! [`MockRunner`] stands in for real toolchains: it answers commands by
//! pattern, records every call, and can touch the filesystem when a command
//! "runs" so builds leave artifacts behind.
//!
//! ```rust,ignore
//! let runner = Arc::new(MockRunner::new());
//! runner.expect("meson --version", MockProcessOutput::success("1.4.0"));
//! let ctx = BackendContext::new(tmp.path()).with_runner(runner.clone());
//! ```

pub mod fixtures;

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::util::process::{OutputMode, ProcessBuilder, ProcessOutput, ProcessRunner};

pub use fixtures::*;

/// Canned result of a mocked command.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    /// When set, the command fails to spawn with this message.
    pub spawn_error: Option<String>,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            spawn_error: None,
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
            spawn_error: None,
        }
    }

    /// The program is not installed.
    pub fn spawn_failure() -> Self {
        MockProcessOutput {
            spawn_error: Some("No such file or directory (os error 2)".into()),
            ..MockProcessOutput::success("")
        }
    }

    fn to_output(&self) -> ProcessOutput {
        ProcessOutput {
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

/// Pattern for matching commands in [`MockRunner`].
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    StartsWith(String),
    Contains(String),
    Any,
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s.as_str()),
            CommandPattern::Contains(s) => cmd.contains(s.as_str()),
            CommandPattern::Any => true,
        }
    }
}

type Effect = Box<dyn Fn(&ProcessBuilder) + Send + Sync>;

struct CommandExpectation {
    pattern: CommandPattern,
    output: MockProcessOutput,
    effect: Option<Effect>,
    /// Number of times this expectation can be used (None = unlimited).
    times: Option<usize>,
    used: usize,
}

impl CommandExpectation {
    fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

/// One command the code under test tried to run.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub mode: OutputMode,
    pub env: Vec<(String, String)>,
}

#[derive(Default)]
struct State {
    expectations: Vec<CommandExpectation>,
    calls: Vec<RecordedCall>,
    default_output: Option<MockProcessOutput>,
}

/// Scripted [`ProcessRunner`].
///
/// Expectations are matched in the order they were added. A command with no
/// matching expectation and no default is an error.
#[derive(Default)]
pub struct MockRunner {
    state: Mutex<State>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    fn push(&self, expectation: CommandExpectation) {
        self.lock().expectations.push(expectation);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&self, cmd: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandPattern::Exact(cmd.to_string()), output)
    }

    pub fn expect_prefix(&self, prefix: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandPattern::StartsWith(prefix.to_string()), output)
    }

    pub fn expect_contains(&self, needle: &str, output: MockProcessOutput) -> &Self {
        self.expect_pattern(CommandPattern::Contains(needle.to_string()), output)
    }

    pub fn expect_pattern(&self, pattern: CommandPattern, output: MockProcessOutput) -> &Self {
        self.push(CommandExpectation {
            pattern,
            output,
            effect: None,
            times: None,
            used: 0,
        });
        self
    }

    /// Like [`expect_prefix`](Self::expect_prefix), limited to `times` uses.
    pub fn expect_prefix_times(&self, prefix: &str, output: MockProcessOutput, times: usize) -> &Self {
        self.push(CommandExpectation {
            pattern: CommandPattern::StartsWith(prefix.to_string()),
            output,
            effect: None,
            times: Some(times),
            used: 0,
        });
        self
    }

    /// Run `effect` whenever a command with this prefix runs, e.g. to drop
    /// fake build outputs on disk.
    pub fn on_command<F>(&self, prefix: &str, output: MockProcessOutput, effect: F) -> &Self
    where
        F: Fn(&ProcessBuilder) + Send + Sync + 'static,
    {
        self.push(CommandExpectation {
            pattern: CommandPattern::StartsWith(prefix.to_string()),
            output,
            effect: Some(Box::new(effect)),
            times: None,
            used: 0,
        });
        self
    }

    /// Output for commands no expectation matches.
    pub fn set_default(&self, output: MockProcessOutput) -> &Self {
        self.lock().default_output = Some(output);
        self
    }

    /// Every command line run so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.command.clone()).collect()
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// The first recorded command starting with `prefix`.
    pub fn find_call(&self, prefix: &str) -> Option<String> {
        self.calls().into_iter().find(|c| c.starts_with(prefix))
    }

    /// Verify that all expectations with a specific count were satisfied.
    pub fn verify(&self) -> Result<()> {
        let state = self.lock();
        for (i, exp) in state.expectations.iter().enumerate() {
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
}

impl ProcessRunner for MockRunner {
    fn run(&self, cmd: &ProcessBuilder, mode: OutputMode) -> Result<ProcessOutput> {
        let command = cmd.display_command();

        let mut guard = self.lock();
        let state = &mut *guard;
        state.calls.push(RecordedCall {
            command: command.clone(),
            cwd: cmd.get_cwd().map(|p| p.to_path_buf()),
            mode,
            env: cmd
                .get_envs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });

        let matched = state
            .expectations
            .iter_mut()
            .find(|exp| exp.available() && exp.pattern.matches(&command));

        let output = match matched {
            Some(exp) => {
                exp.used += 1;
                if let Some(effect) = &exp.effect {
                    effect(cmd);
                }
                exp.output.clone()
            }
            None => match &state.default_output {
                Some(default) => default.clone(),
                None => bail!("unexpected command: {}", command),
            },
        };

        if let Some(message) = &output.spawn_error {
            bail!("failed to spawn `{}`: {}", cmd.get_program().display(), message);
        }

        let mut result = output.to_output();
        if mode == OutputMode::Inherit {
            result.stdout.clear();
            result.stderr.clear();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_in_order() {
        let runner = MockRunner::new();
        runner.expect("cmake --version", MockProcessOutput::success("cmake version 3.28.1"));
        runner.expect_prefix("cmake", MockProcessOutput::failure(1, "boom"));

        let version = runner
            .run(&ProcessBuilder::new("cmake").arg("--version"), OutputMode::Capture)
            .unwrap();
        assert!(version.success());

        let build = runner
            .run(&ProcessBuilder::new("cmake").arg("--build"), OutputMode::Capture)
            .unwrap();
        assert_eq!(build.code, Some(1));
        assert_eq!(runner.calls(), vec!["cmake --version", "cmake --build"]);
    }

    #[test]
    fn test_unexpected_command_errors() {
        let runner = MockRunner::new();
        let err = runner
            .run(&ProcessBuilder::new("ninja"), OutputMode::Capture)
            .unwrap_err();
        assert!(err.to_string().contains("unexpected command: ninja"));

        runner.set_default(MockProcessOutput::success(""));
        assert!(runner
            .run(&ProcessBuilder::new("ninja"), OutputMode::Capture)
            .is_ok());
    }

    #[test]
    fn test_times_and_verify() {
        let runner = MockRunner::new();
        runner.expect_prefix_times("bazel", MockProcessOutput::success(""), 2);

        runner
            .run(&ProcessBuilder::new("bazel").arg("build"), OutputMode::Stream)
            .unwrap();
        assert!(runner.verify().is_err());

        runner
            .run(&ProcessBuilder::new("bazel").arg("test"), OutputMode::Stream)
            .unwrap();
        runner.verify().unwrap();
    }

    #[test]
    fn test_effect_and_recording() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("built");
        let target = marker.clone();

        let runner = MockRunner::new();
        runner.on_command("meson compile", MockProcessOutput::success(""), move |_| {
            std::fs::write(&target, "").unwrap();
        });

        let cmd = ProcessBuilder::new("meson")
            .args(["compile", "-C", "builddir"])
            .cwd(tmp.path())
            .env("CC", "clang");
        runner.run(&cmd, OutputMode::Stream).unwrap();

        assert!(marker.exists());
        let call = &runner.recorded()[0];
        assert_eq!(call.cwd.as_deref(), Some(tmp.path()));
        assert_eq!(call.mode, OutputMode::Stream);
        assert_eq!(call.env, vec![("CC".to_string(), "clang".to_string())]);
    }

    #[test]
    fn test_spawn_failure() {
        let runner = MockRunner::new();
        runner.expect("bazel --version", MockProcessOutput::spawn_failure());

        let err = runner
            .run(&ProcessBuilder::new("bazel").arg("--version"), OutputMode::Capture)
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to spawn `bazel`"));
    }
}
