//! Process execution subsystem.
//!
//! # Data Flow
//! ```text
//! CommandInvocation (program + argv + optional stdin/timeout)
//!     → runner.rs (spawn, feed stdin, capture stdout/stderr, optional deadline)
//!     → ExecutionResult (exit status + captured text)
//!     → output.rs (stdout/stderr → JSON value for responses and audit)
//! ```
//!
//! # Design Decisions
//! - argv is passed as a vector, never through a shell
//! - Spawn failures and timeouts become ExecutionResults with sentinel exit
//!   codes so callers handle every outcome the same way
//! - `ProcessRunner` is a trait so pipelines can run against a scripted
//!   runner in tests

pub mod output;
pub mod runner;
pub mod scripted;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use output::parse_output;
pub use runner::SystemProcessRunner;
pub use scripted::ScriptedRunner;

/// Exit status reported when the program cannot be located or spawned.
pub const SPAWN_FAILURE_EXIT: i32 = 255;

/// Exit status reported when an invocation exceeds its deadline.
pub const TIMEOUT_EXIT: i32 = 124;

/// Exit status reported when the child was terminated by a signal.
pub const SIGNALLED_EXIT: i32 = -1;

/// One external program invocation. Built once, consumed by a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    program: PathBuf,
    args: Vec<String>,
    stdin: Option<String>,
    timeout: Option<Duration>,
}

impl CommandInvocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            timeout: None,
        }
    }

    /// Text piped to the child's stdin.
    pub fn with_stdin(mut self, input: Option<String>) -> Self {
        self.stdin = input;
        self
    }

    /// Kill the child if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Human-readable command line for responses and logs. Empty
    /// arguments are shown as `""`.
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().map(|a| {
                if a.is_empty() {
                    "\"\"".to_string()
                } else {
                    a.clone()
                }
            }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn new(exit_status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Synthetic result for a program that could not be started.
    pub fn spawn_failure(error: &std::io::Error) -> Self {
        Self::new(SPAWN_FAILURE_EXIT, "", format!("Failed to run command: {error}"))
    }

    /// Synthetic result for a program killed at its deadline.
    pub fn timed_out(timeout: Duration) -> Self {
        Self::new(
            TIMEOUT_EXIT,
            "",
            format!("Command timed out after {} seconds", timeout.as_secs()),
        )
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Runs external programs.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run one invocation to completion. Never fails: problems starting the
    /// program are reported through the sentinel exit codes.
    async fn run(&self, invocation: CommandInvocation) -> ExecutionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_empty_args() {
        let inv = CommandInvocation::new("/usr/bin/gcd", vec!["tx".into(), String::new(), "-y".into()]);
        assert_eq!(inv.display(), "/usr/bin/gcd tx \"\" -y");
    }

    #[test]
    fn test_sentinels() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let spawn = ExecutionResult::spawn_failure(&err);
        assert_eq!(spawn.exit_status, SPAWN_FAILURE_EXIT);
        assert!(spawn.stderr.contains("no such file"));
        assert!(!spawn.success());

        let timeout = ExecutionResult::timed_out(Duration::from_secs(120));
        assert_eq!(timeout.exit_status, TIMEOUT_EXIT);
        assert_eq!(timeout.stderr, "Command timed out after 120 seconds");
    }
}
