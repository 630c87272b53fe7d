//! System process runner on top of `tokio::process`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::exec::{CommandInvocation, ExecutionResult, ProcessRunner, SIGNALLED_EXIT};

/// Spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, invocation: CommandInvocation) -> ExecutionResult {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .stdin(if invocation.stdin().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child on timeout kills it.
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    program = %invocation.program().display(),
                    error = %e,
                    "Failed to spawn process"
                );
                return ExecutionResult::spawn_failure(&e);
            }
        };

        // Feed stdin concurrently so a child that never reads it still falls
        // under the timeout. The pipe closes when the task ends.
        let feeder = match (invocation.stdin(), child.stdin.take()) {
            (Some(input), Some(mut pipe)) => {
                let input = input.to_owned();
                Some(tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(input.as_bytes()).await {
                        tracing::debug!(error = %e, "Child closed stdin early");
                    }
                }))
            }
            _ => None,
        };

        let output = match invocation.timeout() {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    if let Some(feeder) = feeder {
                        feeder.abort();
                    }
                    tracing::warn!(
                        program = %invocation.program().display(),
                        timeout_secs = limit.as_secs(),
                        "Process timed out, killed"
                    );
                    return ExecutionResult::timed_out(limit);
                }
            },
            None => child.wait_with_output().await,
        };

        match output {
            Ok(output) => ExecutionResult::new(
                output.status.code().unwrap_or(SIGNALLED_EXIT),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            ),
            Err(e) => ExecutionResult::spawn_failure(&e),
        }
    }
}
