//! Scripted runner for exercising pipelines without real binaries.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::exec::{CommandInvocation, ExecutionResult, ProcessRunner};

/// One call seen by a [`ScriptedRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub invocation: CommandInvocation,
    /// File names present in the watched directory when the call was made.
    pub files_present: Vec<String>,
}

type CallHook = Arc<dyn Fn(&CommandInvocation) + Send + Sync>;

/// Replays queued results in order and records every invocation.
///
/// Once the queue is empty every call succeeds with `{}` on stdout.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<ExecutionResult>>,
    calls: Mutex<Vec<RecordedCall>>,
    watch_dir: Option<PathBuf>,
    hook: Option<CallHook>,
}

impl fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("responses", &self.responses)
            .field("calls", &self.calls)
            .field("watch_dir", &self.watch_dir)
            .finish_non_exhaustive()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `dir` on every call.
    pub fn watching(mut self, dir: impl Into<PathBuf>) -> Self {
        self.watch_dir = Some(dir.into());
        self
    }

    /// Run `hook` on every invocation before its result is returned, e.g. to
    /// disturb the filesystem mid-run.
    pub fn before_each(mut self, hook: impl Fn(&CommandInvocation) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Queue a successful result with `stdout`.
    pub fn push_ok(&self, stdout: impl Into<String>) -> &Self {
        self.push(ExecutionResult::new(0, stdout, ""))
    }

    /// Queue a failing result.
    pub fn push_failure(&self, exit_status: i32, stderr: impl Into<String>) -> &Self {
        self.push(ExecutionResult::new(exit_status, "", stderr))
    }

    pub fn push(&self, result: ExecutionResult) -> &Self {
        lock(&self.responses).push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn snapshot(&self) -> Vec<String> {
        let Some(dir) = &self.watch_dir else {
            return Vec::new();
        };
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: CommandInvocation) -> ExecutionResult {
        if let Some(hook) = &self.hook {
            hook(&invocation);
        }
        let files_present = self.snapshot();
        lock(&self.calls).push(RecordedCall {
            invocation,
            files_present,
        });
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| ExecutionResult::new(0, "{}", ""))
    }
}
