//! Per-stage reports and the accumulated run trace.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::exec::{parse_output, ExecutionResult};
use crate::pipeline::state::{RunState, Stage};

/// What one invocation did, as returned to callers and written to the audit log.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageReport {
    pub command: String,
    pub success: bool,
    pub exit_code: i32,
    pub stdout: Value,
    pub stderr: Value,
}

impl StageReport {
    pub fn new(command: String, result: &ExecutionResult) -> Self {
        Self {
            command,
            success: result.success(),
            exit_code: result.exit_status,
            stdout: parse_output(&result.stdout),
            stderr: parse_output(&result.stderr),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Sign-stage reports keyed by signer, in invocation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignTrace(Vec<(String, StageReport)>);

impl SignTrace {
    pub fn push(&mut self, signer: &str, report: StageReport) {
        self.0.push((signer.to_string(), report));
    }

    pub fn get(&self, signer: &str) -> Option<&StageReport> {
        self.0.iter().find(|(s, _)| s == signer).map(|(_, r)| r)
    }

    pub fn signers(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(s, _)| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SignTrace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (signer, report) in &self.0 {
            map.serialize_entry(signer, report)?;
        }
        map.end()
    }
}

/// Stage reports, each present only once its stage has run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StageTrace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate: Option<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign: Option<SignTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multisign: Option<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<StageReport>,
}

/// The aggregate of one multisig run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineRun {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    pub steps: StageTrace,
    /// Parsed broadcast stdout on success, the failing report otherwise.
    pub result: Value,
    /// Local fault (artifact I/O, broken precondition) that ended the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            failed_stage: None,
            steps: StageTrace::default(),
            result: Value::Null,
            error: None,
        }
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// A stage's process failed: its report becomes the result.
    pub fn fail_stage(&mut self, stage: Stage, report: &StageReport) {
        self.enter(RunState::Failed);
        self.failed_stage = Some(stage);
        self.result = report.to_value();
    }

    /// A local fault ended the run. `stage` is `None` when no stage had started.
    pub fn fault(&mut self, error: String) {
        self.failed_stage = self.state.stage();
        self.enter(RunState::Failed);
        self.error = Some(error);
    }

    pub fn complete(&mut self, result: Value) {
        self.enter(RunState::Completed);
        self.result = result;
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Set when the run ended on a local fault rather than a process failure.
    pub fn is_faulted(&self) -> bool {
        self.error.is_some()
    }
}
