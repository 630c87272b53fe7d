//! Run states and the edges allowed between them.

use serde::Serialize;

/// Stage of a multisig run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Sign,
    Multisign,
    Broadcast,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Sign => "sign",
            Stage::Multisign => "multisign",
            Stage::Broadcast => "broadcast",
        }
    }

    /// State the run is in while this stage executes.
    pub fn running_state(&self) -> RunState {
        match self {
            Stage::Generate => RunState::Generating,
            Stage::Sign => RunState::AwaitingSignatures,
            Stage::Multisign => RunState::Merging,
            Stage::Broadcast => RunState::Broadcasting,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strictly sequential run state.
///
/// ```text
/// Idle → Generating → AwaitingSignatures → Merging → Broadcasting → Completed
///          └───────────────┴──────────────────┴──────────┴──────→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Generating,
    AwaitingSignatures,
    Merging,
    Broadcasting,
    Completed,
    Failed,
}

impl RunState {
    /// Stage executing in this state, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunState::Generating => Some(Stage::Generate),
            RunState::AwaitingSignatures => Some(Stage::Sign),
            RunState::Merging => Some(Stage::Multisign),
            RunState::Broadcasting => Some(Stage::Broadcast),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Whether `next` is a legal successor. There are no retry or resume
    /// edges; terminal states have no successors.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Generating)
            | (Generating, AwaitingSignatures)
            | (AwaitingSignatures, Merging)
            | (Merging, Broadcasting)
            | (Broadcasting, Completed) => true,
            // Preconditions can fail before the first stage starts.
            (Idle | Generating | AwaitingSignatures | Merging | Broadcasting, Failed) => true,
            _ => false,
        }
    }
}
