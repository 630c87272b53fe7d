//! Multisig transaction pipeline.
//!
//! # Data Flow
//! ```text
//! MultisigRequest
//!     → generate   (base command + --generate-only)  → unsigned artifact
//!     → sign × N   (one signer at a time, in order)  → signed-<signer> artifacts
//!     → multisign  (unsigned + every contribution)   → multisigned artifact
//!     → broadcast  (multisigned)                     → final result
//! ```
//!
//! # Design Decisions
//! - Strictly sequential: the client's keyring is not safe under concurrent use
//! - First failing stage ends the run; no retries, no compensation
//! - All artifacts live in one scope and are removed on every exit path
//! - The caller always gets the trace accumulated so far

pub mod artifacts;
pub mod multisig;
pub mod report;
pub mod state;

pub use artifacts::{ArtifactError, ArtifactHandle, ArtifactScope, ArtifactStore, ClearFailure, ClearReport};
pub use multisig::{ChainParams, MultisigRequest, PipelineError, TransactionPipeline};
pub use report::{PipelineRun, SignTrace, StageReport, StageTrace};
pub use state::{RunState, Stage};
