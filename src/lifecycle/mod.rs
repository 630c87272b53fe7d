//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Bind listener → Open audit log → Resolve binaries
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight runs → Close audit log
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - In-flight multisig runs are not cancelled; the server waits for them

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
