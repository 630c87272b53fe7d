//! Append-only audit log.
//!
//! # Data Flow
//! ```text
//! execute handler (simple or multisig)
//!     → record.rs (AuditRecord: request descriptor + steps + final result)
//!     → recorder.rs (one JSON line, exclusive append, fsync)
//!
//! GET /logs          → recorder.query(tail, keyword)
//! DELETE /logs/clear → recorder.clear()
//! ```
//!
//! # Design Decisions
//! - One recorder instance per process, opened at startup and closed at shutdown
//! - Appends are serialized in-process and synced before returning
//! - Malformed lines are skipped by queries, never fatal

pub mod record;
pub mod recorder;

pub use record::AuditRecord;
pub use recorder::{AuditError, AuditRecorder};
