//! The structured audit record.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    /// RFC 3339 UTC timestamp with microseconds.
    pub timestamp_utc: String,
    pub request_id: String,
    /// Remote address of the caller.
    pub client: String,
    /// Originating request line, e.g. `POST /gc/tx/bank/send?...`.
    pub request: String,
    pub multisig: bool,
    /// Per-stage reports (`execute` for simple requests).
    pub steps: Value,
    pub final_result: Value,
    pub duration_ms: u64,
}

impl AuditRecord {
    /// Start a record stamped with the current time.
    pub fn now(request_id: impl Into<String>, client: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            timestamp_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            request_id: request_id.into(),
            client: client.into(),
            request: request.into(),
            multisig: false,
            steps: Value::Null,
            final_result: Value::Null,
            duration_ms: 0,
        }
    }
}
