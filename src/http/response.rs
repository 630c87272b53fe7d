//! Error → HTTP response mapping.
//!
//! Every failure becomes a JSON body carrying the diagnostic text:
//! - unresolvable binary / bad request data → 400
//! - body that is not a url-encoded form → 415 (or 400 when it is malformed)
//! - missing audit log → 404
//! - local faults (clear failures, artifact I/O) → 500

use axum::{
    extract::rejection::FormRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::audit::AuditError;
use crate::command::{CommandError, RequestError, ResolveError};
use crate::pipeline::ClearReport;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Requested binary could not be resolved.
    #[error(transparent)]
    Configuration(#[from] ResolveError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Body(#[from] FormRejection),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("failed to clear files")]
    ClearFailed(ClearReport),
}

impl From<CommandError> for GatewayError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Resolve(e) => GatewayError::Configuration(e),
            CommandError::Request(e) => GatewayError::Request(e),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Configuration(_) | GatewayError::Request(_) => StatusCode::BAD_REQUEST,
            GatewayError::Body(rejection) => rejection.status(),
            GatewayError::Audit(AuditError::NotFound) => StatusCode::NOT_FOUND,
            GatewayError::Audit(_) | GatewayError::ClearFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> Value {
        match self {
            GatewayError::ClearFailed(report) => json!({
                "cleared": report.cleared,
                "errors": report.errors,
            }),
            other => Value::String(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ClearFailure;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::from(ResolveError::NotFound("gc".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::from(RequestError::NoSigners).status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::from(AuditError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(GatewayError::from(AuditError::Closed).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_configuration_detail_text() {
        let err = GatewayError::from(CommandError::Resolve(ResolveError::NotFound("gc".into())));
        assert_eq!(err.detail(), json!("Binary not found for gc"));
    }

    #[test]
    fn test_clear_failure_lists_files() {
        let err = GatewayError::ClearFailed(ClearReport {
            cleared: vec![],
            errors: vec![ClearFailure {
                file: "logs/chain_gateway.jsonl".into(),
                error: "permission denied".into(),
            }],
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail()["errors"][0]["file"], "logs/chain_gateway.jsonl");
    }
}
