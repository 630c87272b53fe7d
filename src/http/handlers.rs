//! Request handlers.
//!
//! `execute_command` is the gateway proper: it resolves the binary, builds
//! the argument list and then either runs a single invocation or hands the
//! request to the multisig pipeline. Every handled invocation leaves one
//! audit record behind.

use axum::{
    extract::{rejection::FormRejection, ConnectInfo, OriginalUri, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::audit::AuditRecord;
use crate::command::{build_base_command, split_subpath, CommandRequest, MultisigHeaders};
use crate::exec::CommandInvocation;
use crate::http::request::request_id;
use crate::http::response::GatewayError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::pipeline::{MultisigRequest, PipelineRun, StageReport};

/// Body of a multisig response: the run trace tagged with `multisig: true`.
#[derive(Serialize)]
struct MultisigResponse<'a> {
    multisig: bool,
    #[serde(flatten)]
    run: &'a PipelineRun,
}

/// `POST /{binary}/{command_type}[/{*path}]`
#[allow(clippy::too_many_arguments)]
pub async fn execute_command(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<Vec<(String, String)>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<Response, GatewayError> {
    let started = Instant::now();
    let request_id = request_id(&headers);

    let form = match form {
        Ok(Form(fields)) => fields,
        // A bodiless POST carries no options.
        Err(FormRejection::InvalidFormContentType(_)) if !headers.contains_key(CONTENT_TYPE) => {
            Vec::new()
        }
        Err(rejection) => return Err(rejection.into()),
    };

    let binary = params.get("binary").cloned().unwrap_or_default();
    let request = CommandRequest {
        binary: binary.clone(),
        command_type: params.get("command_type").cloned().unwrap_or_default(),
        subpath: split_subpath(params.get("path").map(String::as_str)),
        query,
        form,
    };

    let base = build_base_command(&state.resolver, &state.options, &request)?;
    let multisig = MultisigHeaders::from_headers(&headers)?;

    let mut record = AuditRecord::now(&request_id, client.to_string(), format!("{method} {uri}"));

    let (response, outcome) = if multisig.enabled {
        let multisig_request = MultisigRequest::new(base, &multisig, &request.form)?;
        tracing::info!(
            request_id = %request_id,
            binary = %binary,
            signers = ?multisig_request.signers,
            "Starting multisig run"
        );

        let run = state.pipeline.execute(&multisig_request).await;

        record.multisig = true;
        record.steps = audit_value(&request_id, &run.steps);
        record.final_result = run.result.clone();

        let status = if run.is_faulted() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        let outcome = if run.is_completed() {
            "completed"
        } else if run.is_faulted() {
            "faulted"
        } else {
            "failed"
        };
        let body = Json(MultisigResponse {
            multisig: true,
            run: &run,
        });
        ((status, body).into_response(), outcome)
    } else {
        let invocation = CommandInvocation::new(base.program, base.args)
            .with_stdin(state.process.confirm_input.clone())
            .with_timeout(state.process.simple_timeout_secs.map(Duration::from_secs));
        let command = invocation.display();
        tracing::info!(request_id = %request_id, binary = %binary, command = %command, "Executing command");

        let stage_started = Instant::now();
        let result = state.runner.run(invocation).await;
        metrics::record_stage("execute", result.success(), stage_started.elapsed());
        tracing::debug!(
            request_id = %request_id,
            exit_code = result.exit_status,
            duration_ms = stage_started.elapsed().as_millis() as u64,
            "Command finished"
        );

        let report = StageReport::new(command, &result);
        record.steps = json!({ "execute": report });
        record.final_result = report.to_value();

        let outcome = if report.success { "completed" } else { "failed" };
        (Json(report).into_response(), outcome)
    };

    record.duration_ms = started.elapsed().as_millis() as u64;
    if let Err(e) = state.audit.append(&record).await {
        tracing::error!(request_id = %request_id, error = %e, "Failed to append audit record");
        metrics::record_audit_failure();
    }

    metrics::record_request("execute", outcome, started);
    Ok(response)
}

/// JSON form of `value` for an audit record. A failure is logged and
/// counted, and recorded as `null`.
fn audit_value(request_id: &str, value: &impl Serialize) -> Value {
    match serde_json::to_value(value) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to serialize run trace for audit");
            metrics::record_audit_failure();
            Value::Null
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<i64>,
    pub keyword: Option<String>,
}

/// `GET /logs?lines=N&keyword=K`
pub async fn get_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Value>, GatewayError> {
    let started = Instant::now();
    let lines = params.lines.unwrap_or(state.default_log_lines);
    let keyword = params.keyword.as_deref().filter(|k| !k.is_empty());

    let records = state.audit.query(lines, keyword).await?;
    metrics::record_request("logs", "completed", started);

    Ok(Json(json!({
        "lines_requested": lines,
        "returned": records.len(),
        "records": records,
    })))
}

/// `DELETE /logs/clear`
pub async fn clear_logs(State(state): State<AppState>) -> Result<Json<Value>, GatewayError> {
    let report = state.audit.clear().await;
    if !report.errors.is_empty() {
        return Err(GatewayError::ClearFailed(report));
    }
    Ok(Json(json!({ "status": "ok", "cleared_files": report.cleared })))
}

/// `DELETE /artifacts/clear`
pub async fn clear_artifacts(State(state): State<AppState>) -> Result<Json<Value>, GatewayError> {
    let report = state.artifacts.sweep().await;
    if !report.errors.is_empty() {
        return Err(GatewayError::ClearFailed(report));
    }
    tracing::info!(count = report.cleared.len(), "Artifact directory swept");
    Ok(Json(json!({ "status": "ok", "cleared_files": report.cleared })))
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub binaries: Vec<String>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        binaries: state.resolver.aliases().map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[test]
    fn test_audit_value_falls_back_to_null() {
        assert_eq!(audit_value("req-1", &Unserializable), Value::Null);
        assert_eq!(audit_value("req-1", &json!({"generate": 1})), json!({"generate": 1}));
    }
}
