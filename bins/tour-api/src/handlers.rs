// HTTP route handlers for the Go tour API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tour_common::{ErrorKind, ExecutionRequest, ExecutionResult, VersionToken};
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub code: String,
    pub version: Option<String>,
    #[serde(default)]
    pub auto_detect: bool,
    /// Lesson path; only used to infer the version
    pub file_path: Option<String>,
    /// Comma-separated `KEY=VALUE` pairs
    pub env_vars: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Defaults to true when `version` is given
    pub strict: Option<bool>,
    pub timeout_ms: Option<u64>,
}

impl From<RunRequest> for ExecutionRequest {
    fn from(req: RunRequest) -> Self {
        let strict_version = req.strict.unwrap_or(req.version.is_some());
        ExecutionRequest {
            code: req.code,
            version: req.version,
            auto_detect: req.auto_detect,
            // zero means "executor default"
            timeout: Duration::from_millis(req.timeout_ms.unwrap_or(0)),
            environment: req.environment,
            env_vars: req.env_vars,
            path_hint: req.file_path,
            strict_version,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub exit_code: i32,
    pub execution_time_ms: u64,
    pub go_version: String,
    pub used_version: Option<VersionToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_version: Option<VersionToken>,
    pub version_path: Option<String>,
}

impl From<ExecutionResult> for RunResponse {
    fn from(result: ExecutionResult) -> Self {
        RunResponse {
            error: (!result.error.is_empty()).then_some(result.error),
            error_kind: result.error_kind,
            exit_code: result.exit_code,
            execution_time_ms: result.elapsed.as_millis() as u64,
            go_version: result.go_version,
            used_version: result.used_version,
            detected_version: result.detected_version,
            version_path: result.version_path.map(|p| p.display().to_string()),
            output: result.output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionToken>,
}

/// POST /api/run - Execute Go code with the resolved toolchain
///
/// Failures are part of the response body; only malformed JSON gets a 4xx.
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let request = ExecutionRequest::from(payload);

    let result = state
        .executor
        .run(&request)
        .instrument(tracing::info_span!("run", request_id = %request_id))
        .await;

    metrics::record_run(&result);

    info!(
        request_id = %request_id,
        exit_code = result.exit_code,
        error_kind = result.error_kind.map(|k| k.as_str()).unwrap_or("none"),
        "Run finished"
    );

    (StatusCode::OK, Json(RunResponse::from(result)))
}

/// GET /api/versions - Installed versions, newest first
pub async fn list_versions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(VersionsResponse {
        versions: state.executor.supported_versions(),
    })
}

/// GET /api/version-info - Registry status
pub async fn version_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.executor.version_info())
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text format
pub async fn metrics() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
