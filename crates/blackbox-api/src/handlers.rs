//! REST API handlers.
//!
//! Deploy and spindown answer with the `{success, message, ...}` payloads
//! the fleet contract defines; the status code mirrors the outcome. Bodies
//! that fail to parse get the same failure shape with 400.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use blackbox_deploy::{DeployRequest, DeployResponse};
use blackbox_optimize::OptimizationResult;

use crate::AppState;

#[derive(Serialize)]
struct Failure {
    success: bool,
    message: String,
}

fn failure(message: impl Into<String>, status: StatusCode) -> Response {
    (
        status,
        Json(Failure {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

fn malformed(rejection: JsonRejection) -> Response {
    debug!(error = %rejection, "rejected request body");
    failure(rejection.body_text(), StatusCode::BAD_REQUEST)
}

// ── Models ─────────────────────────────────────────────────────

/// POST /api/v1/models
pub async fn deploy_model(
    State(state): State<AppState>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed(rejection),
    };
    info!(model_id = %request.model_id, "deploy requested");
    let result = state.orchestrator.deploy(request).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if let Err(e) = &result {
        debug!(kind = e.kind(), error = %e, "deploy rejected");
    }
    (status, Json(DeployResponse::from_result(&result))).into_response()
}

/// GET /api/v1/models
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.list().await)
}

/// Spindown request body. Either field names the target.
#[derive(Debug, Default, Deserialize)]
pub struct SpindownRequest {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub container_id: Option<String>,
}

impl SpindownRequest {
    fn identifier(&self) -> Option<&str> {
        [self.model_id.as_deref(), self.container_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// POST /api/v1/models/spindown
pub async fn spindown_model(
    State(state): State<AppState>,
    payload: Result<Json<SpindownRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed(rejection),
    };
    let Some(identifier) = request.identifier() else {
        return failure("model_id or container_id is required", StatusCode::BAD_REQUEST);
    };
    match state.orchestrator.spindown(identifier).await {
        Ok(resp) if resp.success => (StatusCode::OK, Json(resp)).into_response(),
        Ok(resp) => (StatusCode::INTERNAL_SERVER_ERROR, Json(resp)).into_response(),
        Err(e) => failure(e.to_string(), StatusCode::BAD_REQUEST),
    }
}

// ── Optimization ───────────────────────────────────────────────

#[derive(Serialize)]
struct OptimizeResponse {
    success: bool,
    #[serde(flatten)]
    result: OptimizationResult,
}

/// POST /api/v1/optimize
pub async fn optimize(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.optimizer.optimize().await;
    Json(OptimizeResponse {
        success: true,
        result,
    })
}

// ── Telemetry ──────────────────────────────────────────────────

/// One utilization sample pushed by an external monitor.
#[derive(Debug, Deserialize)]
pub struct TelemetrySample {
    pub container_name: String,
    pub utilization_percent: f64,
}

/// POST /api/v1/telemetry
pub async fn ingest_telemetry(
    State(state): State<AppState>,
    payload: Result<Json<TelemetrySample>, JsonRejection>,
) -> Response {
    let Json(sample) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed(rejection),
    };
    if sample.container_name.trim().is_empty() {
        return failure("container_name is required", StatusCode::BAD_REQUEST);
    }
    let recorded = state
        .registry
        .ingest(&sample.container_name, sample.utilization_percent)
        .await;
    Json(serde_json::json!({ "success": true, "recorded": recorded })).into_response()
}

/// GET /api/v1/telemetry
pub async fn list_telemetry(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.entries().await)
}

/// GET /api/v1/vram
pub async fn vram(State(state): State<AppState>) -> Response {
    match blackbox_telemetry::vram_snapshot(state.orchestrator.inventory(), &state.registry).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            debug!(error = %e, "VRAM snapshot failed");
            failure(format!("GPU query failed: {e}"), StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let views = state.registry.entries().await;
    let body = blackbox_telemetry::render_prometheus(&views);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
