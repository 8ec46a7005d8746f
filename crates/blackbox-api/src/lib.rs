//! blackbox-api: REST API for the fleet.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/models` | Deploy (or replace) a model |
//! | GET | `/api/v1/models` | List deployed models |
//! | POST | `/api/v1/models/spindown` | Tear down a model |
//! | POST | `/api/v1/optimize` | Run one right-sizing pass |
//! | POST | `/api/v1/telemetry` | Push a utilization sample |
//! | GET | `/api/v1/telemetry` | Telemetry registry contents |
//! | GET | `/api/v1/vram` | Device memory snapshot with per-model breakdown |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use blackbox_deploy::Orchestrator;
use blackbox_optimize::Optimizer;
use blackbox_telemetry::TelemetryRegistry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub optimizer: Arc<Optimizer>,
    pub registry: TelemetryRegistry,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let registry = orchestrator.registry().clone();
        let optimizer = Arc::new(Optimizer::new(orchestrator.clone()));
        Self {
            orchestrator,
            optimizer,
            registry,
        }
    }
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/models", get(handlers::list_models).post(handlers::deploy_model))
        .route("/models/spindown", post(handlers::spindown_model))
        .route("/optimize", post(handlers::optimize))
        .route("/telemetry", get(handlers::list_telemetry).post(handlers::ingest_telemetry))
        .route("/vram", get(handlers::vram));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
