//! API regression tests.
//!
//! Drives the assembled router end to end against a fake container runtime:
//! deploy, list, telemetry, optimize, spindown, VRAM, and metrics.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use blackbox_api::{AppState, build_router};
use blackbox_core::FleetConfig;
use blackbox_deploy::Orchestrator;
use blackbox_deploy::testkit::StaticValidator;
use blackbox_runtime::GpuInventory;
use blackbox_runtime::testkit::{FakeExecutor, FakeGateway};
use blackbox_telemetry::TelemetryRegistry;

struct Fleet {
    router: Router,
    gateway: Arc<FakeGateway>,
    dir: tempfile::TempDir,
}

fn fleet(gateway: FakeGateway) -> Fleet {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("T4.yaml"), "max_gpu_utilization: 0.5\n").unwrap();
    let config = FleetConfig {
        hf_token: Some("hf_env".to_string()),
        gpu_type: None,
        profiles_dir: dir.path().to_path_buf(),
        scratch_dir: dir.path().join("scratch"),
        ..FleetConfig::default()
    };
    let gateway = Arc::new(gateway);
    let orchestrator = Orchestrator::new(
        config,
        gateway.clone(),
        Arc::new(StaticValidator::accept()),
        GpuInventory::new(Arc::new(FakeExecutor::new())),
        TelemetryRegistry::new(),
    );
    Fleet {
        router: build_router(AppState::new(Arc::new(orchestrator))),
        gateway,
        dir,
    }
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn list_models_empty() {
    let f = fleet(FakeGateway::new());
    let (status, body) = call(&f.router, "GET", "/api/v1/models", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(body["max_allowed"], 3);
    assert_eq!(body["models"], json!([]));
}

#[tokio::test]
async fn deploy_then_list() {
    let f = fleet(FakeGateway::new());
    let (status, body) = call(
        &f.router,
        "POST",
        "/api/v1/models",
        Some(json!({ "model_id": "meta-llama/Llama-3.2-1B" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = call(&f.router, "GET", "/api/v1/models", None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["running"], 1);
    assert_eq!(body["models"][0]["model_id"], "meta-llama/Llama-3.2-1B");
    assert_eq!(body["models"][0]["container_name"], "vllm-meta-llama-Llama-3.2-1B");
}

#[tokio::test]
async fn deploy_without_model_id_is_rejected() {
    let f = fleet(FakeGateway::new());
    let (status, body) = call(&f.router, "POST", "/api/v1/models", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(f.gateway.provisioned().is_empty());
}

#[tokio::test]
async fn deploy_ignores_profile_path_in_body() {
    let f = fleet(FakeGateway::new());
    let (status, _) = call(
        &f.router,
        "POST",
        "/api/v1/models",
        Some(json!({ "model_id": "org/m", "profile_path": "/etc/passwd" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let mounted = &f.gateway.provisioned()[0].profile_path;
    assert!(mounted.starts_with(f.dir.path()));
    assert!(mounted.ends_with("T4.yaml"));
}

#[tokio::test]
async fn mistyped_body_gets_failure_shape() {
    let f = fleet(FakeGateway::new());
    let (status, body) =
        call(&f.router, "POST", "/api/v1/models", Some(json!({ "model_id": 5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
    assert!(f.gateway.provisioned().is_empty());
}

#[tokio::test]
async fn vram_without_driver_is_unavailable() {
    let f = fleet(FakeGateway::new());
    let (status, body) = call(&f.router, "GET", "/api/v1/vram", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn telemetry_then_optimize_restarts_with_lower_ceiling() {
    let f = fleet(FakeGateway::new());
    call(&f.router, "POST", "/api/v1/models", Some(json!({ "model_id": "m" }))).await;

    for pct in [12.0, 14.0, 18.0, 20.0, 16.0, 15.0, 13.0, 17.0, 19.0, 14.0, 12.0] {
        let (status, body) = call(
            &f.router,
            "POST",
            "/api/v1/telemetry",
            Some(json!({ "container_name": "vllm-m", "utilization_percent": pct })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recorded"], true);
    }

    let (status, body) = call(&f.router, "POST", "/api/v1/optimize", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["optimized"], true);
    assert_eq!(body["restarted_models"], json!(["vllm-m"]));

    let specs = f.gateway.provisioned();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[1].ceiling, 0.2);

    let (_, body) = call(&f.router, "GET", "/api/v1/telemetry", None).await;
    assert_eq!(body[0]["container_name"], "vllm-m");
    assert_eq!(body[0]["ceiling"], 0.2);
    assert_eq!(body[0]["samples"], json!([]));
}

#[tokio::test]
async fn spindown_then_list_is_empty() {
    let f = fleet(FakeGateway::new().with_workload("org/m", true));
    let (status, body) = call(
        &f.router,
        "POST",
        "/api/v1/models/spindown",
        Some(json!({ "model_id": "org/m" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Model spindown successful");

    let (_, body) = call(&f.router, "GET", "/api/v1/models", None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn spindown_without_target_is_rejected() {
    let f = fleet(FakeGateway::new());
    let (status, body) = call(&f.router, "POST", "/api/v1/models/spindown", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn metrics_endpoint_exposes_registered_workloads() {
    let f = fleet(FakeGateway::new());
    call(&f.router, "POST", "/api/v1/models", Some(json!({ "model_id": "m" }))).await;

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = f.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("container=\"vllm-m\""));
}
