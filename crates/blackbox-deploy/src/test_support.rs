//! Shared fixtures for unit tests.

use std::sync::Arc;

use blackbox_core::FleetConfig;
use blackbox_runtime::GpuInventory;
use blackbox_runtime::testkit::{FakeExecutor, FakeGateway};
use blackbox_telemetry::TelemetryRegistry;

use crate::orchestrator::Orchestrator;
use crate::testkit::StaticValidator;
use crate::validator::ModelValidator;

pub(crate) struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub orchestrator: Orchestrator,
    pub profiles_dir: tempfile::TempDir,
}

pub(crate) fn harness_with(
    gateway: FakeGateway,
    validator: Arc<dyn ModelValidator>,
    token: Option<&str>,
    t4_profile: &str,
) -> Harness {
    let profiles_dir = tempfile::tempdir().unwrap();
    std::fs::write(profiles_dir.path().join("T4.yaml"), t4_profile).unwrap();
    let config = FleetConfig {
        hf_token: token.map(str::to_string),
        gpu_type: None,
        max_concurrent_models: 3,
        profiles_dir: profiles_dir.path().to_path_buf(),
        scratch_dir: profiles_dir.path().join("scratch"),
        ..FleetConfig::default()
    };
    let gateway = Arc::new(gateway);
    // Nothing scripted for nvidia-smi, so detection falls back to T4.
    let inventory = GpuInventory::new(Arc::new(FakeExecutor::new()));
    let orchestrator = Orchestrator::new(
        config,
        gateway.clone(),
        validator,
        inventory,
        TelemetryRegistry::new(),
    );
    Harness {
        gateway,
        orchestrator,
        profiles_dir,
    }
}

pub(crate) fn harness(gateway: FakeGateway) -> Harness {
    harness_with(
        gateway,
        Arc::new(StaticValidator::accept()),
        Some("hf_env"),
        "max_gpu_utilization: 0.5\n",
    )
}
