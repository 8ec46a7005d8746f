//! Deployment orchestrator: admission control and provisioning.
//!
//! A deploy runs these steps in order and stops at the first hard failure:
//!
//! ```text
//! validate input → resolve token → admission (live count < max)
//!   → remote validation → name + GPU class → profile → ceiling
//!   → replace existing container → run → check id → pid → register telemetry
//! ```
//!
//! The runtime is queried fresh for admission; the telemetry registry is
//! never consulted for fleet membership.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use blackbox_core::{DeployedWorkload, FleetConfig, FleetListing, GpuClass, WorkloadIdentity};
use blackbox_runtime::{GpuInventory, ProvisionSpec, RuntimeGateway, RuntimeResult};
use blackbox_telemetry::TelemetryRegistry;

use crate::error::{DeployError, DeployResult, Soft};
use crate::profile::{self, ProfileResolver};
use crate::resolver;
use crate::teardown;
use crate::validator::ModelValidator;

/// Minimum length of a runtime-assigned container id.
pub const MIN_CONTAINER_ID_LEN: usize = 12;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub hf_token: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub gpu_type: Option<String>,
    /// Profile override; bypasses the class lookup. In-process only, never
    /// read from a request body.
    #[serde(skip)]
    pub profile_path: Option<PathBuf>,
}

impl DeployRequest {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::default()
        }
    }
}

/// A successfully provisioned workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deployment {
    pub model_id: String,
    pub container_id: String,
    pub container_name: String,
    pub port: u16,
    pub gpu_class: GpuClass,
    pub ceiling: f64,
    /// 0 when the host pid could not be resolved.
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl DeployResponse {
    pub fn from_result(result: &DeployResult<Deployment>) -> Self {
        match result {
            Ok(d) => Self {
                success: true,
                message: format!("Model deployed successfully. Container: {}", d.container_id),
                container_id: Some(d.container_id.clone()),
                port: Some(d.port),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
                container_id: None,
                port: None,
            },
        }
    }
}

pub struct Orchestrator {
    config: FleetConfig,
    gateway: Arc<dyn RuntimeGateway>,
    validator: Arc<dyn ModelValidator>,
    inventory: GpuInventory,
    profiles: ProfileResolver,
    registry: TelemetryRegistry,
}

impl Orchestrator {
    pub fn new(
        config: FleetConfig,
        gateway: Arc<dyn RuntimeGateway>,
        validator: Arc<dyn ModelValidator>,
        inventory: GpuInventory,
        registry: TelemetryRegistry,
    ) -> Self {
        let profiles = ProfileResolver::new(config.profiles_dir.clone());
        Self {
            config,
            gateway,
            validator,
            inventory,
            profiles,
            registry,
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn registry(&self) -> &TelemetryRegistry {
        &self.registry
    }

    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    pub fn inventory(&self) -> &GpuInventory {
        &self.inventory
    }

    pub(crate) fn gateway(&self) -> &dyn RuntimeGateway {
        self.gateway.as_ref()
    }

    /// Deploy (or replace) the model server for `request.model_id`.
    pub async fn deploy(&self, request: DeployRequest) -> DeployResult<Deployment> {
        let model_id = request.model_id.trim();
        if model_id.is_empty() {
            return Err(DeployError::MissingField("model_id"));
        }

        let token = resolver::resolve_token(request.hf_token.as_deref(), &self.config)?;

        self.admit().await?;

        if let Err(e) = self.validator.validate(model_id, &token).await {
            warn!(%model_id, error = %e, "model validation failed");
            return Err(DeployError::ValidationFailed(e));
        }

        let identity = WorkloadIdentity::for_model(model_id);
        let gpu_class = self.resolve_gpu_class(request.gpu_type.as_deref()).await;

        let profile_path = match request.profile_path {
            Some(path) => profile::absolutize(path),
            None => self.profiles.resolve(&gpu_class),
        };
        let ceiling = profile::read_ceiling(&profile_path).await.settle("profile ceiling");

        self.replace_existing(&identity).await;

        let port = request.port.unwrap_or(self.config.default_port);
        let spec = ProvisionSpec {
            container_name: identity.container_name.clone(),
            model_id: identity.model_id.clone(),
            token,
            port,
            profile_path,
            gpu_class: gpu_class.clone(),
            ceiling,
        };
        let provisioned = self
            .gateway
            .run(&spec)
            .await
            .map_err(|e| DeployError::ProvisioningFailure(e.to_string()))?;

        let container_id = provisioned.container_id;
        if container_id.len() < MIN_CONTAINER_ID_LEN {
            warn!(container = %identity.container_name, "runtime returned an invalid container id");
            return Err(DeployError::ProvisioningFailure(format!(
                "invalid container id. Output: {}",
                provisioned.output
            )));
        }

        let pid = self.resolve_pid(&container_id).await.settle("pid resolution");

        self.registry
            .register(&identity.container_name, ceiling, gpu_class.clone(), pid)
            .await;

        info!(
            model_id = %identity.model_id,
            container = %identity.container_name,
            %container_id,
            port,
            gpu_class = %gpu_class,
            ceiling,
            pid,
            "model deployed"
        );

        Ok(Deployment {
            model_id: identity.model_id,
            container_id,
            container_name: identity.container_name,
            port,
            gpu_class,
            ceiling,
            pid,
        })
    }

    /// GPU class for a request, following the configured precedence.
    pub async fn resolve_gpu_class(&self, explicit: Option<&str>) -> GpuClass {
        resolver::resolve_gpu_class(explicit, &self.config, &self.inventory).await
    }

    /// Live fleet as reported by the runtime.
    pub async fn list(&self) -> FleetListing {
        let workloads = match self.gateway.list_workloads().await {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "listing workloads failed");
                Vec::new()
            }
        };
        FleetListing::from_workloads(&workloads, self.config.max_concurrent_models)
    }

    /// Live fleet with each workload's peak filled in from telemetry.
    pub async fn fleet_snapshot(&self) -> RuntimeResult<Vec<DeployedWorkload>> {
        let mut workloads = self.gateway.list_workloads().await?;
        for w in &mut workloads {
            w.peak_usage_percent = self.registry.peak(&w.container_name).await.unwrap_or(0.0);
        }
        Ok(workloads)
    }

    async fn admit(&self) -> DeployResult<()> {
        let current = self
            .gateway
            .list_workloads()
            .await
            .map_err(|e| DeployError::ProvisioningFailure(format!("cannot query runtime: {e}")))?
            .len();
        let max = self.config.max_concurrent_models;
        if current >= max as usize {
            warn!(current, max, "admission denied");
            return Err(DeployError::ResourceExhausted { current, max });
        }
        debug!(current, max, "admitted");
        Ok(())
    }

    async fn replace_existing(&self, identity: &WorkloadIdentity) {
        let existing = match self.gateway.find_container(&identity.container_name).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return,
            Err(e) => {
                warn!(container = %identity.container_name, error = %e, "lookup before replace failed");
                return;
            }
        };
        if let Some(other) = existing.model_id.as_deref()
            && other != identity.model_id
        {
            warn!(
                container = %identity.container_name,
                existing_model = other,
                model_id = %identity.model_id,
                "container name collision, replacing workload of a different model"
            );
        }
        info!(container = %identity.container_name, id = %existing.id, "replacing existing container");
        teardown::stop_and_remove(self.gateway(), &identity.container_name)
            .await
            .settle("replace teardown");
    }

    async fn resolve_pid(&self, container_id: &str) -> Soft<u32> {
        match self.gateway.inspect_pid(container_id).await {
            Ok(pid) => Soft::exact(pid),
            Err(e) => Soft::fallback(0, e.to_string()),
        }
    }
}
