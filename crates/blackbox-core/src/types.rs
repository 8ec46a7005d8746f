//! Shared types used across blackbox crates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::naming;

/// Container port every model server listens on inside its container.
pub const CONTAINER_PORT: u16 = 8000;

/// Accelerator class used to pick a resource profile (`T4`, `A100`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpuClass(String);

impl GpuClass {
    /// Conservative class assumed when nothing better is known.
    pub const DEFAULT: &'static str = "T4";

    /// Device-name substrings recognized during auto-detection.
    const KNOWN: [&'static str; 4] = ["A100", "H100", "L40", "T4"];

    pub fn new(class: impl Into<String>) -> Self {
        Self(class.into())
    }

    pub fn fallback() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    /// Map a device name reported by the driver to a class.
    pub fn from_device_name(device: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| device.contains(*known))
            .map(|known| Self::new(*known))
            .unwrap_or_else(Self::fallback)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GpuClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A model id together with the container name derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub model_id: String,
    pub container_name: String,
}

impl WorkloadIdentity {
    pub fn for_model(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            container_name: naming::container_name(model_id),
        }
    }
}

/// A workload as reported by the container runtime.
///
/// Ground truth lives in the runtime; values of this type are read fresh
/// on every query and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedWorkload {
    pub model_id: String,
    pub container_id: String,
    pub container_name: String,
    /// Host port mapped to the model server.
    pub port: u16,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_class: Option<GpuClass>,
    /// Last observed peak utilization (percent), filled in from telemetry.
    #[serde(default)]
    pub peak_usage_percent: f64,
}

/// Output of the list operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetListing {
    pub total: usize,
    pub running: usize,
    pub max_allowed: u32,
    pub models: Vec<ListedModel>,
}

/// One row of [`FleetListing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedModel {
    pub model_id: String,
    pub container_id: String,
    pub container_name: String,
    pub port: u16,
    pub running: bool,
}

impl From<&DeployedWorkload> for ListedModel {
    fn from(w: &DeployedWorkload) -> Self {
        Self {
            model_id: w.model_id.clone(),
            container_id: w.container_id.clone(),
            container_name: w.container_name.clone(),
            port: w.port,
            running: w.running,
        }
    }
}

impl FleetListing {
    pub fn from_workloads(workloads: &[DeployedWorkload], max_allowed: u32) -> Self {
        Self {
            total: workloads.len(),
            running: workloads.iter().filter(|w| w.running).count(),
            max_allowed,
            models: workloads.iter().map(ListedModel::from).collect(),
        }
    }
}
