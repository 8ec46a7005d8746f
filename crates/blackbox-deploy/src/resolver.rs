//! Request-time resolution of credentials and GPU class.
//!
//! Precedence is always: explicit request value, then configuration
//! (which already folds in the environment), then a built-in default.

use tracing::debug;

use blackbox_core::{FleetConfig, GpuClass};
use blackbox_runtime::GpuInventory;

use crate::error::{DeployError, DeployResult};

/// Explicit token, else the configured one. Blank values count as absent.
pub fn resolve_token(explicit: Option<&str>, config: &FleetConfig) -> DeployResult<String> {
    explicit
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| config.hf_token.as_deref().map(str::trim).filter(|t| !t.is_empty()))
        .map(str::to_string)
        .ok_or(DeployError::MissingCredential)
}

/// Explicit class, else the configured default, else whatever the local
/// inventory reports (which itself falls back to the default class).
pub async fn resolve_gpu_class(
    explicit: Option<&str>,
    config: &FleetConfig,
    inventory: &GpuInventory,
) -> GpuClass {
    let configured = explicit
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .or_else(|| config.gpu_type.as_deref().filter(|c| !c.is_empty()));
    match configured {
        Some(class) => {
            debug!(class, "using configured GPU class");
            GpuClass::new(class)
        }
        None => inventory.detect_class().await,
    }
}
