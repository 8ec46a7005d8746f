//! Lifecycle teardown: idempotent stop/remove with telemetry de-registration.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use blackbox_core::naming;
use blackbox_runtime::{LifecycleOutcome, RuntimeGateway};

use crate::error::{DeployError, DeployResult, Soft};
use crate::orchestrator::{MIN_CONTAINER_ID_LEN, Orchestrator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindownResponse {
    pub success: bool,
    pub message: String,
    /// Container name the request resolved to.
    pub target: String,
}

/// Stop then remove a container.
///
/// Succeeds when either step succeeds or finds nothing to act on. The value
/// is `false` only when both steps fail hard; any hard failure is reported
/// as the fallback reason.
pub(crate) async fn stop_and_remove(gateway: &dyn RuntimeGateway, name: &str) -> Soft<bool> {
    let stopped = gateway.stop(name).await;
    let removed = gateway.remove(name).await;
    let success = stopped.is_ok() || removed.is_ok();

    let failures: Vec<String> = [("stop", &stopped), ("remove", &removed)]
        .into_iter()
        .filter_map(|(verb, outcome)| match outcome {
            LifecycleOutcome::Failed(output) => Some(format!("{verb}: {output}")),
            _ => None,
        })
        .collect();

    if failures.is_empty() {
        Soft::exact(success)
    } else {
        Soft::fallback(success, failures.join("; "))
    }
}

impl Orchestrator {
    /// Tear down a workload given its model id, container name, or container id.
    ///
    /// Telemetry is unregistered before any runtime command, so a concurrent
    /// optimization pass never picks a workload that is going away.
    pub async fn spindown(&self, identifier: &str) -> DeployResult<SpindownResponse> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(DeployError::MissingField("model_id or container_id"));
        }
        let target = self.resolve_target(identifier).await;

        self.registry().unregister(&target).await;

        let outcome = stop_and_remove(self.gateway(), &target).await;
        if let Some(reason) = &outcome.fallback {
            warn!(container = %target, %reason, "teardown reported failures");
        }

        let response = if outcome.value {
            info!(container = %target, "model spun down");
            SpindownResponse {
                success: true,
                message: "Model spindown successful".to_string(),
                target,
            }
        } else {
            SpindownResponse {
                success: false,
                message: format!(
                    "Failed to spindown model: {}",
                    outcome.fallback.unwrap_or_default()
                ),
                target,
            }
        };
        Ok(response)
    }

    /// Map an identifier to a container name.
    ///
    /// Managed names pass through. Anything that looks like a runtime id and
    /// matches a live container resolves to that container's name. Everything
    /// else is treated as a model id.
    async fn resolve_target(&self, identifier: &str) -> String {
        if looks_like_container_id(identifier) {
            match self.gateway().list_workloads().await {
                Ok(workloads) => {
                    if let Some(w) = workloads
                        .iter()
                        .find(|w| w.container_id.starts_with(identifier))
                    {
                        debug!(%identifier, container = %w.container_name, "resolved container id");
                        return w.container_name.clone();
                    }
                }
                Err(e) => debug!(error = %e, "cannot resolve container id, treating as model id"),
            }
        }
        naming::normalize_target(identifier)
    }
}

fn looks_like_container_id(identifier: &str) -> bool {
    identifier.len() >= MIN_CONTAINER_ID_LEN && identifier.chars().all(|c| c.is_ascii_hexdigit())
}
