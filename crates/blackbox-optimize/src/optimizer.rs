//! Optimizer: evaluates telemetry and re-provisions underutilized workloads.
//!
//! The runtime's live snapshot decides whether a workload exists; the
//! registry only supplies history. A registry entry without a live container
//! is skipped, never acted on.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use blackbox_deploy::profile;
use blackbox_deploy::resolver;
use blackbox_deploy::{DeployRequest, Deployment, Orchestrator};
use blackbox_telemetry::MetricsView;

use crate::error::{OptimizeError, OptimizeResult};

/// Fewer samples than this never make a candidate.
pub const MIN_SAMPLES: usize = 10;
/// Fraction of the ceiling below which mean usage counts as underutilized.
pub const UNDERUTILIZATION_FACTOR: f64 = 0.7;
/// Lowest ceiling ever assigned.
pub const MIN_TARGET: f64 = 0.10;
/// Highest ceiling ever assigned.
pub const MAX_TARGET: f64 = 0.95;

/// Outcome of evaluating one workload.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    InsufficientSamples { have: usize },
    /// Peak is still zero: telemetry never reported activity.
    NoActivity,
    WithinCeiling { mean: f64, threshold: f64 },
    Underutilized { mean: f64, threshold: f64 },
}

impl Verdict {
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::Underutilized { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub optimized: bool,
    /// Containers torn down and successfully redeployed.
    pub restarted_models: Vec<String>,
    pub message: String,
}

pub struct Optimizer {
    orchestrator: Arc<Orchestrator>,
    /// Serializes passes; candidates within a pass are already sequential.
    pass: Mutex<()>,
}

impl Optimizer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            pass: Mutex::new(()),
        }
    }

    /// Classify one workload's telemetry.
    pub fn evaluate(view: &MetricsView) -> Verdict {
        let have = view.sample_count();
        if have < MIN_SAMPLES {
            return Verdict::InsufficientSamples { have };
        }
        if view.peak_usage_percent <= 0.0 {
            return Verdict::NoActivity;
        }
        let mean = view.mean_usage_percent;
        let threshold = view.ceiling * 100.0 * UNDERUTILIZATION_FACTOR;
        if mean < threshold {
            Verdict::Underutilized { mean, threshold }
        } else {
            Verdict::WithinCeiling { mean, threshold }
        }
    }

    /// New ceiling for a workload with the given peak usage (percent).
    pub fn target_fraction(peak_percent: f64) -> f64 {
        (peak_percent / 100.0).clamp(MIN_TARGET, MAX_TARGET)
    }

    /// Registry entries that qualify for right-sizing, in name order.
    pub async fn candidates(&self) -> Vec<String> {
        let mut names = Vec::new();
        for view in self.orchestrator.registry().entries().await {
            let verdict = Self::evaluate(&view);
            debug!(container = %view.container_name, verdict = ?verdict, "evaluated");
            if verdict.is_candidate() {
                names.push(view.container_name);
            }
        }
        names
    }

    /// Run one optimization pass.
    pub async fn optimize(&self) -> OptimizationResult {
        let _pass = self.pass.lock().await;

        let candidates = self.candidates().await;
        if candidates.is_empty() {
            return OptimizationResult {
                optimized: false,
                restarted_models: Vec::new(),
                message: "No models need optimization".to_string(),
            };
        }

        info!(count = candidates.len(), "optimizing underutilized models");
        let mut restarted = Vec::new();
        for name in &candidates {
            match self.right_size(name).await {
                Ok(deployment) => {
                    info!(
                        container = %name,
                        ceiling = deployment.ceiling,
                        container_id = %deployment.container_id,
                        "model right-sized"
                    );
                    restarted.push(name.clone());
                }
                Err(OptimizeError::Stale(_)) => {
                    debug!(container = %name, "skipping stale telemetry entry");
                }
                Err(e) => warn!(container = %name, error = %e, "right-sizing failed"),
            }
        }

        OptimizationResult {
            optimized: true,
            restarted_models: restarted,
            message: format!("Optimizing {} model(s)", candidates.len()),
        }
    }

    /// Tear down and redeploy one candidate with a tighter ceiling.
    ///
    /// A failure after teardown leaves the workload absent.
    async fn right_size(&self, container_name: &str) -> OptimizeResult<Deployment> {
        let orchestrator = &self.orchestrator;
        let config = orchestrator.config();

        let workload = orchestrator
            .fleet_snapshot()
            .await?
            .into_iter()
            .find(|w| w.container_name == container_name)
            .ok_or_else(|| OptimizeError::Stale(container_name.to_string()))?;

        let teardown = orchestrator.spindown(container_name).await?;
        if !teardown.success {
            warn!(container = %container_name, message = %teardown.message, "teardown before redeploy failed");
        }

        let token = resolver::resolve_token(None, config)?;
        let gpu_class = match workload.gpu_class {
            Some(class) => class,
            None => orchestrator.resolve_gpu_class(None).await,
        };
        let base = orchestrator.profiles().resolve(&gpu_class);

        let target = Self::target_fraction(workload.peak_usage_percent);
        let scratch =
            profile::write_scratch_profile(&base, target, container_name, &config.scratch_dir)
                .await?;
        debug!(
            container = %container_name,
            peak = workload.peak_usage_percent,
            target,
            profile = %scratch.display(),
            "redeploying with new ceiling"
        );

        let deployment = orchestrator
            .deploy(DeployRequest {
                model_id: workload.model_id,
                hf_token: Some(token),
                port: Some(config.default_port),
                gpu_type: Some(gpu_class.to_string()),
                profile_path: Some(scratch),
            })
            .await?;
        Ok(deployment)
    }
}
