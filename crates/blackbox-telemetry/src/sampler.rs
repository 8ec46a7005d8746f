//! Periodic GPU memory sampler feeding the registry.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use blackbox_runtime::{GpuInventory, RuntimeResult};

use crate::registry::TelemetryRegistry;

/// Polls per-process GPU memory and ingests one sample per tracked workload.
pub struct GpuSampler {
    registry: TelemetryRegistry,
    inventory: GpuInventory,
    interval: Duration,
}

impl GpuSampler {
    pub fn new(registry: TelemetryRegistry, inventory: GpuInventory, interval: Duration) -> Self {
        Self {
            registry,
            inventory,
            interval,
        }
    }

    /// Take one sample for every registered workload with a known pid.
    /// Returns the number of samples ingested.
    pub async fn sample_once(&self) -> RuntimeResult<usize> {
        let tracked: Vec<(String, u32)> = self
            .registry
            .entries()
            .await
            .into_iter()
            .filter(|v| v.pid != 0)
            .map(|v| (v.container_name, v.pid))
            .collect();
        if tracked.is_empty() {
            return Ok(0);
        }

        let total = self.inventory.total_memory_mib().await?;
        if total == 0 {
            return Ok(0);
        }
        let usage = self.inventory.process_memory_mib().await?;

        let mut ingested = 0;
        for (name, pid) in tracked {
            let Some(used) = usage.get(&pid) else {
                debug!(container = %name, pid, "no GPU process for workload");
                continue;
            };
            let percent = *used as f64 / total as f64 * 100.0;
            if self.registry.ingest(&name, percent).await {
                ingested += 1;
            }
        }
        Ok(ingested)
    }

    /// Run the sampling loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "GPU sampler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match self.sample_once().await {
                        Ok(n) => debug!(samples = n, "GPU sample pass complete"),
                        Err(e) => warn!(error = %e, "GPU sample pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("GPU sampler shutting down");
                    break;
                }
            }
        }
    }
}
