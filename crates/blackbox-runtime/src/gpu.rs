//! Local accelerator inventory through `nvidia-smi`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use blackbox_core::GpuClass;

use crate::error::{RuntimeError, RuntimeResult};
use crate::exec::{CommandExecutor, CommandSpec};

/// Queries the GPU driver for device class and per-process memory.
#[derive(Clone)]
pub struct GpuInventory {
    executor: Arc<dyn CommandExecutor>,
}

impl GpuInventory {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Class of the first device. Never fails: any error yields the default class.
    pub async fn detect_class(&self) -> GpuClass {
        match self.query(&["--query-gpu=name", "--format=csv,noheader"]).await {
            Ok(stdout) => {
                let device = stdout.lines().next().unwrap_or_default().trim();
                let class = GpuClass::from_device_name(device);
                debug!(device, class = %class, "detected GPU class");
                class
            }
            Err(e) => {
                warn!(error = %e, "GPU detection failed, assuming {}", GpuClass::DEFAULT);
                GpuClass::fallback()
            }
        }
    }

    /// Total memory of the first device, in MiB.
    pub async fn total_memory_mib(&self) -> RuntimeResult<u64> {
        let args = ["--query-gpu=memory.total", "--format=csv,noheader,nounits"];
        let stdout = self.query(&args).await?;
        let line = stdout.lines().next().unwrap_or_default().trim();
        line.parse().map_err(|_| RuntimeError::Parse {
            command: "nvidia-smi --query-gpu=memory.total".to_string(),
            detail: format!("memory `{line}`"),
        })
    }

    /// Memory held by each compute process, in MiB, keyed by pid.
    pub async fn process_memory_mib(&self) -> RuntimeResult<HashMap<u32, u64>> {
        let args = [
            "--query-compute-apps=pid,used_memory",
            "--format=csv,noheader,nounits",
        ];
        let stdout = self.query(&args).await?;
        Ok(parse_compute_apps(&stdout))
    }

    async fn query(&self, args: &[&str]) -> RuntimeResult<String> {
        let spec = CommandSpec::new("nvidia-smi").args(args.iter().copied());
        let output = self
            .executor
            .execute(&spec)
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: spec.to_string(),
                source,
            })?;
        if !output.success() {
            return Err(RuntimeError::CommandFailed {
                command: spec.to_string(),
                output: output.combined(),
            });
        }
        Ok(output.stdout)
    }
}

/// Parse `pid, used_memory` rows. A pid listed twice (several devices) is summed.
fn parse_compute_apps(stdout: &str) -> HashMap<u32, u64> {
    let mut usage = HashMap::new();
    for line in stdout.lines() {
        let Some((pid, mem)) = line.split_once(',') else {
            continue;
        };
        if let (Ok(pid), Ok(mem)) = (pid.trim().parse::<u32>(), mem.trim().parse::<u64>()) {
            *usage.entry(pid).or_insert(0) += mem;
        }
    }
    usage
}
