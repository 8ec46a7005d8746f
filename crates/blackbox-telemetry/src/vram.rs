//! Point-in-time accelerator memory snapshot.
//!
//! Joins the driver's per-process usage with the registry's pids so each
//! tracked workload reports the memory its engine actually holds.

use serde::Serialize;

use blackbox_core::GpuClass;
use blackbox_runtime::{GpuInventory, RuntimeResult};

use crate::registry::TelemetryRegistry;

/// Device memory with per-process and per-workload breakdowns, all in MiB.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VramSnapshot {
    pub total_mib: u64,
    /// Sum over compute processes.
    pub used_mib: u64,
    pub free_mib: u64,
    /// Sorted by pid.
    pub processes: Vec<ProcessUsage>,
    /// One entry per registered workload, sorted by container name.
    pub models: Vec<ModelUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessUsage {
    pub pid: u32,
    pub used_mib: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelUsage {
    pub container_name: String,
    pub gpu_class: GpuClass,
    pub pid: u32,
    pub used_mib: u64,
    /// Share of device memory, 0.0–100.0.
    pub usage_percent: f64,
    pub ceiling: f64,
}

/// Query the driver and build a snapshot.
///
/// A workload whose pid is unresolved or absent from the driver's process
/// list reports zero usage.
pub async fn vram_snapshot(
    inventory: &GpuInventory,
    registry: &TelemetryRegistry,
) -> RuntimeResult<VramSnapshot> {
    let total_mib = inventory.total_memory_mib().await?;
    let usage = inventory.process_memory_mib().await?;

    let mut processes: Vec<ProcessUsage> = usage
        .iter()
        .map(|(&pid, &used_mib)| ProcessUsage { pid, used_mib })
        .collect();
    processes.sort_by_key(|p| p.pid);
    let used_mib: u64 = processes.iter().map(|p| p.used_mib).sum();

    let models = registry
        .entries()
        .await
        .into_iter()
        .map(|view| {
            let used = if view.pid == 0 {
                0
            } else {
                usage.get(&view.pid).copied().unwrap_or(0)
            };
            let usage_percent = if total_mib == 0 {
                0.0
            } else {
                used as f64 / total_mib as f64 * 100.0
            };
            ModelUsage {
                container_name: view.container_name,
                gpu_class: view.gpu_class,
                pid: view.pid,
                used_mib: used,
                usage_percent,
                ceiling: view.ceiling,
            }
        })
        .collect();

    Ok(VramSnapshot {
        total_mib,
        used_mib,
        free_mib: total_mib.saturating_sub(used_mib),
        processes,
        models,
    })
}
