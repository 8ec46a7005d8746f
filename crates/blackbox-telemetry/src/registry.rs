//! Telemetry registry: bounded per-workload utilization history.
//!
//! Structural changes (register, unregister) take the map's write lock.
//! Sample ingestion takes only the read lock plus the workload's own mutex,
//! so every mutation of one workload is serialized without blocking others.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use blackbox_core::GpuClass;

/// Samples retained per workload; older ones are evicted first.
pub const WINDOW_CAPACITY: usize = 100;

/// Per-workload metrics bucket.
struct WorkloadMetrics {
    /// Ceiling requested at provisioning time (0.0–1.0).
    ceiling: f64,
    gpu_class: GpuClass,
    /// Host pid for sample correlation; 0 when unresolved.
    pid: u32,
    samples: VecDeque<f64>,
    /// Highest sample ever ingested, including evicted ones.
    peak: f64,
}

impl WorkloadMetrics {
    fn new(ceiling: f64, gpu_class: GpuClass, pid: u32) -> Self {
        Self {
            ceiling,
            gpu_class,
            pid,
            samples: VecDeque::with_capacity(WINDOW_CAPACITY),
            peak: 0.0,
        }
    }

    fn push(&mut self, percent: f64) {
        if self.samples.len() == WINDOW_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(percent);
        if percent > self.peak {
            self.peak = percent;
        }
    }

    fn view(&self, container_name: &str) -> MetricsView {
        let samples: Vec<f64> = self.samples.iter().copied().collect();
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };
        MetricsView {
            container_name: container_name.to_string(),
            ceiling: self.ceiling,
            gpu_class: self.gpu_class.clone(),
            pid: self.pid,
            samples,
            peak_usage_percent: self.peak,
            mean_usage_percent: mean,
        }
    }
}

/// Owned copy of one workload's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsView {
    pub container_name: String,
    pub ceiling: f64,
    pub gpu_class: GpuClass,
    pub pid: u32,
    /// Retained window, oldest first.
    pub samples: Vec<f64>,
    pub peak_usage_percent: f64,
    /// Arithmetic mean of the retained window; 0 when empty.
    pub mean_usage_percent: f64,
}

impl MetricsView {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// Shared handle to the registry. Clones refer to the same store.
#[derive(Clone, Default)]
pub struct TelemetryRegistry {
    entries: Arc<RwLock<HashMap<String, Arc<Mutex<WorkloadMetrics>>>>>,
}

impl TelemetryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a workload's entry. Samples and peak start empty.
    pub async fn register(&self, container_name: &str, ceiling: f64, gpu_class: GpuClass, pid: u32) {
        let mut entries = self.entries.write().await;
        entries.insert(
            container_name.to_string(),
            Arc::new(Mutex::new(WorkloadMetrics::new(ceiling, gpu_class, pid))),
        );
        debug!(%container_name, ceiling, pid, "registered for telemetry");
    }

    /// Record one utilization sample.
    ///
    /// Returns `false` without error when the workload is not registered
    /// (telemetry may arrive before registration completes) or the sample
    /// is not a finite number.
    pub async fn ingest(&self, container_name: &str, utilization_percent: f64) -> bool {
        if !utilization_percent.is_finite() {
            debug!(%container_name, "dropping non-finite sample");
            return false;
        }
        let entry = {
            let entries = self.entries.read().await;
            match entries.get(container_name) {
                Some(entry) => Arc::clone(entry),
                None => {
                    trace!(%container_name, "sample for unregistered workload ignored");
                    return false;
                }
            }
        };
        entry.lock().await.push(utilization_percent);
        true
    }

    /// Remove a workload's entry. Returns whether one existed.
    pub async fn unregister(&self, container_name: &str) -> bool {
        let removed = self.entries.write().await.remove(container_name).is_some();
        if removed {
            debug!(%container_name, "unregistered from telemetry");
        }
        removed
    }

    pub async fn get(&self, container_name: &str) -> Option<MetricsView> {
        let entry = self.entries.read().await.get(container_name).cloned()?;
        let metrics = entry.lock().await;
        Some(metrics.view(container_name))
    }

    /// Snapshot of every entry, ordered by container name.
    pub async fn entries(&self) -> Vec<MetricsView> {
        let handles: Vec<(String, Arc<Mutex<WorkloadMetrics>>)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .map(|(name, m)| (name.clone(), Arc::clone(m)))
                .collect()
        };
        let mut views = Vec::with_capacity(handles.len());
        for (name, entry) in handles {
            views.push(entry.lock().await.view(&name));
        }
        views.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        views
    }

    /// Registered container names, sorted.
    pub async fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Last known peak for a workload, if registered.
    pub async fn peak(&self, container_name: &str) -> Option<f64> {
        self.get(container_name).await.map(|v| v.peak_usage_percent)
    }
}
