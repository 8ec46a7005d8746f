//! blackbox-telemetry: accelerator memory telemetry for deployed workloads.
//!
//! The registry is a secondary index keyed by container name. It holds a
//! sliding window of utilization samples and a monotonic peak per workload,
//! and it may drift from what the container runtime reports. Consumers treat
//! the runtime as authoritative.
//!
//! # Architecture
//!
//! ```text
//! TelemetryRegistry
//!   ├── register()   ← orchestrator, after a successful deploy
//!   ├── ingest()     ← GpuSampler / POST /api/v1/telemetry
//!   ├── unregister() ← teardown
//!   └── entries()    → optimizer, /metrics, vram_snapshot()
//!
//! GpuSampler
//!   └── run() → periodic nvidia-smi poll until shutdown
//! ```

pub mod prometheus;
pub mod registry;
pub mod sampler;
pub mod vram;

pub use prometheus::render_prometheus;
pub use registry::{MetricsView, TelemetryRegistry, WINDOW_CAPACITY};
pub use sampler::GpuSampler;
pub use vram::{ModelUsage, ProcessUsage, VramSnapshot, vram_snapshot};
