//! blackbox-optimize: right-sizing of over-provisioned workloads.
//!
//! Reads the telemetry registry, picks workloads whose mean utilization sits
//! well below their ceiling, and redeploys them with a ceiling derived from
//! their observed peak.
//!
//! # Algorithm
//!
//! ```text
//! for each registry entry:
//!     skip if samples < 10
//!     threshold = ceiling * 100 * 0.7
//!     candidate iff mean(window) < threshold and peak > 0
//!
//! for each candidate, in name order:
//!     skip unless the live fleet still has the container
//!     spindown → target = clamp(peak / 100, 0.10, 0.95)
//!     scratch profile with target → deploy on the default port
//! ```
//!
//! Runs only when asked; there is no internal timer.

pub mod error;
pub mod optimizer;

pub use error::{OptimizeError, OptimizeResult};
pub use optimizer::{OptimizationResult, Optimizer, Verdict};
