//! Blackbox runtime: the boundary to the container runtime and the GPU driver.
//!
//! Everything here shells out. Each external program is reached through a
//! [`CommandExecutor`], so the layers above can be driven by scripted fakes.
//!
//! ```text
//! Orchestrator ──► RuntimeGateway ──► DockerGateway ──┐
//!                                                     ├──► CommandExecutor ──► docker / nvidia-smi
//! GpuSampler   ──► GpuInventory  ─────────────────────┘
//! ```

pub mod docker;
pub mod error;
pub mod exec;
pub mod gpu;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

use std::future::Future;
use std::pin::Pin;

pub use docker::{
    ContainerRef, DockerGateway, LifecycleOutcome, ProvisionOutput, ProvisionSpec, RuntimeGateway,
};
pub use error::{RuntimeError, RuntimeResult};
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, ProcessExecutor};
pub use gpu::GpuInventory;

/// Boxed future returned by the object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
