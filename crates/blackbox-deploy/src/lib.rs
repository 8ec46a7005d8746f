//! blackbox-deploy: the admission and provisioning state machine.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── deploy()         → resolver → admission → ModelValidator → ProfileResolver
//!   │                      → RuntimeGateway::run → TelemetryRegistry::register
//!   ├── spindown()       → TelemetryRegistry::unregister → stop + remove
//!   ├── list()           → RuntimeGateway::list_workloads
//!   └── fleet_snapshot() → live fleet + telemetry peaks
//! ```

pub mod error;
pub mod orchestrator;
pub mod profile;
pub mod resolver;
pub mod teardown;
pub mod validator;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

#[cfg(test)]
mod test_support;

pub use error::{DeployError, DeployResult, Soft, ValidationError};
pub use orchestrator::{DeployRequest, DeployResponse, Deployment, Orchestrator};
pub use profile::ProfileResolver;
pub use teardown::SpindownResponse;
pub use validator::{HubValidator, ModelValidator};
