//! Optimizer error types. Each one aborts a single candidate, never the pass.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("workload {0} is no longer present in the runtime")]
    Stale(String),

    #[error("cannot read fleet snapshot: {0}")]
    Snapshot(#[from] blackbox_runtime::RuntimeError),

    #[error("cannot write scratch profile: {0}")]
    Profile(#[from] std::io::Error),

    #[error("redeploy failed: {0}")]
    Deploy(#[from] blackbox_deploy::DeployError),
}

pub type OptimizeResult<T> = Result<T, OptimizeError>;
