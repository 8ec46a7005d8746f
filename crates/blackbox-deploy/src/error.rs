//! Deployment error types.
//!
//! [`DeployError`] holds the failures surfaced to callers. Soft failures
//! (profile fallbacks, teardown hiccups, unresolved pids) never become
//! errors; they travel as [`Soft`] values and are logged.

use thiserror::Error;

/// Failures that abort a deploy and are reported to the caller.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("HF token is required. Provide hf_token in the request or set HF_TOKEN")]
    MissingCredential,

    #[error("Cannot deploy: {current} models already deployed (max: {max})")]
    ResourceExhausted { current: usize, max: u32 },

    #[error("Failed to validate model. Check model_id and HF token.")]
    ValidationFailed(#[source] ValidationError),

    #[error("Failed to deploy container: {0}")]
    ProvisioningFailure(String),
}

impl DeployError {
    /// Stable tag for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::MissingCredential => "missing_credential",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::ValidationFailed(_) => "validation_failed",
            Self::ProvisioningFailure(_) => "provisioning_failure",
        }
    }

    /// Whether the caller sent an incomplete request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::MissingCredential)
    }
}

/// Why a remote model lookup did not confirm the model.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned status {0}")]
    Status(u16),

    #[error("registry response has no model identifier")]
    MissingIdentifier,

    #[error("model rejected: {0}")]
    Rejected(String),
}

pub type DeployResult<T> = Result<T, DeployError>;

/// A value to continue with, plus the reason when it is a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Soft<T> {
    pub value: T,
    pub fallback: Option<String>,
}

impl<T> Soft<T> {
    pub fn exact(value: T) -> Self {
        Self {
            value,
            fallback: None,
        }
    }

    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            fallback: Some(reason.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Log the fallback reason, if any, and return the value.
    pub fn settle(self, what: &str) -> T {
        if let Some(reason) = &self.fallback {
            tracing::warn!(%reason, "{what}: continuing with fallback");
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_contract() {
        let err = DeployError::ResourceExhausted { current: 3, max: 3 };
        assert_eq!(err.to_string(), "Cannot deploy: 3 models already deployed (max: 3)");
        assert_eq!(err.kind(), "resource_exhausted");
        assert!(!err.is_client_error());

        assert_eq!(DeployError::MissingField("model_id").to_string(), "model_id is required");
        assert!(DeployError::MissingCredential.is_client_error());
    }

    #[test]
    fn soft_values() {
        let exact = Soft::exact(0.3);
        assert!(!exact.is_fallback());
        assert_eq!(exact.settle("ceiling"), 0.3);

        let fb = Soft::fallback(0.5, "key missing");
        assert!(fb.is_fallback());
        assert_eq!(fb.settle("ceiling"), 0.5);
    }
}
