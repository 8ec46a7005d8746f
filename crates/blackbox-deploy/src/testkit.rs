//! Validator fakes.
//!
//! Enabled via `#[cfg(test)]` or the `testkit` feature.

use std::sync::Mutex;

use blackbox_runtime::BoxFuture;

use crate::error::ValidationError;
use crate::validator::ModelValidator;

/// Accepts or rejects every model.
pub struct StaticValidator {
    accept: bool,
}

impl StaticValidator {
    pub fn accept() -> Self {
        Self { accept: true }
    }

    pub fn reject() -> Self {
        Self { accept: false }
    }
}

impl ModelValidator for StaticValidator {
    fn validate<'a>(
        &'a self,
        model_id: &'a str,
        _token: &'a str,
    ) -> BoxFuture<'a, Result<(), ValidationError>> {
        let result = if self.accept {
            Ok(())
        } else {
            Err(ValidationError::Rejected(model_id.to_string()))
        };
        Box::pin(async move { result })
    }
}

/// Records every `(model_id, token)` pair it is asked about.
pub struct RecordingValidator {
    inner: StaticValidator,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingValidator {
    pub fn accept() -> Self {
        Self {
            inner: StaticValidator::accept(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reject() -> Self {
        Self {
            inner: StaticValidator::reject(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ModelValidator for RecordingValidator {
    fn validate<'a>(
        &'a self,
        model_id: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<(), ValidationError>> {
        self.calls
            .lock()
            .unwrap()
            .push((model_id.to_string(), token.to_string()));
        self.inner.validate(model_id, token)
    }
}
