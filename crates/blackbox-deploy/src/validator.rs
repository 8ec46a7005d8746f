//! Remote model registry validation.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use blackbox_runtime::BoxFuture;

use crate::error::ValidationError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Confirms that a model exists in a remote registry.
pub trait ModelValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        model_id: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<(), ValidationError>>;
}

/// Validator backed by the Hugging Face hub API.
pub struct HubValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HubValidator {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ValidationError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn model_url(&self, model_id: &str) -> String {
        format!("{}/api/models/{}", self.base_url, model_id)
    }
}

impl ModelValidator for HubValidator {
    fn validate<'a>(
        &'a self,
        model_id: &'a str,
        token: &'a str,
    ) -> BoxFuture<'a, Result<(), ValidationError>> {
        Box::pin(async move {
            let url = self.model_url(model_id);
            debug!(%url, "validating model");
            let response = self.client.get(&url).bearer_auth(token).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ValidationError::Status(status.as_u16()));
            }
            let body: Value = response.json().await?;
            check_model_body(&body)
        })
    }
}

/// A usable model record is a JSON object naming the model.
fn check_model_body(body: &Value) -> Result<(), ValidationError> {
    let has_id = ["id", "modelId"]
        .iter()
        .any(|key| body.get(*key).and_then(Value::as_str).is_some_and(|s| !s.is_empty()));
    if has_id {
        Ok(())
    } else {
        Err(ValidationError::MissingIdentifier)
    }
}
