use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("webhook returned status {0}")]
    Status(StatusCode),

    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Relays caller-supplied JSON bodies to configured destination URLs.
/// No schema validation, no signing, no retry.
#[derive(Clone)]
pub struct WebhookRelay {
    client: reqwest::Client,
}

impl WebhookRelay {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// POST `body` unmodified to `url`, returning the upstream status.
    /// Any non-2xx answer is an error.
    pub async fn forward(&self, url: &str, body: &Value) -> Result<StatusCode, RelayError> {
        let resp = self.client.post(url).json(body).send().await?;
        let status = resp.status();

        if status.is_success() {
            Ok(status)
        } else {
            Err(RelayError::Status(status))
        }
    }
}
