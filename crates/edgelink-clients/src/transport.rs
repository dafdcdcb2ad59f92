//! Shared HTTP plumbing for the typed Core clients.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::CORRELATION_HEADER;

/// Result alias for client calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Failure talking to a Core endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection refused, DNS failure, request timeout.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered 2xx but the body did not parse.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether the failure was a 404 from the endpoint.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Owns the connection pool and base URL for one Core endpoint.
#[derive(Debug, Clone)]
pub struct Transport {
    base: String,
    client: reqwest::Client,
}

impl Transport {
    /// Build a transport with a per-request timeout baked into the pool.
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        correlation: &str,
    ) -> ClientResult<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .header(CORRELATION_HEADER, correlation)
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn get_text(&self, path: &str) -> ClientResult<String> {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .text()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// POST a JSON body; Core answers created ids as plain text.
    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        correlation: &str,
    ) -> ClientResult<String> {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .header(CORRELATION_HEADER, correlation)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .text()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn put_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        correlation: &str,
    ) -> ClientResult<()> {
        let response = self
            .client
            .put(format!("{}{}", self.base, path))
            .header(CORRELATION_HEADER, correlation)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    /// PUT with no body, for path-encoded state updates.
    pub async fn put_empty(&self, path: &str, correlation: &str) -> ClientResult<()> {
        let response = self
            .client
            .put(format!("{}{}", self.base, path))
            .header(CORRELATION_HEADER, correlation)
            .send()
            .await
            .map_err(|e| ClientError::Unreachable(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}
