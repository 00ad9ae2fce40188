//! HTTP seam between the resolver and chain-data providers

use crate::errors::{AppError, AppResult, ProviderError, ProviderResult};
use async_trait::async_trait;
use std::time::Duration;

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of the resolver
///
/// Non-2xx answers are returned as responses, not errors; only failures to
/// complete the exchange are [`ProviderError`]s.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> ProviderResult<HttpResponse>;
}

/// Production transport backed by `reqwest`
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout_seconds: u64,
}

impl ReqwestTransport {
    pub fn new(timeout_seconds: u64) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("stamp-tx-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout_seconds,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> ProviderResult<HttpResponse> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    timeout_seconds: self.timeout_seconds,
                    url: url.to_string(),
                }
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read body from {}: {}", url, e)))?;

        Ok(HttpResponse { status, body })
    }
}
