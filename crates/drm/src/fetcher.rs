// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! HTTP transport for the license protocol, behind a trait so tests can
//! inject canned responses.

use async_trait::async_trait;
use packkit_core::{PackKitError, Result};
use std::time::Duration;

/// Minimal HTTP client surface the key source needs.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetch the body at `url` with HTTP GET.
    async fn get(&self, url: &str) -> Result<String>;

    /// Post `data` to `url` and return the response body.
    async fn post(&self, url: &str, data: &str) -> Result<String>;
}

/// Timeout until the whole license response must have arrived.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// reqwest-backed fetcher used outside of tests.
pub struct UrlFetcher {
    client: reqwest::Client,
}

impl UrlFetcher {
    /// Build a fetcher with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("packkit-fetcher/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PackKitError::Internal(format!("could not build http client: {e}")))?;
        Ok(Self { client })
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let response = response
            .error_for_status()
            .map_err(|e| PackKitError::Http(format!("http request failed: {e}")))?;
        response
            .text()
            .await
            .map_err(|e| PackKitError::Http(format!("could not read http body: {e}")))
    }

    fn map_send_error(error: reqwest::Error) -> PackKitError {
        if error.is_timeout() {
            PackKitError::TimedOut(format!("http request timed out: {error}"))
        } else {
            PackKitError::Http(format!("http request failed: {error}"))
        }
    }
}

#[async_trait]
impl HttpFetcher for UrlFetcher {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(Self::map_send_error)?;
        Self::read_body(response).await
    }

    async fn post(&self, url: &str, data: &str) -> Result<String> {
        let response = self
            .client
            .post(url)
            .body(data.to_string())
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::read_body(response).await
    }
}
