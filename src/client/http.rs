// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP client used for CloudFetch downloads.
//!
//! This module provides:
//! - Connection pooling and timeouts (via reqwest)
//! - A pluggable [`RetryPolicy`] deciding whether a failed attempt is retried
//!
//! Presigned URLs carry their own credentials, so no auth header is added.

use crate::error::{Error, Result};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Read timeout duration.
    pub read_timeout: Duration,
    /// Maximum number of retry attempts. Zero disables retries.
    pub max_retries: u32,
    /// Base delay between retry attempts (doubles each retry).
    pub retry_delay: Duration,
    /// Maximum number of idle connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            max_retries: 0,
            retry_delay: Duration::from_millis(1500),
            max_connections_per_host: 100,
            user_agent: format!("databricks-cloudfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Retry policy matching `max_retries` / `retry_delay`.
    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        if self.max_retries == 0 {
            Arc::new(NoRetry)
        } else {
            Arc::new(ExponentialBackoff {
                max_retries: self.max_retries,
                base_delay: self.retry_delay,
            })
        }
    }
}

/// Outcome of a failed HTTP attempt, as seen by a [`RetryPolicy`].
#[derive(Debug)]
pub enum AttemptFailure<'a> {
    /// The server answered with a non-2xx status.
    Status(StatusCode),
    /// The request did not produce a response.
    Transport(&'a reqwest::Error),
}

/// Decides whether a failed request attempt is retried.
pub trait RetryPolicy: Send + Sync + Debug {
    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is 1-based and counts the attempt that just failed.
    fn retry_delay(&self, attempt: u32, failure: &AttemptFailure<'_>) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn retry_delay(&self, _attempt: u32, _failure: &AttemptFailure<'_>) -> Option<Duration> {
        None
    }
}

/// Retries throttling, gateway errors, and connection failures with
/// exponential backoff.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl ExponentialBackoff {
    /// Check if the HTTP status code indicates a retryable error.
    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
                | StatusCode::BAD_GATEWAY
        )
    }

    /// Check if the request error is retryable.
    fn is_retryable_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn retry_delay(&self, attempt: u32, failure: &AttemptFailure<'_>) -> Option<Duration> {
        if attempt > self.max_retries {
            return None;
        }
        let retryable = match failure {
            AttemptFailure::Status(status) => Self::is_retryable_status(*status),
            AttemptFailure::Transport(error) => Self::is_retryable_error(error),
        };
        retryable.then(|| self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// HTTP client for downloading from cloud storage.
#[derive(Debug, Clone)]
pub struct CloudFetchHttpClient {
    client: Client,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl CloudFetchHttpClient {
    /// Creates a new HTTP client from the given configuration.
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self::with_client(client, config.retry_policy()))
    }

    /// Wrap an existing reqwest client (proxies, custom TLS, ...).
    pub fn with_client(client: Client, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            client,
            retry_policy,
        }
    }

    /// Issue a GET request, retrying as the retry policy allows.
    ///
    /// A non-2xx response that the policy does not retry is returned as
    /// `Ok`; callers decide how to treat the status.
    pub async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<Response> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let mut request_builder = self.client.get(url);
            for (name, value) in headers {
                request_builder = request_builder.header(name, value);
            }

            debug!("Executing GET {} (attempt {})", strip_query(url), attempt);

            match request_builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    match self
                        .retry_policy
                        .retry_delay(attempt, &AttemptFailure::Status(status))
                    {
                        Some(delay) => {
                            warn!(
                                "Request failed with {} (attempt {}), retrying in {:?}",
                                status, attempt, delay
                            );
                            sleep(delay).await;
                        }
                        None => return Ok(response),
                    }
                }
                Err(e) => match self
                    .retry_policy
                    .retry_delay(attempt, &AttemptFailure::Transport(&e))
                {
                    Some(delay) => {
                        warn!(
                            "Request failed with error (attempt {}): {}, retrying in {:?}",
                            attempt, e, delay
                        );
                        sleep(delay).await;
                    }
                    None => return Err(Error::Transport(e)),
                },
            }
        }
    }
}

/// URL without its query string, safe to log for presigned URLs.
pub fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
