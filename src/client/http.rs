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

//! HTTP client for chunk downloads.
//!
//! This module provides a low-level HTTP client with:
//! - Connection pooling
//! - Automatic retry with capped exponential backoff
//! - Cancellation of in-flight requests and backoff sleeps
//! - Injected TLS roots and timeouts (no process-wide registry)
//!
//! Chunk locations are presigned, so requests carry no session credentials.
//! URLs and header values are never logged.

use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::config::RetryPolicy;
use reqwest::{Certificate, Client, RequestBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum number of response-body characters quoted in an error.
const ERROR_BODY_LIMIT: usize = 256;

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout, body included.
    pub request_timeout: Duration,
    /// Maximum number of idle connections kept per host.
    pub max_connections_per_host: usize,
    pub user_agent: String,
    /// Extra trusted root certificates, PEM encoded.
    pub root_certificates_pem: Vec<Vec<u8>>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            max_connections_per_host: 16,
            user_agent: format!("snowflake-rows/{}", env!("CARGO_PKG_VERSION")),
            root_certificates_pem: Vec::new(),
        }
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
enum AttemptError {
    Transient {
        status: Option<u16>,
        message: String,
    },
    Fatal {
        status: Option<u16>,
        message: String,
    },
}

/// HTTP client shared by every fetch task of a pipeline.
#[derive(Debug, Clone)]
pub struct ChunkHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl ChunkHttpClient {
    /// Creates a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent);

        for pem in &config.root_certificates_pem {
            let certificate = Certificate::from_pem(pem).map_err(|e| {
                SnowflakeErrorHelper::invalid_argument()
                    .message(format!("Invalid root certificate: {}", e))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder.build().map_err(|e| {
            SnowflakeErrorHelper::invalid_state()
                .message(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { client, config })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET `url` with `headers`, retrying transient failures per `retry`.
    ///
    /// Returns the raw body. A fired `cancel` token aborts the request or
    /// backoff sleep and yields a `Cancelled` error.
    pub async fn get_with_retry(
        &self,
        ordinal: usize,
        url: &str,
        headers: &HashMap<String, String>,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let max_attempts = retry.max_retries + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let mut builder = self.client.get(url);
            for (name, value) in headers {
                builder = builder.header(name, value);
            }

            debug!(
                "Chunk {}: GET attempt {}/{} ({} headers)",
                ordinal,
                attempts,
                max_attempts,
                headers.len()
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Chunk {}: request cancelled", ordinal);
                    return Err(Self::cancelled(ordinal));
                }
                outcome = Self::attempt(builder, retry) => outcome,
            };

            let error = match outcome {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            match error {
                AttemptError::Transient { message, .. } if attempts < max_attempts => {
                    let delay = retry.backoff(attempts);
                    warn!(
                        "Chunk {} download failed (attempt {}/{}): {}, retrying in {:?}",
                        ordinal, attempts, max_attempts, message, delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!("Chunk {}: cancelled during backoff", ordinal);
                            return Err(Self::cancelled(ordinal));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                AttemptError::Transient { status, message } => {
                    let helper = Self::fetch_error(ordinal, status);
                    return Err(helper.message(format!(
                        "giving up after {} attempts: {}",
                        attempts, message
                    )));
                }
                AttemptError::Fatal { status, message } => {
                    return Err(Self::fetch_error(ordinal, status).message(message));
                }
            }
        }
    }

    async fn attempt(
        builder: RequestBuilder,
        retry: &RetryPolicy,
    ) -> std::result::Result<Vec<u8>, AttemptError> {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if Self::is_retryable_error(&e) => {
                return Err(AttemptError::Transient {
                    status: None,
                    message: Self::describe(&e),
                })
            }
            Err(e) => {
                return Err(AttemptError::Fatal {
                    status: None,
                    message: Self::describe(&e),
                })
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .await
                .map(|body| body.to_vec())
                .map_err(|e| AttemptError::Transient {
                    status: None,
                    message: format!("failed to read body: {}", Self::describe(&e)),
                });
        }

        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        let message = format!("HTTP {} - {}", status.as_u16(), body.trim());

        if retry.is_retryable_status(status.as_u16()) {
            Err(AttemptError::Transient {
                status: Some(status.as_u16()),
                message,
            })
        } else {
            Err(AttemptError::Fatal {
                status: Some(status.as_u16()),
                message,
            })
        }
    }

    /// Check if the request error is retryable.
    fn is_retryable_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
    }

    /// Error text without the request URL, which carries a presigned signature.
    fn describe(error: &reqwest::Error) -> String {
        let mut text = error.to_string();
        if let Some(url) = error.url() {
            text = text.replace(url.as_str(), "<chunk url>");
        }
        text
    }

    fn fetch_error(ordinal: usize, status: Option<u16>) -> SnowflakeErrorHelper {
        let helper = SnowflakeErrorHelper::fetch().chunk(ordinal);
        match status {
            Some(status) => helper.status(status),
            None => helper,
        }
    }

    fn cancelled(ordinal: usize) -> crate::error::Error {
        SnowflakeErrorHelper::cancelled()
            .chunk(ordinal)
            .message("chunk download cancelled")
    }
}
