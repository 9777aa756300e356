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

//! Configuration for result streaming.
//!
//! ## Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `snowflake.result.prefetch_limit` | 4 | Chunks in flight or buffered ahead of the cursor |
//! | `snowflake.result.max_retries` | 5 | Download retry attempts per chunk |
//! | `snowflake.result.retry_delay_ms` | 250 | Base backoff, doubled per attempt |
//! | `snowflake.result.max_retry_delay_ms` | 16000 | Backoff cap |
//! | `snowflake.result.retryable_statuses` | 429 | Extra retryable HTTP statuses (comma list) |
//! | `snowflake.result.retry_server_errors` | true | Retry every 5xx |
//! | `snowflake.result.chunk_ready_timeout_ms` | 30000 | Wait interval between progress logs |
//! | `snowflake.result.speed_threshold_mbps` | 0.1 | Slow download warning threshold |
//! | `snowflake.result.higher_precision` | false | Exact decimals and big integers |
//! | `snowflake.result.arrow_timestamp_unit` | ns | Unit of converted timestamp batch columns (`s`, `ms`, `us`, `ns`) |
//! | `snowflake.http.connect_timeout_ms` | 30000 | Connect timeout |
//! | `snowflake.http.request_timeout_ms` | 120000 | Per-request timeout |
//! | `snowflake.http.max_connections_per_host` | 16 | Idle pool size per host |
//! | `snowflake.log_level` | unset | `off`, `error`, `warn`, `info`, `debug`, `trace` |
//! | `snowflake.log_file` | unset | Log to this file instead of stderr |

use crate::client::http::HttpClientConfig;
use crate::decode::columnar::{BatchOptions, TimestampUnit};
use crate::error::{Result, SnowflakeErrorHelper};
use crate::logging::LogConfig;
use crate::types::response::SessionParameter;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of chunks kept in flight or buffered ahead of the cursor.
pub const DEFAULT_PREFETCH_LIMIT: usize = 4;

/// Default interval (in seconds) between "still waiting" logs for a chunk.
pub const DEFAULT_CHUNK_READY_TIMEOUT_SECS: u64 = 30;

/// Session parameter that overrides the prefetch limit.
pub const CLIENT_PREFETCH_THREADS: &str = "CLIENT_PREFETCH_THREADS";

/// Retry behaviour for chunk downloads.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay; doubles with each retry.
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Statuses retried in addition to 5xx.
    pub retryable_statuses: Vec<u16>,
    /// Whether every 5xx status is retried.
    pub retry_server_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_millis(250),
            max_retry_delay: Duration::from_secs(16),
            retryable_statuses: vec![429],
            retry_server_errors: true,
        }
    }
}

impl RetryPolicy {
    /// Whether a non-success status should be retried.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        (self.retry_server_errors && (500..600).contains(&status))
            || self.retryable_statuses.contains(&status)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }
}

/// Configuration for a result-set pipeline.
#[derive(Debug, Clone)]
pub struct ResultStreamConfig {
    /// Maximum number of chunks in flight or buffered (controls parallelism).
    pub prefetch_limit: usize,
    pub retry: RetryPolicy,
    /// How long to wait for a chunk before logging and waiting again.
    pub chunk_ready_timeout: Option<Duration>,
    /// Log warning if download speed falls below this threshold (MB/s).
    pub speed_threshold_mbps: f64,
    /// Decode numbers as exact decimals / big integers instead of lossy forms.
    pub higher_precision: bool,
    /// Unit of timestamp columns in converted record batches.
    pub arrow_timestamp_unit: TimestampUnit,
    pub http: HttpClientConfig,
    pub log: LogConfig,
}

impl Default for ResultStreamConfig {
    fn default() -> Self {
        Self {
            prefetch_limit: DEFAULT_PREFETCH_LIMIT,
            retry: RetryPolicy::default(),
            chunk_ready_timeout: Some(Duration::from_secs(DEFAULT_CHUNK_READY_TIMEOUT_SECS)),
            speed_threshold_mbps: 0.1,
            higher_precision: false,
            arrow_timestamp_unit: TimestampUnit::default(),
            http: HttpClientConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ResultStreamConfig {
    /// Set an option by its string key.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || SnowflakeErrorHelper::set_invalid_option(key, value);

        match key {
            "snowflake.result.prefetch_limit" => {
                match Self::parse_int_option(value).filter(|v| *v > 0) {
                    Some(v) => self.prefetch_limit = v as usize,
                    None => return Err(invalid()),
                }
            }
            "snowflake.result.max_retries" => {
                let v = Self::parse_int_option(value).ok_or_else(invalid)?;
                self.retry.max_retries = u32::try_from(v).map_err(|_| invalid())?;
            }
            "snowflake.result.retry_delay_ms" => {
                self.retry.retry_delay = Self::parse_millis_option(value).ok_or_else(invalid)?;
            }
            "snowflake.result.max_retry_delay_ms" => {
                self.retry.max_retry_delay = Self::parse_millis_option(value).ok_or_else(invalid)?;
            }
            "snowflake.result.retryable_statuses" => {
                self.retry.retryable_statuses = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.parse::<u16>().map_err(|_| invalid()))
                    .collect::<Result<Vec<_>>>()?;
            }
            "snowflake.result.retry_server_errors" => {
                self.retry.retry_server_errors =
                    Self::parse_bool_option(value).ok_or_else(invalid)?;
            }
            "snowflake.result.chunk_ready_timeout_ms" => {
                let timeout = Self::parse_millis_option(value).ok_or_else(invalid)?;
                self.chunk_ready_timeout = (!timeout.is_zero()).then_some(timeout);
            }
            "snowflake.result.speed_threshold_mbps" => {
                self.speed_threshold_mbps = Self::parse_float_option(value)
                    .filter(|v| *v >= 0.0)
                    .ok_or_else(invalid)?;
            }
            "snowflake.result.higher_precision" => {
                self.higher_precision = Self::parse_bool_option(value).ok_or_else(invalid)?;
            }
            "snowflake.result.arrow_timestamp_unit" => {
                self.arrow_timestamp_unit = TimestampUnit::parse(value).ok_or_else(invalid)?;
            }
            "snowflake.http.connect_timeout_ms" => {
                self.http.connect_timeout = Self::parse_millis_option(value).ok_or_else(invalid)?;
            }
            "snowflake.http.request_timeout_ms" => {
                self.http.request_timeout = Self::parse_millis_option(value).ok_or_else(invalid)?;
            }
            "snowflake.http.max_connections_per_host" => {
                let v = Self::parse_int_option(value).ok_or_else(invalid)?;
                self.http.max_connections_per_host = usize::try_from(v).map_err(|_| invalid())?;
            }
            "snowflake.log_level" => {
                self.log.level = Some(value.to_string());
            }
            "snowflake.log_file" => {
                self.log.file = Some(value.to_string());
            }
            _ => {
                return Err(SnowflakeErrorHelper::invalid_argument()
                    .message(format!("unknown option '{}'", key)))
            }
        }

        debug!("Set option {} = {}", key, value);
        Ok(())
    }

    /// Options for converting raw record batches.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            higher_precision: self.higher_precision,
            timestamp_unit: self.arrow_timestamp_unit,
        }
    }

    /// Apply session parameters echoed in an exec response.
    ///
    /// Only `CLIENT_PREFETCH_THREADS` affects the pipeline. Invalid values are
    /// logged and ignored.
    pub fn apply_session_parameters(&mut self, parameters: &[SessionParameter]) {
        let Some(param) = parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(CLIENT_PREFETCH_THREADS))
        else {
            return;
        };

        let text = param.value_text();
        match Self::parse_int_option(&text) {
            Some(v) if v > 0 => {
                debug!("Using {}={} as prefetch limit", CLIENT_PREFETCH_THREADS, v);
                self.prefetch_limit = v as usize;
            }
            _ => warn!(
                "Invalid value for {}: {}. It should be a positive integer; keeping {}",
                CLIENT_PREFETCH_THREADS, text, self.prefetch_limit
            ),
        }
    }

    /// Parse a boolean option value.
    fn parse_bool_option(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }

    /// Parse an integer option value.
    fn parse_int_option(value: &str) -> Option<i64> {
        value.trim().parse().ok()
    }

    /// Parse a float option value.
    fn parse_float_option(value: &str) -> Option<f64> {
        value.trim().parse().ok()
    }

    fn parse_millis_option(value: &str) -> Option<Duration> {
        Self::parse_int_option(value)
            .and_then(|v| u64::try_from(v).ok())
            .map(Duration::from_millis)
    }
}
