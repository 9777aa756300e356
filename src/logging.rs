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

//! Logging setup for the result-set pipeline.
//!
//! Installs a `tracing-subscriber` writing to a file or stderr.
//!
//! ## Configuration priority
//!
//! 1. `snowflake.log_level` / `snowflake.log_file` options (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `warn`
//!
//! ```bash
//! RUST_LOG=snowflake_rows=debug ./my_app
//! ```
//!
//! ```ignore
//! config.set_option("snowflake.log_level", "debug")?;
//! config.set_option("snowflake.log_file", "/tmp/rows.log")?;
//! ```

use std::sync::OnceLock;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{self, time::SystemTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

static SUBSCRIBER: OnceLock<()> = OnceLock::new();

/// Log target filtered by [`init_logging`].
const LOG_TARGET: &str = "snowflake_rows";

/// Logging options carried by [`crate::ResultStreamConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// "OFF", "ERROR", "WARN", "INFO", "DEBUG" or "TRACE".
    pub level: Option<String>,
    /// Log file path. Unset means stderr.
    pub file: Option<String>,
}

impl LogConfig {
    fn is_off(&self) -> bool {
        self.level
            .as_deref()
            .is_some_and(|level| level.eq_ignore_ascii_case("off"))
    }
}

fn filter_for(config: &LogConfig) -> EnvFilter {
    match config.level {
        Some(ref level) => EnvFilter::new(format!("{}={}", LOG_TARGET, level.to_lowercase())),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}=warn", LOG_TARGET))),
    }
}

/// Destination for log lines, and whether it understands ANSI colors.
fn writer_for(config: &LogConfig) -> std::io::Result<(BoxMakeWriter, bool)> {
    match config.file {
        Some(ref path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Ok((BoxMakeWriter::new(file), false))
        }
        None => Ok((BoxMakeWriter::new(std::io::stderr), true)),
    }
}

/// Initialize the tracing subscriber.
///
/// Runs at most once per process; the first pipeline built configures
/// logging and later calls are no-ops. An application that installed its own
/// subscriber keeps it.
pub fn init_logging(config: &LogConfig) {
    SUBSCRIBER.get_or_init(|| {
        if config.is_off() {
            return;
        }

        let (writer, ansi) = match writer_for(config) {
            Ok(destination) => destination,
            Err(e) => {
                eprintln!("snowflake-rows: cannot open log file {:?}: {}", config.file, e);
                return;
            }
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_timer(SystemTime);

        // Fails only when the application already installed a subscriber.
        let _ = tracing_subscriber::registry()
            .with(filter_for(config))
            .with(layer)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.level.is_none());
        assert!(config.file.is_none());
    }

    #[test]
    fn test_filter_uses_crate_target() {
        let config = LogConfig {
            level: Some("DEBUG".to_string()),
            file: None,
        };
        assert_eq!(filter_for(&config).to_string(), "snowflake_rows=debug");
    }

    #[test]
    fn test_off_level_is_case_insensitive() {
        let config = LogConfig {
            level: Some("OFF".to_string()),
            file: None,
        };
        assert!(config.is_off());
        assert!(!LogConfig::default().is_off());
    }

    #[test]
    fn test_log_file_is_created() {
        let path = std::env::temp_dir().join(format!("snowflake-rows-{}.log", std::process::id()));
        let config = LogConfig {
            level: None,
            file: Some(path.to_string_lossy().into_owned()),
        };
        let (_, ansi) = writer_for(&config).unwrap();
        assert!(!ansi);
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let config = LogConfig {
            level: None,
            file: Some("/nonexistent-dir/rows.log".to_string()),
        };
        assert!(writer_for(&config).is_err());
    }

    #[test]
    fn test_init_logging_off_is_noop() {
        init_logging(&LogConfig {
            level: Some("off".to_string()),
            file: None,
        });
        // Second call is ignored either way.
        init_logging(&LogConfig::default());
    }
}
