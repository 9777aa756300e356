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

//! Error types for the result-set pipeline.
//!
//! Every error carries an [`ErrorKind`] naming the failing stage, plus an
//! optional origin (chunk ordinal, HTTP status). Errors are `Clone` so a
//! chunk failure can be parked against its ordinal and re-raised later.
//!
//! Construction goes through [`SnowflakeErrorHelper`]:
//!
//! ```ignore
//! return Err(SnowflakeErrorHelper::fetch()
//!     .chunk(3)
//!     .status(403)
//!     .message("chunk download rejected"));
//! ```

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// Chunk download failed (transport error, fatal status, retries exhausted).
    #[error("fetch error")]
    Fetch,
    /// Payload could not be decoded into rows (malformed bytes, type mismatch).
    #[error("decode error")]
    Decode,
    /// The caller cancelled the pipeline.
    #[error("cancelled")]
    Cancelled,
    /// The exec response describes an inconsistent chunk manifest.
    #[error("invalid result manifest")]
    Manifest,
    /// The server reported the query itself as failed.
    #[error("server error")]
    Server,
    #[error("invalid state")]
    InvalidState,
    #[error("invalid argument")]
    InvalidArgument,
    /// A decoded value could not be converted into the requested destination.
    #[error("scan error")]
    Scan,
}

/// Where an error came from, when known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Origin {
    pub chunk: Option<usize>,
    pub status: Option<u16>,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.chunk, self.status) {
            (Some(chunk), Some(status)) => write!(f, " (chunk {}, HTTP {})", chunk, status),
            (Some(chunk), None) => write!(f, " (chunk {})", chunk),
            (None, Some(status)) => write!(f, " (HTTP {})", status),
            (None, None) => Ok(()),
        }
    }
}

/// Error raised by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{origin}: {message}")]
pub struct Error {
    kind: ErrorKind,
    origin: Origin,
    message: String,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Ordinal of the chunk the error is attributed to, if any.
    pub fn chunk(&self) -> Option<usize> {
        self.origin.chunk
    }

    /// HTTP status returned by the storage service, if any.
    pub fn status(&self) -> Option<u16> {
        self.origin.status
    }

    /// True when the caller gave up, as opposed to the pipeline failing.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Attribute the error to a chunk unless it already names one.
    pub fn with_chunk(mut self, ordinal: usize) -> Self {
        if self.origin.chunk.is_none() {
            self.origin.chunk = Some(ordinal);
        }
        self
    }
}

/// Builder for [`Error`] values.
#[derive(Debug, Clone, Copy)]
pub struct SnowflakeErrorHelper {
    kind: ErrorKind,
    origin: Origin,
}

impl SnowflakeErrorHelper {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            origin: Origin::default(),
        }
    }

    pub fn fetch() -> Self {
        Self::new(ErrorKind::Fetch)
    }

    pub fn decode() -> Self {
        Self::new(ErrorKind::Decode)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    pub fn manifest() -> Self {
        Self::new(ErrorKind::Manifest)
    }

    pub fn server() -> Self {
        Self::new(ErrorKind::Server)
    }

    pub fn invalid_state() -> Self {
        Self::new(ErrorKind::InvalidState)
    }

    pub fn invalid_argument() -> Self {
        Self::new(ErrorKind::InvalidArgument)
    }

    pub fn scan() -> Self {
        Self::new(ErrorKind::Scan)
    }

    pub fn chunk(mut self, ordinal: usize) -> Self {
        self.origin.chunk = Some(ordinal);
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.origin.status = Some(status);
        self
    }

    pub fn message(self, message: impl Into<String>) -> Error {
        Error {
            kind: self.kind,
            origin: self.origin,
            message: message.into(),
        }
    }

    /// Error for an invalid option value.
    pub fn set_invalid_option(key: &str, value: &str) -> Error {
        Self::invalid_argument().message(format!("invalid value '{}' for option '{}'", value, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_stage_and_origin() {
        let err = SnowflakeErrorHelper::fetch()
            .chunk(3)
            .status(403)
            .message("Forbidden");
        assert_eq!(err.to_string(), "fetch error (chunk 3, HTTP 403): Forbidden");

        let err = SnowflakeErrorHelper::decode().chunk(0).message("bad json");
        assert_eq!(err.to_string(), "decode error (chunk 0): bad json");

        let err = SnowflakeErrorHelper::cancelled().message("pipeline closed");
        assert_eq!(err.to_string(), "cancelled: pipeline closed");
    }

    #[test]
    fn test_with_chunk_keeps_existing_ordinal() {
        let err = SnowflakeErrorHelper::decode().chunk(2).message("x").with_chunk(7);
        assert_eq!(err.chunk(), Some(2));

        let err = SnowflakeErrorHelper::decode().message("x").with_chunk(7);
        assert_eq!(err.chunk(), Some(7));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(SnowflakeErrorHelper::cancelled().message("x").is_cancelled());
        assert!(!SnowflakeErrorHelper::fetch().message("x").is_cancelled());
    }

    #[test]
    fn test_set_invalid_option() {
        let err = SnowflakeErrorHelper::set_invalid_option("snowflake.result.prefetch_limit", "abc");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.message().contains("snowflake.result.prefetch_limit"));
    }
}
