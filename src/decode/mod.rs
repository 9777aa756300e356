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

//! Row decoding for both result wire formats.
//!
//! - [`json`]: row-text rowsets
//! - [`arrow`]: Arrow IPC streams
//! - [`scalar`]: conversion rules shared by both
//! - [`structured`]: the recursive OBJECT/ARRAY/MAP walk shared by both
//! - [`datetime`]: session output formats for temporal text
//! - [`columnar`]: physical Arrow batches to native Arrow types

pub mod arrow;
pub mod columnar;
pub mod datetime;
pub mod json;
pub mod scalar;
pub mod structured;

pub use arrow::{parse_arrow_ipc, ArrowRowDecoder};
pub use columnar::{BatchConverter, TimestampUnit};
pub use datetime::OutputFormats;
pub use json::JsonRowDecoder;
pub use scalar::DecodeOptions;

use crate::error::Result;
use crate::types::chunk::RawChunkBytes;
use crate::types::response::{ExecResponse, ResultFormat};
use crate::types::schema::ResultSchemaRef;
use crate::value::Row;
use std::sync::Arc;

/// Rows of one chunk (or of the inline rowset when `ordinal` is `None`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedChunk {
    pub ordinal: Option<usize>,
    pub rows: Vec<Row>,
}

impl DecodedChunk {
    pub fn inline(rows: Vec<Row>) -> Self {
        Self {
            ordinal: None,
            rows,
        }
    }

    pub fn remote(ordinal: usize, rows: Vec<Row>) -> Self {
        Self {
            ordinal: Some(ordinal),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Turns one wire format into rows.
pub trait FormatDecoder: Send + Sync {
    fn format(&self) -> ResultFormat;

    /// Decode a downloaded chunk payload.
    fn decode_chunk(&self, raw: &RawChunkBytes) -> Result<Vec<Row>>;

    /// Decode the rows embedded in the exec response.
    fn decode_inline(&self, response: &ExecResponse) -> Result<Vec<Row>>;
}

/// Pick the decoder for a result format.
pub fn decoder_for(
    format: ResultFormat,
    schema: ResultSchemaRef,
    options: DecodeOptions,
) -> Arc<dyn FormatDecoder> {
    match format {
        ResultFormat::Json => Arc::new(JsonRowDecoder::new(schema, options)),
        ResultFormat::Arrow => Arc::new(ArrowRowDecoder::new(schema, options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::ResultSchema;

    #[test]
    fn test_decoder_for_format() {
        let schema = Arc::new(ResultSchema::default());
        let options = DecodeOptions::default();
        assert_eq!(
            decoder_for(ResultFormat::Json, schema.clone(), options.clone()).format(),
            ResultFormat::Json
        );
        assert_eq!(
            decoder_for(ResultFormat::Arrow, schema, options).format(),
            ResultFormat::Arrow
        );
    }

    #[test]
    fn test_decoded_chunk_constructors() {
        let chunk = DecodedChunk::remote(2, vec![Row::default()]);
        assert_eq!(chunk.ordinal, Some(2));
        assert_eq!(chunk.len(), 1);
        assert!(DecodedChunk::inline(Vec::new()).is_empty());
    }
}
