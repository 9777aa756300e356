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

//! Row-text (JSON) result decoding.
//!
//! Chunk bodies are a comma-separated run of JSON arrays without the
//! enclosing brackets, e.g. `["1","a"],["2",null]`. Every field is either
//! `null` or a string; structured columns carry their JSON document as that
//! string.

use crate::decode::scalar::{decode_text, DecodeOptions};
use crate::decode::structured::decode_json_text;
use crate::decode::FormatDecoder;
use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::chunk::RawChunkBytes;
use crate::types::response::{ExecResponse, ResultFormat};
use crate::types::schema::ResultSchemaRef;
use crate::value::{Row, Value};
use tracing::trace;

/// Decodes JSON rowsets into [`Row`]s.
#[derive(Debug, Clone)]
pub struct JsonRowDecoder {
    schema: ResultSchemaRef,
    options: DecodeOptions,
}

impl JsonRowDecoder {
    pub fn new(schema: ResultSchemaRef, options: DecodeOptions) -> Self {
        Self { schema, options }
    }

    /// Decode rows whose fields are already split into optional strings.
    pub fn decode_rows(&self, rows: &[Vec<Option<String>>]) -> Result<Vec<Row>> {
        rows.iter()
            .enumerate()
            .map(|(index, fields)| self.decode_row(index, fields))
            .collect()
    }

    fn decode_row(&self, index: usize, fields: &[Option<String>]) -> Result<Row> {
        if fields.len() != self.schema.len() {
            return Err(SnowflakeErrorHelper::decode().message(format!(
                "row {} has {} fields, expected {}",
                index,
                fields.len(),
                self.schema.len()
            )));
        }

        let values = fields
            .iter()
            .zip(self.schema.columns())
            .map(|(field, column)| {
                let ty = &column.column_type;
                let value = match field {
                    None => Ok(Value::Null),
                    Some(text) if ty.is_structured() => decode_json_text(text, ty, &self.options),
                    Some(text) => decode_text(ty, text, &self.options),
                };
                value.map_err(|e| {
                    SnowflakeErrorHelper::decode().message(format!(
                        "column {} of row {}: {}",
                        column.name,
                        index,
                        e.message()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Row::new(values))
    }
}

/// Wrap a bracketless chunk body into a JSON array and split it into fields.
pub(crate) fn parse_chunk_body(body: &[u8]) -> Result<Vec<Vec<Option<String>>>> {
    let mut wrapped = Vec::with_capacity(body.len() + 2);
    wrapped.push(b'[');
    wrapped.extend_from_slice(body);
    wrapped.push(b']');

    serde_json::from_slice(&wrapped).map_err(|e| {
        SnowflakeErrorHelper::decode().message(format!("malformed JSON chunk: {}", e))
    })
}

impl FormatDecoder for JsonRowDecoder {
    fn format(&self) -> ResultFormat {
        ResultFormat::Json
    }

    fn decode_chunk(&self, raw: &RawChunkBytes) -> Result<Vec<Row>> {
        let rows = parse_chunk_body(&raw.bytes).map_err(|e| e.with_chunk(raw.ordinal))?;
        trace!("Chunk {}: parsed {} JSON rows", raw.ordinal, rows.len());
        self.decode_rows(&rows).map_err(|e| e.with_chunk(raw.ordinal))
    }

    fn decode_inline(&self, response: &ExecResponse) -> Result<Vec<Row>> {
        self.decode_rows(&response.rowset)
    }
}
