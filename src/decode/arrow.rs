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

//! Columnar (Arrow IPC) result decoding.
//!
//! Result chunks are Arrow IPC streams; the inline part arrives base64
//! encoded in `rowsetBase64`. The server picks the narrowest physical
//! encoding per column, so scalar extraction is driven by the Arrow data type
//! rather than by the logical type alone:
//!
//! - FIXED: Int8..Int64 (scaled by the column scale) or Decimal128
//! - TIME: Int32/Int64 scaled by the column scale
//! - TIMESTAMP_NTZ / LTZ: scaled Int64, or struct `{epoch, fraction}`
//! - TIMESTAMP_TZ: struct `{epoch, timezone}` (epoch scaled) or
//!   `{epoch, fraction, timezone}`

use crate::decode::scalar::{
    date_from_days, decode_text, fixed_value, instant_from_parts, split_scaled, time_from_parts,
    tz_from_parts, DecodeOptions,
};
use crate::decode::structured::{decode_value, NestedCursor};
use crate::decode::FormatDecoder;
use crate::error::{Error, Result, SnowflakeErrorHelper};
use crate::types::chunk::RawChunkBytes;
use crate::types::response::{ExecResponse, ResultFormat};
use crate::types::schema::{ColumnMeta, ColumnType, ResultSchemaRef, TypeKind};
use crate::value::{Row, Value};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type,
};
use arrow_array::{Array, RecordBatch, StructArray};
use arrow_ipc::reader::StreamReader;
use arrow_schema::DataType;
use num_bigint::BigInt;
use std::io::Cursor;
use tracing::trace;

/// Parse an Arrow IPC stream into record batches.
///
/// A single chunk may contain several batches.
pub fn parse_arrow_ipc(data: &[u8]) -> Result<Vec<RecordBatch>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let reader = StreamReader::try_new(Cursor::new(data), None).map_err(|e| {
        SnowflakeErrorHelper::decode().message(format!("Failed to create Arrow IPC reader: {}", e))
    })?;

    reader
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            SnowflakeErrorHelper::decode().message(format!("Failed to read Arrow batches: {}", e))
        })
}

/// Decodes Arrow record batches into [`Row`]s.
#[derive(Debug, Clone)]
pub struct ArrowRowDecoder {
    schema: ResultSchemaRef,
    options: DecodeOptions,
}

impl ArrowRowDecoder {
    pub fn new(schema: ResultSchemaRef, options: DecodeOptions) -> Self {
        Self { schema, options }
    }

    /// Transpose record batches into rows.
    pub fn batches_to_rows(&self, batches: &[RecordBatch]) -> Result<Vec<Row>> {
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        let mut rows = Vec::with_capacity(total);

        for batch in batches {
            if batch.num_columns() != self.schema.len() {
                return Err(SnowflakeErrorHelper::decode().message(format!(
                    "batch has {} columns, schema has {}",
                    batch.num_columns(),
                    self.schema.len()
                )));
            }

            for row in 0..batch.num_rows() {
                let values = batch
                    .columns()
                    .iter()
                    .zip(self.schema.columns())
                    .map(|(array, column)| {
                        let cursor = ArrowCursor::new(array.as_ref(), row);
                        decode_value(&cursor, &column.column_type, &self.options).map_err(|e| {
                            SnowflakeErrorHelper::decode().message(format!(
                                "column {} of row {}: {}",
                                column.name,
                                row,
                                e.message()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                rows.push(Row::new(values));
            }
        }

        Ok(rows)
    }
}

impl FormatDecoder for ArrowRowDecoder {
    fn format(&self) -> ResultFormat {
        ResultFormat::Arrow
    }

    fn decode_chunk(&self, raw: &RawChunkBytes) -> Result<Vec<Row>> {
        let batches = parse_arrow_ipc(&raw.bytes).map_err(|e| e.with_chunk(raw.ordinal))?;
        trace!(
            "Chunk {}: parsed {} Arrow batches",
            raw.ordinal,
            batches.len()
        );
        self.batches_to_rows(&batches)
            .map_err(|e| e.with_chunk(raw.ordinal))
    }

    fn decode_inline(&self, response: &ExecResponse) -> Result<Vec<Row>> {
        match response.rowset_base64.as_deref() {
            Some(data) => self.batches_to_rows(&parse_arrow_ipc(data)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Cursor over one row of an Arrow array (possibly a nested child array).
#[derive(Debug, Clone, Copy)]
pub struct ArrowCursor<'a> {
    array: &'a dyn Array,
    row: usize,
}

impl<'a> ArrowCursor<'a> {
    pub fn new(array: &'a dyn Array, row: usize) -> Self {
        Self { array, row }
    }

    fn mismatch(&self, kind: TypeKind) -> Error {
        SnowflakeErrorHelper::decode().message(format!(
            "unexpected Arrow type {} for {} value",
            self.array.data_type(),
            kind
        ))
    }

    fn leaf_fixed(&self, column_type: &ColumnType, options: &DecodeOptions) -> Result<Value> {
        let array = self.array;
        if let Some(v) = int_at(array, self.row) {
            return Ok(fixed_value(BigInt::from(v), column_type.scale, options));
        }
        if let Some(decimals) = array.as_primitive_opt::<Decimal128Type>() {
            let scale = u32::try_from(decimals.scale()).map_err(|_| self.mismatch(TypeKind::Fixed))?;
            return Ok(fixed_value(
                BigInt::from(decimals.value(self.row)),
                scale,
                options,
            ));
        }
        if let Some(floats) = array.as_primitive_opt::<Float64Type>() {
            return Ok(Value::Float(floats.value(self.row)));
        }
        self.leaf_text(column_type, options)
            .ok_or_else(|| self.mismatch(TypeKind::Fixed))?
    }

    /// Scalars that arrive as strings go through the text rules.
    fn leaf_text(&self, column_type: &ColumnType, options: &DecodeOptions) -> Option<Result<Value>> {
        let array = self.array;
        if let Some(strings) = array.as_string_opt::<i32>() {
            return Some(decode_text(column_type, strings.value(self.row), options));
        }
        if let Some(strings) = array.as_string_opt::<i64>() {
            return Some(decode_text(column_type, strings.value(self.row), options));
        }
        None
    }

    /// Seconds and nanos of a timestamp in either encoding.
    fn epoch_parts(&self, kind: TypeKind, scale: u32) -> Result<(i64, u32)> {
        if let Some(v) = int_at(self.array, self.row) {
            return split_scaled(v, scale);
        }
        let parts = self
            .array
            .as_struct_opt()
            .ok_or_else(|| self.mismatch(kind))?;
        let epoch = struct_int(parts, 0, self.row).ok_or_else(|| self.mismatch(kind))?;
        let fraction = struct_int(parts, 1, self.row).ok_or_else(|| self.mismatch(kind))?;
        let nanos = u32::try_from(fraction).map_err(|_| self.mismatch(kind))?;
        Ok((epoch, nanos))
    }

    fn leaf_tz(&self, column_type: &ColumnType, options: &DecodeOptions) -> Result<Value> {
        let kind = TypeKind::TimestampTz;
        let Some(parts) = self.array.as_struct_opt() else {
            return self.leaf_text(column_type, options).ok_or_else(|| self.mismatch(kind))?;
        };
        let (secs, nanos, offset) = match parts.num_columns() {
            2 => {
                let epoch = struct_int(parts, 0, self.row).ok_or_else(|| self.mismatch(kind))?;
                let offset = struct_int(parts, 1, self.row).ok_or_else(|| self.mismatch(kind))?;
                let (secs, nanos) = split_scaled(epoch, column_type.scale)?;
                (secs, nanos, offset)
            }
            3 => {
                let secs = struct_int(parts, 0, self.row).ok_or_else(|| self.mismatch(kind))?;
                let fraction = struct_int(parts, 1, self.row).ok_or_else(|| self.mismatch(kind))?;
                let offset = struct_int(parts, 2, self.row).ok_or_else(|| self.mismatch(kind))?;
                let nanos = u32::try_from(fraction).map_err(|_| self.mismatch(kind))?;
                (secs, nanos, offset)
            }
            _ => return Err(self.mismatch(kind)),
        };
        Ok(Value::TimestampTz(tz_from_parts(secs, nanos, offset)?))
    }
}

/// Integer at `row` for any signed integer encoding.
fn int_at(array: &dyn Array, row: usize) -> Option<i64> {
    match array.data_type() {
        DataType::Int8 => array.as_primitive_opt::<Int8Type>().map(|a| a.value(row) as i64),
        DataType::Int16 => array.as_primitive_opt::<Int16Type>().map(|a| a.value(row) as i64),
        DataType::Int32 => array.as_primitive_opt::<Int32Type>().map(|a| a.value(row) as i64),
        DataType::Int64 => array.as_primitive_opt::<Int64Type>().map(|a| a.value(row)),
        _ => None,
    }
}

fn struct_int(parts: &StructArray, index: usize, row: usize) -> Option<i64> {
    if index >= parts.num_columns() {
        return None;
    }
    int_at(parts.column(index).as_ref(), row)
}

impl<'a> NestedCursor for ArrowCursor<'a> {
    fn is_null(&self) -> bool {
        self.array.is_null(self.row)
    }

    fn field(&self, index: usize, meta: &ColumnMeta) -> Result<Self> {
        let array: &'a dyn Array = self.array;
        let fields = array
            .as_struct_opt()
            .ok_or_else(|| self.mismatch(TypeKind::Object))?;
        let child = fields
            .column_by_name(&meta.name)
            .or_else(|| (index < fields.num_columns()).then(|| fields.column(index)))
            .ok_or_else(|| {
                SnowflakeErrorHelper::decode()
                    .message(format!("struct has no field '{}'", meta.name))
            })?;
        Ok(ArrowCursor::new(child.as_ref(), self.row))
    }

    fn elements(&self) -> Result<Vec<Self>> {
        let array: &'a dyn Array = self.array;
        if let Some(list) = array.as_list_opt::<i32>() {
            let offsets = list.value_offsets();
            let (start, end) = (offsets[self.row] as usize, offsets[self.row + 1] as usize);
            let values = list.values().as_ref();
            return Ok((start..end).map(|i| ArrowCursor::new(values, i)).collect());
        }
        if let Some(list) = array.as_list_opt::<i64>() {
            let offsets = list.value_offsets();
            let (start, end) = (offsets[self.row] as usize, offsets[self.row + 1] as usize);
            let values = list.values().as_ref();
            return Ok((start..end).map(|i| ArrowCursor::new(values, i)).collect());
        }
        Err(self.mismatch(TypeKind::Array))
    }

    fn entries(&self) -> Result<Vec<(Self, Self)>> {
        let array: &'a dyn Array = self.array;
        let map = array
            .as_map_opt()
            .ok_or_else(|| self.mismatch(TypeKind::Map))?;
        let offsets = map.value_offsets();
        let (start, end) = (offsets[self.row] as usize, offsets[self.row + 1] as usize);
        let keys = map.keys().as_ref();
        let values = map.values().as_ref();
        Ok((start..end)
            .map(|i| (ArrowCursor::new(keys, i), ArrowCursor::new(values, i)))
            .collect())
    }

    fn leaf(&self, column_type: &ColumnType, options: &DecodeOptions) -> Result<Value> {
        let kind = column_type.kind;
        let array = self.array;
        let row = self.row;

        match kind {
            TypeKind::Fixed => self.leaf_fixed(column_type, options),
            TypeKind::Real => {
                if let Some(floats) = array.as_primitive_opt::<Float64Type>() {
                    Ok(Value::Float(floats.value(row)))
                } else if let Some(floats) = array.as_primitive_opt::<Float32Type>() {
                    Ok(Value::Float(floats.value(row) as f64))
                } else {
                    self.leaf_text(column_type, options)
                        .ok_or_else(|| self.mismatch(kind))?
                }
            }
            TypeKind::Boolean => match array.as_boolean_opt() {
                Some(bools) => Ok(Value::Bool(bools.value(row))),
                None => self.leaf_text(column_type, options)
                    .ok_or_else(|| self.mismatch(kind))?,
            },
            TypeKind::Date => {
                if let Some(days) = array.as_primitive_opt::<Date32Type>() {
                    Ok(Value::Date(date_from_days(days.value(row) as i64)?))
                } else if let Some(days) = int_at(array, row) {
                    Ok(Value::Date(date_from_days(days)?))
                } else {
                    self.leaf_text(column_type, options)
                        .ok_or_else(|| self.mismatch(kind))?
                }
            }
            TypeKind::Time => match int_at(array, row) {
                Some(v) => {
                    let (secs, nanos) = split_scaled(v, column_type.scale)?;
                    Ok(Value::Time(time_from_parts(secs, nanos)?))
                }
                None => self.leaf_text(column_type, options)
                    .ok_or_else(|| self.mismatch(kind))?,
            },
            TypeKind::TimestampNtz | TypeKind::TimestampLtz => {
                if let Some(result) = self.leaf_text(column_type, options) {
                    return result;
                }
                let (secs, nanos) = self.epoch_parts(kind, column_type.scale)?;
                let instant = instant_from_parts(secs, nanos)?;
                Ok(if kind == TypeKind::TimestampNtz {
                    Value::TimestampNtz(instant.naive_utc())
                } else {
                    Value::TimestampLtz(instant)
                })
            }
            TypeKind::TimestampTz => self.leaf_tz(column_type, options),
            TypeKind::Binary => {
                if let Some(bytes) = array.as_binary_opt::<i32>() {
                    Ok(Value::Binary(bytes.value(row).to_vec()))
                } else if let Some(bytes) = array.as_binary_opt::<i64>() {
                    Ok(Value::Binary(bytes.value(row).to_vec()))
                } else if let Some(bytes) = array.as_fixed_size_binary_opt() {
                    Ok(Value::Binary(bytes.value(row).to_vec()))
                } else {
                    self.leaf_text(column_type, options)
                        .ok_or_else(|| self.mismatch(kind))?
                }
            }
            TypeKind::Text
            | TypeKind::Variant
            | TypeKind::Object
            | TypeKind::Array
            | TypeKind::Map => self
                .leaf_text(column_type, options)
                .ok_or_else(|| self.mismatch(kind))?,
        }
    }
}
