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

//! Native Arrow batches from the server's physical encodings.
//!
//! Wire batches carry storage encodings (scaled integers for FIXED, TIME and
//! timestamps, `{epoch, fraction, timezone}` structs for TIMESTAMP_TZ). Raw
//! batch access hands out batches rewritten into native Arrow types instead,
//! so the schema depends only on the column types and the options:
//!
//! | Snowflake | Arrow |
//! |-----------|-------|
//! | FIXED, scale 0 | `Int64` (`Decimal128` with higher precision) |
//! | FIXED, scale > 0 | `Float64` (`Decimal128` with higher precision) |
//! | REAL | `Float64` |
//! | BOOLEAN | `Boolean` |
//! | DATE | `Date32` |
//! | TIME | `Time64(ns)` |
//! | TIMESTAMP_NTZ | `Timestamp(unit)` |
//! | TIMESTAMP_LTZ / TZ | `Timestamp(unit, "UTC")` |
//! | BINARY | `Binary` |
//! | structured OBJECT / ARRAY / MAP | `Struct` / `List` / `Map` of the above |
//! | anything else | `Utf8` |

use crate::decode::arrow::ArrowCursor;
use crate::decode::scalar::{format_decimal, DecodeOptions};
use crate::decode::structured::{decode_value, nested_type};
use crate::error::{Error, Result, SnowflakeErrorHelper};
use crate::types::schema::{ColumnType, ResultSchema, ResultSchemaRef, TypeKind};
use crate::value::{StructuredValue, Value};
use arrow_array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float64Array, Int64Array,
    ListArray, MapArray, RecordBatch, RecordBatchOptions, StringArray, StructArray,
    Time64NanosecondArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray,
};
use arrow_buffer::{NullBuffer, OffsetBuffer};
use arrow_schema::{DataType, Field, FieldRef, Fields, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Datelike, Timelike, Utc};
use num_bigint::BigInt;
use std::sync::Arc;
use tracing::trace;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Unit of converted timestamp columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampUnit {
    Second,
    Millisecond,
    Microsecond,
    #[default]
    Nanosecond,
}

impl TimestampUnit {
    /// Parse `s`, `ms`, `us` or `ns` (or the unit's full name).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s" | "second" => Some(Self::Second),
            "ms" | "millisecond" => Some(Self::Millisecond),
            "us" | "microsecond" => Some(Self::Microsecond),
            "ns" | "nanosecond" => Some(Self::Nanosecond),
            _ => None,
        }
    }

    pub fn time_unit(self) -> TimeUnit {
        match self {
            Self::Second => TimeUnit::Second,
            Self::Millisecond => TimeUnit::Millisecond,
            Self::Microsecond => TimeUnit::Microsecond,
            Self::Nanosecond => TimeUnit::Nanosecond,
        }
    }
}

/// Options shaping the converted schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Keep FIXED columns exact as `Decimal128`.
    pub higher_precision: bool,
    pub timestamp_unit: TimestampUnit,
}

/// Arrow type a column converts to.
pub fn target_type(column_type: &ColumnType, options: &BatchOptions) -> DataType {
    let unit = options.timestamp_unit.time_unit();
    match column_type.kind {
        TypeKind::Fixed if options.higher_precision => DataType::Decimal128(
            column_type.precision.unwrap_or(38).clamp(1, 38) as u8,
            column_type.scale.min(38) as i8,
        ),
        TypeKind::Fixed if column_type.scale == 0 => DataType::Int64,
        TypeKind::Fixed | TypeKind::Real => DataType::Float64,
        TypeKind::Boolean => DataType::Boolean,
        TypeKind::Date => DataType::Date32,
        TypeKind::Time => DataType::Time64(TimeUnit::Nanosecond),
        TypeKind::TimestampNtz => DataType::Timestamp(unit, None),
        TypeKind::TimestampLtz | TypeKind::TimestampTz => {
            DataType::Timestamp(unit, Some("UTC".into()))
        }
        TypeKind::Binary => DataType::Binary,
        TypeKind::Object if column_type.is_structured() => DataType::Struct(
            column_type
                .fields
                .iter()
                .map(|meta| Field::new(&meta.name, target_type(&meta.column_type, options), true))
                .collect::<Fields>(),
        ),
        TypeKind::Array if column_type.is_structured() => DataType::List(Arc::new(Field::new(
            "item",
            target_type(&nested_type(column_type, 0), options),
            true,
        ))),
        TypeKind::Map => {
            let entries = Fields::from(vec![
                Field::new("key", target_type(&nested_type(column_type, 0), options), false),
                Field::new("value", target_type(&nested_type(column_type, 1), options), true),
            ]);
            DataType::Map(
                Arc::new(Field::new("entries", DataType::Struct(entries), false)),
                false,
            )
        }
        // Text, semi-structured and unknown types travel as strings.
        _ => DataType::Utf8,
    }
}

/// Converted Arrow schema of a result.
pub fn arrow_schema_for(schema: &ResultSchema, options: &BatchOptions) -> SchemaRef {
    let fields: Vec<Field> = schema
        .columns()
        .iter()
        .map(|col| {
            Field::new(
                &col.name,
                target_type(&col.column_type, options),
                col.column_type.nullable,
            )
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Rewrites wire batches into the converted schema.
#[derive(Debug, Clone)]
pub struct BatchConverter {
    schema: ResultSchemaRef,
    target: SchemaRef,
    decode: DecodeOptions,
}

impl BatchConverter {
    pub fn new(schema: ResultSchemaRef, options: BatchOptions, decode: &DecodeOptions) -> Self {
        let target = arrow_schema_for(&schema, &options);
        // Leaves are read exactly and narrowed by the target type.
        let decode = DecodeOptions {
            higher_precision: true,
            formats: decode.formats.clone(),
        };
        Self {
            schema,
            target,
            decode,
        }
    }

    /// Schema of every converted batch.
    pub fn schema(&self) -> SchemaRef {
        self.target.clone()
    }

    pub fn convert(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        if batch.num_columns() != self.schema.len() {
            return Err(SnowflakeErrorHelper::decode().message(format!(
                "batch has {} columns, schema has {}",
                batch.num_columns(),
                self.schema.len()
            )));
        }

        let columns = batch
            .columns()
            .iter()
            .zip(self.schema.columns())
            .zip(self.target.fields())
            .map(|((array, column), field)| {
                let values = (0..batch.num_rows())
                    .map(|row| {
                        decode_value(
                            &ArrowCursor::new(array.as_ref(), row),
                            &column.column_type,
                            &self.decode,
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                build_array(values, &column.column_type, field.data_type())
            })
            .zip(self.schema.columns())
            .map(|(result, column)| {
                result.map_err(|e| {
                    SnowflakeErrorHelper::decode()
                        .message(format!("column {}: {}", column.name, e.message()))
                })
            })
            .collect::<Result<Vec<ArrayRef>>>()?;

        trace!(
            "Converted batch of {} rows, {} columns",
            batch.num_rows(),
            columns.len()
        );
        let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
        RecordBatch::try_new_with_options(self.target.clone(), columns, &options)
            .map_err(arrow_error)
    }

    pub fn convert_all(&self, batches: &[RecordBatch]) -> Result<Vec<RecordBatch>> {
        batches.iter().map(|batch| self.convert(batch)).collect()
    }
}

fn arrow_error(e: arrow_schema::ArrowError) -> Error {
    SnowflakeErrorHelper::decode().message(format!("failed to build Arrow array: {}", e))
}

fn mismatch(value: &Value, data_type: &DataType) -> Error {
    SnowflakeErrorHelper::decode().message(format!(
        "cannot store {} value as {}",
        value.type_name(),
        data_type
    ))
}

fn validity(values: &[Value]) -> Option<NullBuffer> {
    values
        .iter()
        .any(Value::is_null)
        .then(|| NullBuffer::from(values.iter().map(|v| !v.is_null()).collect::<Vec<bool>>()))
}

/// Leaf values mapped one by one; nulls stay null.
fn leaves<T>(
    values: &[Value],
    data_type: &DataType,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => Ok(None),
            other => convert(other)
                .map(Some)
                .ok_or_else(|| mismatch(other, data_type)),
        })
        .collect()
}

fn build_array(values: Vec<Value>, column_type: &ColumnType, data_type: &DataType) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(leaves(&values, data_type, as_i64)?)),
        DataType::Float64 => Arc::new(Float64Array::from(leaves(&values, data_type, as_f64)?)),
        DataType::Decimal128(precision, scale) => {
            let unscaled = leaves(&values, data_type, |v| as_i128(v, *scale))?;
            Arc::new(
                Decimal128Array::from(unscaled)
                    .with_precision_and_scale(*precision, *scale)
                    .map_err(arrow_error)?,
            )
        }
        DataType::Boolean => Arc::new(BooleanArray::from(leaves(&values, data_type, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })?)),
        DataType::Date32 => Arc::new(Date32Array::from(leaves(&values, data_type, |v| match v {
            Value::Date(d) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
            _ => None,
        })?)),
        DataType::Time64(TimeUnit::Nanosecond) => {
            Arc::new(Time64NanosecondArray::from(leaves(&values, data_type, |v| match v {
                Value::Time(t) => Some(
                    i64::from(t.num_seconds_from_midnight()) * 1_000_000_000
                        + i64::from(t.nanosecond()),
                ),
                _ => None,
            })?))
        }
        DataType::Timestamp(unit, timezone) => {
            let instants = leaves(&values, data_type, |v| {
                instant_of(v).and_then(|instant| in_unit(&instant, unit))
            })?;
            timestamp_array(instants, unit, timezone.clone())
        }
        DataType::Binary => Arc::new(BinaryArray::from_iter(leaves(
            &values,
            data_type,
            |v| match v {
                Value::Binary(b) => Some(b.clone()),
                _ => None,
            },
        )?)),
        DataType::Utf8 => Arc::new(StringArray::from_iter(leaves(&values, data_type, |v| {
            match v {
                Value::Text(s) => Some(s.clone()),
                _ => None,
            }
        })?)),
        DataType::Struct(fields) => build_struct(values, column_type, fields)?,
        DataType::List(item) => build_list(values, column_type, item)?,
        DataType::Map(entries, sorted) => build_map(values, column_type, entries, *sorted)?,
        other => {
            return Err(SnowflakeErrorHelper::decode()
                .message(format!("no conversion to Arrow type {}", other)))
        }
    };
    Ok(array)
}

fn build_struct(values: Vec<Value>, column_type: &ColumnType, fields: &Fields) -> Result<ArrayRef> {
    let nulls = validity(&values);
    let mut children: Vec<Vec<Value>> = vec![Vec::with_capacity(values.len()); fields.len()];

    for value in values {
        let mut pairs = match value {
            Value::Structured(StructuredValue::Object(pairs)) => pairs.into_iter(),
            Value::Null => Vec::new().into_iter(),
            other => return Err(mismatch(&other, &DataType::Struct(fields.clone()))),
        };
        for child in children.iter_mut() {
            child.push(pairs.next().map(|(_, v)| v).unwrap_or(Value::Null));
        }
    }

    let arrays = children
        .into_iter()
        .zip(fields.iter())
        .zip(column_type.fields.iter())
        .map(|((child, field), meta)| build_array(child, &meta.column_type, field.data_type()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(
        StructArray::try_new(fields.clone(), arrays, nulls).map_err(arrow_error)?,
    ))
}

fn build_list(values: Vec<Value>, column_type: &ColumnType, item: &FieldRef) -> Result<ArrayRef> {
    let nulls = validity(&values);
    let mut lengths = Vec::with_capacity(values.len());
    let mut flat = Vec::new();

    for value in values {
        match value {
            Value::Structured(StructuredValue::Array(elements)) => {
                lengths.push(elements.len());
                flat.extend(elements);
            }
            Value::Null => lengths.push(0),
            other => return Err(mismatch(&other, &DataType::List(item.clone()))),
        }
    }

    let elements = build_array(flat, &nested_type(column_type, 0), item.data_type())?;
    Ok(Arc::new(
        ListArray::try_new(item.clone(), OffsetBuffer::from_lengths(lengths), elements, nulls)
            .map_err(arrow_error)?,
    ))
}

fn build_map(
    values: Vec<Value>,
    column_type: &ColumnType,
    entries: &FieldRef,
    sorted: bool,
) -> Result<ArrayRef> {
    let DataType::Struct(entry_fields) = entries.data_type() else {
        return Err(SnowflakeErrorHelper::decode().message("map entries must be a struct"));
    };
    let nulls = validity(&values);
    let mut lengths = Vec::with_capacity(values.len());
    let (mut keys, mut items) = (Vec::new(), Vec::new());

    for value in values {
        match value {
            Value::Structured(StructuredValue::Map(pairs)) => {
                lengths.push(pairs.len());
                for (key, item) in pairs {
                    keys.push(key);
                    items.push(item);
                }
            }
            Value::Null => lengths.push(0),
            other => return Err(mismatch(&other, &DataType::Map(entries.clone(), sorted))),
        }
    }

    let columns = vec![
        build_array(keys, &nested_type(column_type, 0), entry_fields[0].data_type())?,
        build_array(items, &nested_type(column_type, 1), entry_fields[1].data_type())?,
    ];
    let entry_array = StructArray::try_new(entry_fields.clone(), columns, None).map_err(arrow_error)?;
    Ok(Arc::new(
        MapArray::try_new(
            entries.clone(),
            OffsetBuffer::from_lengths(lengths),
            entry_array,
            nulls,
            sorted,
        )
        .map_err(arrow_error)?,
    ))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::BigInt(v) => i64::try_from(v).ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(v) => Some(*v),
        Value::Int(v) => Some(*v as f64),
        Value::BigInt(v) => v.to_string().parse().ok(),
        Value::Decimal { unscaled, scale } => format_decimal(unscaled, *scale).parse().ok(),
        _ => None,
    }
}

/// Unscaled `i128` at `scale`; values needing more fraction digits don't fit.
fn as_i128(value: &Value, scale: i8) -> Option<i128> {
    let target = u32::try_from(scale).ok()?;
    let (unscaled, from) = match value {
        Value::Int(v) => (BigInt::from(*v), 0),
        Value::BigInt(v) => (v.clone(), 0),
        Value::Decimal { unscaled, scale } => (unscaled.clone(), *scale),
        _ => return None,
    };
    let exponent = target.checked_sub(from)?;
    i128::try_from(unscaled * BigInt::from(10u32).pow(exponent)).ok()
}

fn instant_of(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::TimestampNtz(naive) => Some(naive.and_utc()),
        Value::TimestampLtz(instant) => Some(*instant),
        Value::TimestampTz(instant) => Some(instant.with_timezone(&Utc)),
        _ => None,
    }
}

/// `None` when the instant doesn't fit an `i64` count of `unit`.
fn in_unit(instant: &DateTime<Utc>, unit: &TimeUnit) -> Option<i64> {
    let secs = instant.timestamp();
    let nanos = i64::from(instant.timestamp_subsec_nanos());
    match unit {
        TimeUnit::Second => Some(secs),
        TimeUnit::Millisecond => secs.checked_mul(1_000)?.checked_add(nanos / 1_000_000),
        TimeUnit::Microsecond => secs.checked_mul(1_000_000)?.checked_add(nanos / 1_000),
        TimeUnit::Nanosecond => secs.checked_mul(1_000_000_000)?.checked_add(nanos),
    }
}

fn timestamp_array(values: Vec<Option<i64>>, unit: &TimeUnit, timezone: Option<Arc<str>>) -> ArrayRef {
    match unit {
        TimeUnit::Second => Arc::new(TimestampSecondArray::from(values).with_timezone_opt(timezone)),
        TimeUnit::Millisecond => {
            Arc::new(TimestampMillisecondArray::from(values).with_timezone_opt(timezone))
        }
        TimeUnit::Microsecond => {
            Arc::new(TimestampMicrosecondArray::from(values).with_timezone_opt(timezone))
        }
        TimeUnit::Nanosecond => {
            Arc::new(TimestampNanosecondArray::from(values).with_timezone_opt(timezone))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::schema::ColumnMeta;
    use arrow_array::cast::AsArray;
    use arrow_array::types::{
        Decimal128Type, Float64Type, Int64Type, Time64NanosecondType, TimestampMillisecondType,
        TimestampNanosecondType,
    };
    use arrow_array::{Array, Int32Array, StringArray};
    use chrono::NaiveDate;

    fn converter(columns: Vec<ColumnMeta>, options: BatchOptions) -> BatchConverter {
        BatchConverter::new(
            Arc::new(ResultSchema::new(columns)),
            options,
            &DecodeOptions::default(),
        )
    }

    fn wire_batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        RecordBatch::try_from_iter(columns).unwrap()
    }

    #[test]
    fn test_target_types() {
        let defaults = BatchOptions::default();
        let precise = BatchOptions {
            higher_precision: true,
            timestamp_unit: TimestampUnit::Microsecond,
        };
        let scaled = ColumnType::new(TypeKind::Fixed).with_precision(10).with_scale(2);

        assert_eq!(target_type(&ColumnType::new(TypeKind::Fixed), &defaults), DataType::Int64);
        assert_eq!(target_type(&scaled, &defaults), DataType::Float64);
        assert_eq!(target_type(&scaled, &precise), DataType::Decimal128(10, 2));
        assert_eq!(
            target_type(&ColumnType::new(TypeKind::Time), &defaults),
            DataType::Time64(TimeUnit::Nanosecond)
        );
        assert_eq!(
            target_type(&ColumnType::new(TypeKind::TimestampNtz), &precise),
            DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        assert_eq!(
            target_type(&ColumnType::new(TypeKind::TimestampTz), &defaults),
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
        );
        assert_eq!(
            target_type(&ColumnType::new(TypeKind::Variant), &defaults),
            DataType::Utf8
        );
        // OBJECT without a nested schema is semi-structured text.
        assert_eq!(
            target_type(&ColumnType::new(TypeKind::Object), &defaults),
            DataType::Utf8
        );
    }

    #[test]
    fn test_timestamp_unit_parse() {
        assert_eq!(TimestampUnit::parse("ms"), Some(TimestampUnit::Millisecond));
        assert_eq!(TimestampUnit::parse(" US "), Some(TimestampUnit::Microsecond));
        assert_eq!(TimestampUnit::parse("second"), Some(TimestampUnit::Second));
        assert_eq!(TimestampUnit::parse("original"), None);
    }

    #[test]
    fn test_scaled_integers_become_native() {
        let converter = converter(
            vec![
                ColumnMeta::new("ID", ColumnType::new(TypeKind::Fixed)),
                ColumnMeta::new("PRICE", ColumnType::new(TypeKind::Fixed).with_scale(2)),
                ColumnMeta::new("T", ColumnType::new(TypeKind::Time).with_scale(3)),
                ColumnMeta::new("NTZ", ColumnType::new(TypeKind::TimestampNtz).with_scale(3)),
            ],
            BatchOptions::default(),
        );
        let batch = wire_batch(vec![
            ("ID", Arc::new(Int32Array::from(vec![Some(7), None])) as ArrayRef),
            ("PRICE", Arc::new(Int64Array::from(vec![1999, -5]))),
            ("T", Arc::new(Int64Array::from(vec![47_655_500, 0]))),
            ("NTZ", Arc::new(Int64Array::from(vec![1_704_448_800_250, 0]))),
        ]);

        let converted = converter.convert(&batch).unwrap();
        assert_eq!(converted.schema(), converter.schema());

        let ids = converted.column(0).as_primitive::<Int64Type>();
        assert_eq!(ids.value(0), 7);
        assert!(ids.is_null(1));

        let prices = converted.column(1).as_primitive::<Float64Type>();
        assert_eq!(prices.value(0), 19.99);
        assert_eq!(prices.value(1), -0.05);

        let times = converted.column(2).as_primitive::<Time64NanosecondType>();
        assert_eq!(times.value(0), 47_655_500_000_000);

        let stamps = converted.column(3).as_primitive::<TimestampNanosecondType>();
        assert_eq!(stamps.value(0), 1_704_448_800_250_000_000);
    }

    #[test]
    fn test_higher_precision_keeps_decimals() {
        let converter = converter(
            vec![ColumnMeta::new(
                "AMOUNT",
                ColumnType::new(TypeKind::Fixed).with_precision(38).with_scale(2),
            )],
            BatchOptions {
                higher_precision: true,
                ..Default::default()
            },
        );
        let batch = wire_batch(vec![(
            "AMOUNT",
            Arc::new(
                arrow_array::Decimal128Array::from(vec![Some(12_345_678_901_234_567_890_i128), None])
                    .with_precision_and_scale(38, 2)
                    .unwrap(),
            ) as ArrayRef,
        )]);

        let converted = converter.convert(&batch).unwrap();
        let amounts = converted.column(0).as_primitive::<Decimal128Type>();
        assert_eq!(amounts.value(0), 12_345_678_901_234_567_890_i128);
        assert!(amounts.is_null(1));
        assert_eq!(
            converted.schema().field(0).data_type(),
            &DataType::Decimal128(38, 2)
        );
    }

    #[test]
    fn test_timestamp_tz_struct_in_millis() {
        let column = ColumnType::new(TypeKind::TimestampTz).with_scale(9);
        let converter = converter(
            vec![ColumnMeta::new("TZ", column)],
            BatchOptions {
                timestamp_unit: TimestampUnit::Millisecond,
                ..Default::default()
            },
        );
        let parts = StructArray::from(vec![
            (
                Arc::new(Field::new("epoch", DataType::Int64, true)),
                Arc::new(Int64Array::from(vec![1_704_448_800])) as ArrayRef,
            ),
            (
                Arc::new(Field::new("fraction", DataType::Int32, true)),
                Arc::new(Int32Array::from(vec![250_000_000])) as ArrayRef,
            ),
            (
                Arc::new(Field::new("timezone", DataType::Int32, true)),
                Arc::new(Int32Array::from(vec![1500])) as ArrayRef,
            ),
        ]);
        let batch = wire_batch(vec![("TZ", Arc::new(parts) as ArrayRef)]);

        let converted = converter.convert(&batch).unwrap();
        let stamps = converted.column(0).as_primitive::<TimestampMillisecondType>();
        assert_eq!(stamps.value(0), 1_704_448_800_250);
        assert_eq!(stamps.timezone(), Some("UTC"));
    }

    #[test]
    fn test_structured_columns_convert_recursively() {
        let object = ColumnType::object(vec![
            ColumnMeta::new("WHEN", ColumnType::new(TypeKind::TimestampLtz).with_scale(3)),
            ColumnMeta::new("QTY", ColumnType::new(TypeKind::Fixed).with_scale(1)),
        ]);
        let converter = converter(
            vec![ColumnMeta::new("OBJ", object)],
            BatchOptions::default(),
        );
        let wire = StructArray::try_new(
            Fields::from(vec![
                Field::new("WHEN", DataType::Int64, true),
                Field::new("QTY", DataType::Int64, true),
            ]),
            vec![
                Arc::new(Int64Array::from(vec![1_000, 0])) as ArrayRef,
                Arc::new(Int64Array::from(vec![25, 0])),
            ],
            Some(NullBuffer::from(vec![true, false])),
        )
        .unwrap();
        let batch = wire_batch(vec![("OBJ", Arc::new(wire) as ArrayRef)]);

        let converted = converter.convert(&batch).unwrap();
        let objects = converted.column(0).as_struct();
        assert!(objects.is_null(1));
        assert_eq!(
            objects.column(0).as_primitive::<TimestampNanosecondType>().value(0),
            1_000_000_000
        );
        assert_eq!(objects.column(1).as_primitive::<Float64Type>().value(0), 2.5);
        assert_eq!(
            objects.fields()[0].data_type(),
            &DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
        );
    }

    #[test]
    fn test_array_and_map_columns() {
        let converter = converter(
            vec![
                ColumnMeta::new(
                    "DATES",
                    ColumnType::array(ColumnType::new(TypeKind::Date)),
                ),
                ColumnMeta::new(
                    "M",
                    ColumnType::map(
                        ColumnType::new(TypeKind::Text),
                        ColumnType::new(TypeKind::Fixed).with_scale(2),
                    ),
                ),
            ],
            BatchOptions::default(),
        );

        let dates = ListArray::try_new(
            Arc::new(Field::new("item", DataType::Int32, true)),
            OffsetBuffer::from_lengths([2, 0]),
            Arc::new(Int32Array::from(vec![19_727, 0])),
            Some(NullBuffer::from(vec![true, false])),
        )
        .unwrap();
        let entries = StructArray::try_new(
            Fields::from(vec![
                Field::new("key", DataType::Utf8, false),
                Field::new("value", DataType::Int64, true),
            ]),
            vec![
                Arc::new(StringArray::from(vec!["a"])) as ArrayRef,
                Arc::new(Int64Array::from(vec![150])),
            ],
            None,
        )
        .unwrap();
        let map = MapArray::try_new(
            Arc::new(Field::new("entries", entries.data_type().clone(), false)),
            OffsetBuffer::from_lengths([1, 0]),
            entries,
            None,
            false,
        )
        .unwrap();
        let batch = wire_batch(vec![
            ("DATES", Arc::new(dates) as ArrayRef),
            ("M", Arc::new(map) as ArrayRef),
        ]);

        let converted = converter.convert(&batch).unwrap();
        assert_eq!(converted.schema(), converter.schema());

        let lists = converted.column(0).as_list::<i32>();
        assert!(lists.is_null(1));
        let first = lists.value(0);
        let days = first.as_primitive::<arrow_array::types::Date32Type>();
        assert_eq!(
            days.value(0),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().num_days_from_ce()
                - UNIX_EPOCH_DAYS_FROM_CE
        );
        assert_eq!(days.value(1), 0);

        let maps = converted.column(1).as_map();
        assert_eq!(maps.keys().as_string::<i32>().value(0), "a");
        assert_eq!(maps.values().as_primitive::<Float64Type>().value(0), 1.5);
        assert_eq!(maps.value_length(1), 0);
    }

    #[test]
    fn test_out_of_range_values_fail_conversion() {
        let ntz = converter(
            vec![ColumnMeta::new("NTZ", ColumnType::new(TypeKind::TimestampNtz))],
            BatchOptions::default(),
        );
        // Year 9999 overflows nanoseconds since the epoch.
        let batch = wire_batch(vec![(
            "NTZ",
            Arc::new(Int64Array::from(vec![253_402_300_799])) as ArrayRef,
        )]);
        let err = ntz.convert(&batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.message().contains("NTZ"));

        let coarse = converter(
            vec![ColumnMeta::new("NTZ", ColumnType::new(TypeKind::TimestampNtz))],
            BatchOptions {
                timestamp_unit: TimestampUnit::Second,
                ..Default::default()
            },
        );
        assert!(coarse.convert(&batch).is_ok());
    }

    #[test]
    fn test_column_count_mismatch() {
        let converter = converter(
            vec![ColumnMeta::new("A", ColumnType::new(TypeKind::Text))],
            BatchOptions::default(),
        );
        let batch = wire_batch(vec![
            ("A", Arc::new(StringArray::from(vec!["x"])) as ArrayRef),
            ("B", Arc::new(StringArray::from(vec!["y"]))),
        ]);
        assert_eq!(converter.convert(&batch).unwrap_err().kind(), ErrorKind::Decode);
    }
}
