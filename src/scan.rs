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

//! Conversion of decoded values into caller-owned destinations.
//!
//! - [`FromValue`]: scalar and container conversions
//! - `Option<T>`: nullable destinations
//! - `Vec<T>` / `HashMap<K, V>`: arrays and maps (and objects keyed by field)
//! - [`StructuredScanner`] with the [`Structured`] wrapper: typed objects
//! - [`ScanDestination`]: the object-safe sink used by `scan`

use crate::decode::scalar::format_decimal;
use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::schema::ColumnMeta;
use crate::value::{Row, StructuredValue, Value};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::hash::Hash;

/// Build a value of `Self` from a decoded cell.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T> {
    if value.is_null() {
        return Err(SnowflakeErrorHelper::scan().message(format!("cannot scan NULL into {}", target)));
    }
    Err(SnowflakeErrorHelper::scan().message(format!(
        "cannot scan {} value into {}",
        value.type_name(),
        target
    )))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::BigInt(v) => i64::try_from(v).or_else(|_| mismatch(value, "i64")),
            Value::Decimal { unscaled, scale: 0 } => {
                i64::try_from(unscaled).or_else(|_| mismatch(value, "i64"))
            }
            _ => mismatch(value, "i64"),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value).or_else(|_| mismatch(value, "i32"))?;
        i32::try_from(wide).map_err(|_| {
            SnowflakeErrorHelper::scan().message(format!("{} is out of range for i32", wide))
        })
    }
}

impl FromValue for u8 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value).or_else(|_| mismatch(value, "u8"))?;
        u8::try_from(wide).map_err(|_| {
            SnowflakeErrorHelper::scan().message(format!("{} is out of range for u8", wide))
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::BigInt(v) => v.to_string().parse().or_else(|_| mismatch(value, "f64")),
            Value::Decimal { unscaled, scale } => format_decimal(unscaled, *scale)
                .parse()
                .or_else(|_| mismatch(value, "f64")),
            _ => mismatch(value, "f64"),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            _ => mismatch(value, "bool"),
        }
    }
}

/// Any non-null scalar renders as text; structured values do not.
impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            Value::Bool(v) => Ok(v.to_string()),
            Value::Int(v) => Ok(v.to_string()),
            Value::BigInt(v) => Ok(v.to_string()),
            Value::Decimal { unscaled, scale } => Ok(format_decimal(unscaled, *scale)),
            Value::Float(v) => Ok(v.to_string()),
            Value::Binary(v) => Ok(hex::encode_upper(v)),
            Value::Date(v) => Ok(v.to_string()),
            Value::Time(v) => Ok(v.to_string()),
            Value::TimestampNtz(v) => Ok(v.to_string()),
            Value::TimestampLtz(v) => Ok(v.to_rfc3339()),
            Value::TimestampTz(v) => Ok(v.to_rfc3339()),
            Value::Null | Value::Structured(_) => mismatch(value, "String"),
        }
    }
}

impl FromValue for BigInt {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(BigInt::from(*v)),
            Value::BigInt(v) => Ok(v.clone()),
            Value::Decimal { unscaled, scale: 0 } => Ok(unscaled.clone()),
            _ => mismatch(value, "BigInt"),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Date(v) => Ok(*v),
            _ => mismatch(value, "NaiveDate"),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Time(v) => Ok(*v),
            _ => mismatch(value, "NaiveTime"),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::TimestampNtz(v) => Ok(*v),
            Value::TimestampLtz(v) => Ok(v.naive_utc()),
            Value::TimestampTz(v) => Ok(v.naive_local()),
            _ => mismatch(value, "NaiveDateTime"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::TimestampLtz(v) => Ok(*v),
            Value::TimestampTz(v) => Ok(v.with_timezone(&Utc)),
            Value::TimestampNtz(v) => Ok(v.and_utc()),
            _ => mismatch(value, "DateTime<Utc>"),
        }
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::TimestampTz(v) => Ok(*v),
            Value::TimestampLtz(v) => Ok(v.fixed_offset()),
            _ => mismatch(value, "DateTime<FixedOffset>"),
        }
    }
}

/// `NULL` becomes `None`; anything else must convert to `T`.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Arrays element by element; BINARY byte by byte (so `Vec<u8>` scans binary).
impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Structured(StructuredValue::Array(values)) => {
                values.iter().map(T::from_value).collect()
            }
            Value::Binary(bytes) => bytes
                .iter()
                .map(|b| T::from_value(&Value::Int(i64::from(*b))))
                .collect(),
            _ => mismatch(value, "Vec"),
        }
    }
}

/// Maps entry by entry; objects keyed by field name.
impl<K, V> FromValue for HashMap<K, V>
where
    K: FromValue + Eq + Hash,
    V: FromValue,
{
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Structured(StructuredValue::Map(entries)) => entries
                .iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            Value::Structured(StructuredValue::Object(fields)) => fields
                .iter()
                .map(|(name, v)| Ok((K::from_value(&Value::Text(name.clone()))?, V::from_value(v)?)))
                .collect(),
            _ => mismatch(value, "HashMap"),
        }
    }
}

/// Read-only view of an OBJECT's fields, handed to [`StructuredScanner`].
#[derive(Debug, Clone, Copy)]
pub struct ObjectFields<'a> {
    fields: &'a [(String, Value)],
}

impl<'a> ObjectFields<'a> {
    pub fn new(fields: &'a [(String, Value)]) -> Self {
        Self { fields }
    }

    /// Raw value of a field, matched case-insensitively.
    pub fn value(&self, name: &str) -> Option<&'a Value> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Convert a field. A missing field converts like `NULL`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        T::from_value(self.value(name).unwrap_or(&Value::Null)).map_err(|e| {
            SnowflakeErrorHelper::scan().message(format!("field {}: {}", name, e.message()))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A caller type that can be filled from an OBJECT value.
pub trait StructuredScanner: Sized {
    fn scan_fields(fields: ObjectFields<'_>) -> Result<Self>;
}

/// Wrapper that scans an OBJECT through `T`'s [`StructuredScanner`] impl.
#[derive(Debug, Clone, PartialEq)]
pub struct Structured<T>(pub T);

impl<T> Structured<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: StructuredScanner> FromValue for Structured<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Structured(StructuredValue::Object(fields)) => {
                T::scan_fields(ObjectFields::new(fields)).map(Structured)
            }
            _ => mismatch(value, "structured object"),
        }
    }
}

/// Object-safe destination for one column.
pub trait ScanDestination {
    fn scan_value(&mut self, value: &Value) -> Result<()>;
}

impl<T: FromValue> ScanDestination for T {
    fn scan_value(&mut self, value: &Value) -> Result<()> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// Copy every column of `row` into the matching destination.
pub fn scan_row(
    row: &Row,
    columns: &[ColumnMeta],
    destinations: &mut [&mut dyn ScanDestination],
) -> Result<()> {
    if destinations.len() != row.len() {
        return Err(SnowflakeErrorHelper::scan().message(format!(
            "expected {} destination arguments, got {}",
            row.len(),
            destinations.len()
        )));
    }

    for (index, (value, destination)) in row.values().iter().zip(destinations.iter_mut()).enumerate()
    {
        destination.scan_value(value).map_err(|e| {
            let name = columns.get(index).map(|c| c.name.as_str()).unwrap_or("?");
            SnowflakeErrorHelper::scan().message(format!(
                "column {} ({}): {}",
                index,
                name,
                e.message()
            ))
        })?;
    }
    Ok(())
}
