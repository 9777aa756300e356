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

//! Decoded values.
//!
//! Both wire formats decode into the same [`Value`] tree, so rows can be
//! compared for equality regardless of how the server encoded them.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use num_bigint::BigInt;
use std::ops::Index;

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// Integer outside the `i64` range (higher-precision mode only).
    BigInt(BigInt),
    /// Exact decimal `unscaled * 10^-scale` (higher-precision mode only).
    Decimal { unscaled: BigInt, scale: u32 },
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    TimestampNtz(NaiveDateTime),
    TimestampLtz(DateTime<Utc>),
    TimestampTz(DateTime<FixedOffset>),
    Structured(StructuredValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_structured(&self) -> Option<&StructuredValue> {
        match self {
            Value::Structured(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, used in scan error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Decimal { .. } => "decimal",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Binary(_) => "binary",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::TimestampNtz(_) => "timestamp_ntz",
            Value::TimestampLtz(_) => "timestamp_ltz",
            Value::TimestampTz(_) => "timestamp_tz",
            Value::Structured(StructuredValue::Object(_)) => "object",
            Value::Structured(StructuredValue::Array(_)) => "array",
            Value::Structured(StructuredValue::Map(_)) => "map",
        }
    }
}

impl From<StructuredValue> for Value {
    fn from(value: StructuredValue) -> Self {
        Value::Structured(value)
    }
}

/// Nested object, array or map payload.
///
/// Objects keep fields in schema order; maps keep entries in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    Object(Vec<(String, Value)>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl StructuredValue {
    /// Look up an object field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            StructuredValue::Object(fields) => fields
                .iter()
                .find(|(field, _)| field.eq_ignore_ascii_case(name))
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StructuredValue::Object(fields) => fields.len(),
            StructuredValue::Array(values) => values.len(),
            StructuredValue::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.0[index]
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_container_differs_from_empty() {
        let empty = Value::Structured(StructuredValue::Array(vec![]));
        assert_ne!(empty, Value::Null);
        assert!(!empty.is_null());
        assert!(empty.as_structured().unwrap().is_empty());
    }

    #[test]
    fn test_object_field_lookup() {
        let object = StructuredValue::Object(vec![
            ("s".to_string(), Value::Text("x".to_string())),
            ("i".to_string(), Value::Int(1)),
        ]);
        assert_eq!(object.field("I"), Some(&Value::Int(1)));
        assert_eq!(object.field("missing"), None);
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn test_row_indexing() {
        let row = Row::new(vec![Value::Int(5), Value::Null]);
        assert_eq!(row.len(), 2);
        assert_eq!(row[0], Value::Int(5));
        assert!(row.get(1).unwrap().is_null());
        assert!(row.get(2).is_none());
    }
}
