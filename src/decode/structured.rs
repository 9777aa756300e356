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

//! Recursive decoding of structured OBJECT / ARRAY / MAP values.
//!
//! Both wire formats describe nested data differently (a JSON document versus
//! Arrow child arrays), but the walk over the nested schema is the same. Each
//! format implements [`NestedCursor`] over its payload and [`decode_value`]
//! does the rest.

use crate::decode::scalar::{decode_text, DecodeOptions};
use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::schema::{ColumnMeta, ColumnType, TypeKind};
use crate::value::{StructuredValue, Value};
use serde_json::Value as JsonValue;

/// A position inside one nested value of some wire format.
pub trait NestedCursor: Sized {
    /// True when the value at this position is null (or absent).
    fn is_null(&self) -> bool;

    /// Cursor over field `index` of an object, described by `meta`.
    fn field(&self, index: usize, meta: &ColumnMeta) -> Result<Self>;

    /// Cursors over the elements of an array.
    fn elements(&self) -> Result<Vec<Self>>;

    /// Cursors over the key/value pairs of a map, in wire order.
    fn entries(&self) -> Result<Vec<(Self, Self)>>;

    /// Decode a scalar (or semi-structured) value at this position.
    fn leaf(&self, column_type: &ColumnType, options: &DecodeOptions) -> Result<Value>;
}

/// Decode the value under `cursor` according to `column_type`.
pub fn decode_value<C: NestedCursor>(
    cursor: &C,
    column_type: &ColumnType,
    options: &DecodeOptions,
) -> Result<Value> {
    if cursor.is_null() {
        return Ok(Value::Null);
    }
    if !column_type.is_structured() {
        return cursor.leaf(column_type, options);
    }

    let structured = match column_type.kind {
        TypeKind::Object => {
            let mut fields = Vec::with_capacity(column_type.fields.len());
            for (index, meta) in column_type.fields.iter().enumerate() {
                let child = cursor.field(index, meta)?;
                let value = decode_value(&child, &meta.column_type, options)?;
                fields.push((meta.name.clone(), value));
            }
            StructuredValue::Object(fields)
        }
        TypeKind::Array => {
            let element_type = nested_type(column_type, 0);
            let elements = cursor
                .elements()?
                .iter()
                .map(|element| decode_value(element, &element_type, options))
                .collect::<Result<Vec<_>>>()?;
            StructuredValue::Array(elements)
        }
        TypeKind::Map => {
            let key_type = nested_type(column_type, 0);
            let value_type = nested_type(column_type, 1);
            let entries = cursor
                .entries()?
                .iter()
                .map(|(key, value)| {
                    Ok((
                        decode_value(key, &key_type, options)?,
                        decode_value(value, &value_type, options)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            StructuredValue::Map(entries)
        }
        other => {
            return Err(SnowflakeErrorHelper::decode()
                .message(format!("{} is not a structured type", other)))
        }
    };

    Ok(Value::Structured(structured))
}

/// Nested type at `index`; a map without declared types decodes as text.
pub(crate) fn nested_type(column_type: &ColumnType, index: usize) -> ColumnType {
    column_type
        .fields
        .get(index)
        .map(|meta| meta.column_type.clone())
        .unwrap_or_else(|| ColumnType::new(TypeKind::Text))
}

/// Cursor over a parsed JSON document.
#[derive(Debug, Clone, Copy)]
pub enum JsonCursor<'a> {
    Node(&'a JsonValue),
    /// An object key standing in for a map key.
    Key(&'a str),
    /// A field the object doesn't carry.
    Missing,
}

impl<'a> JsonCursor<'a> {
    fn expected(&self, what: &str) -> crate::error::Error {
        let found = match self {
            JsonCursor::Node(JsonValue::Object(_)) => "object",
            JsonCursor::Node(JsonValue::Array(_)) => "array",
            JsonCursor::Node(JsonValue::String(_)) | JsonCursor::Key(_) => "string",
            JsonCursor::Node(JsonValue::Number(_)) => "number",
            JsonCursor::Node(JsonValue::Bool(_)) => "boolean",
            JsonCursor::Node(JsonValue::Null) | JsonCursor::Missing => "null",
        };
        SnowflakeErrorHelper::decode().message(format!("expected JSON {}, found {}", what, found))
    }
}

impl<'a> NestedCursor for JsonCursor<'a> {
    fn is_null(&self) -> bool {
        matches!(self, JsonCursor::Node(JsonValue::Null) | JsonCursor::Missing)
    }

    fn field(&self, _index: usize, meta: &ColumnMeta) -> Result<Self> {
        match self {
            JsonCursor::Node(JsonValue::Object(map)) => {
                let value = map.get(&meta.name).or_else(|| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(&meta.name))
                        .map(|(_, v)| v)
                });
                Ok(value.map(JsonCursor::Node).unwrap_or(JsonCursor::Missing))
            }
            _ => Err(self.expected("object")),
        }
    }

    fn elements(&self) -> Result<Vec<Self>> {
        match self {
            JsonCursor::Node(JsonValue::Array(items)) => {
                Ok(items.iter().map(JsonCursor::Node).collect())
            }
            _ => Err(self.expected("array")),
        }
    }

    fn entries(&self) -> Result<Vec<(Self, Self)>> {
        match self {
            JsonCursor::Node(JsonValue::Object(map)) => Ok(map
                .iter()
                .map(|(k, v)| (JsonCursor::Key(k.as_str()), JsonCursor::Node(v)))
                .collect()),
            _ => Err(self.expected("object")),
        }
    }

    fn leaf(&self, column_type: &ColumnType, options: &DecodeOptions) -> Result<Value> {
        match self {
            JsonCursor::Key(key) => decode_text(column_type, key, options),
            JsonCursor::Node(JsonValue::String(s)) => decode_text(column_type, s, options),
            JsonCursor::Node(JsonValue::Bool(b)) => {
                decode_text(column_type, if *b { "true" } else { "false" }, options)
            }
            JsonCursor::Node(JsonValue::Number(n)) => {
                decode_text(column_type, &n.to_string(), options)
            }
            // Documents nested in a VARIANT or semi-structured field stay JSON text.
            JsonCursor::Node(node @ (JsonValue::Object(_) | JsonValue::Array(_))) => {
                decode_text(column_type, &node.to_string(), options)
            }
            JsonCursor::Node(JsonValue::Null) | JsonCursor::Missing => Ok(Value::Null),
        }
    }
}

/// Parse a structured column's JSON text and decode it.
pub fn decode_json_text(
    text: &str,
    column_type: &ColumnType,
    options: &DecodeOptions,
) -> Result<Value> {
    let document: JsonValue = serde_json::from_str(text).map_err(|e| {
        SnowflakeErrorHelper::decode()
            .message(format!("invalid {} document: {}", column_type.kind, e))
    })?;
    decode_value(&JsonCursor::Node(&document), column_type, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn opts() -> DecodeOptions {
        DecodeOptions::default()
    }

    fn object_si() -> ColumnType {
        ColumnType::object(vec![
            ColumnMeta::new("s", ColumnType::new(TypeKind::Text)),
            ColumnMeta::new("i", ColumnType::new(TypeKind::Fixed)),
        ])
    }

    #[test]
    fn test_object_in_schema_order() {
        let value = decode_json_text(r#"{"i": 1, "s": "x"}"#, &object_si(), &opts()).unwrap();
        assert_eq!(
            value,
            Value::Structured(StructuredValue::Object(vec![
                ("s".to_string(), Value::Text("x".to_string())),
                ("i".to_string(), Value::Int(1)),
            ]))
        );
    }

    #[test]
    fn test_missing_field_is_null() {
        let value = decode_json_text(r#"{"s": "x"}"#, &object_si(), &opts()).unwrap();
        let object = value.as_structured().unwrap();
        assert_eq!(object.field("i"), Some(&Value::Null));
    }

    #[test]
    fn test_null_container_differs_from_empty() {
        let array = ColumnType::array(ColumnType::new(TypeKind::Fixed));
        assert_eq!(decode_json_text("null", &array, &opts()).unwrap(), Value::Null);
        assert_eq!(
            decode_json_text("[]", &array, &opts()).unwrap(),
            Value::Structured(StructuredValue::Array(vec![]))
        );
    }

    #[test]
    fn test_map_keeps_wire_order_and_types_keys() {
        let map = ColumnType::map(
            ColumnType::new(TypeKind::Fixed),
            ColumnType::new(TypeKind::Boolean),
        );
        let value = decode_json_text(r#"{"10": true, "2": null}"#, &map, &opts()).unwrap();
        assert_eq!(
            value,
            Value::Structured(StructuredValue::Map(vec![
                (Value::Int(10), Value::Bool(true)),
                (Value::Int(2), Value::Null),
            ]))
        );
    }

    #[test]
    fn test_deep_nesting() {
        // ARRAY(OBJECT(tags ARRAY(TEXT)))
        let inner = ColumnType::object(vec![ColumnMeta::new(
            "tags",
            ColumnType::array(ColumnType::new(TypeKind::Text)),
        )]);
        let column = ColumnType::array(inner);
        let value =
            decode_json_text(r#"[{"tags": ["a", null]}, null, {"tags": []}]"#, &column, &opts())
                .unwrap();

        let Value::Structured(StructuredValue::Array(items)) = value else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Value::Null);
        let tags = items[0].as_structured().unwrap().field("tags").unwrap();
        assert_eq!(
            tags,
            &Value::Structured(StructuredValue::Array(vec![
                Value::Text("a".to_string()),
                Value::Null
            ]))
        );
    }

    #[test]
    fn test_leaf_numbers_are_verbatim() {
        let column = ColumnType::object(vec![ColumnMeta::new(
            "n",
            ColumnType::new(TypeKind::Fixed),
        )]);
        let options = DecodeOptions {
            higher_precision: true,
            ..Default::default()
        };
        let value =
            decode_json_text(r#"{"n": 123456789012345678901234567890}"#, &column, &options)
                .unwrap();
        assert_eq!(
            value.as_structured().unwrap().field("n"),
            Some(&Value::BigInt(
                "123456789012345678901234567890".parse::<BigInt>().unwrap()
            ))
        );
    }

    #[test]
    fn test_variant_field_keeps_json_text() {
        let column = ColumnType::object(vec![ColumnMeta::new(
            "doc",
            ColumnType::new(TypeKind::Variant),
        )]);
        let value = decode_json_text(r#"{"doc": {"a": [1, 2]}}"#, &column, &opts()).unwrap();
        assert_eq!(
            value.as_structured().unwrap().field("doc"),
            Some(&Value::Text(r#"{"a":[1,2]}"#.to_string()))
        );
    }

    #[test]
    fn test_shape_mismatch_is_decode_error() {
        let err = decode_json_text("[1]", &object_si(), &opts()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Decode);
        assert!(err.message().contains("expected JSON object"));

        let err = decode_json_text("{not json", &object_si(), &opts()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Decode);
    }
}
