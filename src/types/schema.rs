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

//! Result schema built from the exec response's `rowtype` metadata.
//!
//! Structured OBJECT/ARRAY/MAP columns carry their nested schema in
//! [`ColumnType::fields`]:
//! - OBJECT: one entry per field, in declaration order
//! - ARRAY: a single entry describing the element
//! - MAP: two entries, key then value
//!
//! OBJECT and ARRAY without nested fields are semi-structured and decode to
//! their JSON text.

use crate::types::response::RowType;
use std::fmt;
use std::sync::Arc;

/// Logical column type as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Fixed,
    Real,
    Text,
    Boolean,
    Date,
    Time,
    TimestampNtz,
    TimestampLtz,
    TimestampTz,
    Binary,
    Variant,
    Object,
    Array,
    Map,
}

impl TypeKind {
    /// Map a server type name (case-insensitive) to a kind.
    ///
    /// Unknown names fall back to `Text`.
    pub fn from_type_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "fixed" | "number" | "decimal" | "int" | "integer" | "bigint" => TypeKind::Fixed,
            "real" | "float" | "double" => TypeKind::Real,
            "text" | "varchar" | "string" | "char" => TypeKind::Text,
            "boolean" => TypeKind::Boolean,
            "date" => TypeKind::Date,
            "time" => TypeKind::Time,
            "timestamp_ntz" | "timestamp" | "datetime" => TypeKind::TimestampNtz,
            "timestamp_ltz" => TypeKind::TimestampLtz,
            "timestamp_tz" => TypeKind::TimestampTz,
            "binary" | "varbinary" => TypeKind::Binary,
            "variant" => TypeKind::Variant,
            "object" => TypeKind::Object,
            "array" => TypeKind::Array,
            "map" => TypeKind::Map,
            other => {
                tracing::debug!("Unknown column type '{}', decoding as TEXT", other);
                TypeKind::Text
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Fixed => "FIXED",
            TypeKind::Real => "REAL",
            TypeKind::Text => "TEXT",
            TypeKind::Boolean => "BOOLEAN",
            TypeKind::Date => "DATE",
            TypeKind::Time => "TIME",
            TypeKind::TimestampNtz => "TIMESTAMP_NTZ",
            TypeKind::TimestampLtz => "TIMESTAMP_LTZ",
            TypeKind::TimestampTz => "TIMESTAMP_TZ",
            TypeKind::Binary => "BINARY",
            TypeKind::Variant => "VARIANT",
            TypeKind::Object => "OBJECT",
            TypeKind::Array => "ARRAY",
            TypeKind::Map => "MAP",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full type of a column or nested field.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    pub kind: TypeKind,
    pub precision: Option<u32>,
    pub scale: u32,
    pub length: Option<u64>,
    pub nullable: bool,
    /// Nested schema for structured types.
    pub fields: Vec<ColumnMeta>,
}

impl ColumnType {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            precision: None,
            scale: 0,
            length: None,
            nullable: true,
            fields: Vec::new(),
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_fields(mut self, fields: Vec<ColumnMeta>) -> Self {
        self.fields = fields;
        self
    }

    /// A structured OBJECT with the given fields.
    pub fn object(fields: Vec<ColumnMeta>) -> Self {
        Self::new(TypeKind::Object).with_fields(fields)
    }

    /// A structured ARRAY of `element`.
    pub fn array(element: ColumnType) -> Self {
        Self::new(TypeKind::Array).with_fields(vec![ColumnMeta::new("", element)])
    }

    /// A MAP from `key` to `value`.
    pub fn map(key: ColumnType, value: ColumnType) -> Self {
        Self::new(TypeKind::Map).with_fields(vec![
            ColumnMeta::new("key", key),
            ColumnMeta::new("value", value),
        ])
    }

    /// True for OBJECT/ARRAY/MAP columns that carry a nested schema.
    pub fn is_structured(&self) -> bool {
        match self.kind {
            TypeKind::Object | TypeKind::Array => !self.fields.is_empty(),
            TypeKind::Map => true,
            _ => false,
        }
    }
}

/// Named column (or nested field) metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    fn from_row_type(row_type: &RowType) -> Self {
        let mut column_type = ColumnType::new(TypeKind::from_type_name(&row_type.type_name));
        column_type.precision = row_type.precision;
        column_type.scale = row_type.scale.unwrap_or(0);
        column_type.length = row_type.length.or(row_type.byte_length);
        column_type.nullable = row_type.nullable;
        column_type.fields = row_type.fields.iter().map(Self::from_row_type).collect();

        Self {
            name: row_type.name.clone().unwrap_or_default(),
            column_type,
        }
    }
}

/// Ordered column metadata for one result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSchema {
    columns: Vec<ColumnMeta>,
}

pub type ResultSchemaRef = Arc<ResultSchema>;

impl ResultSchema {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self { columns }
    }

    pub fn from_row_types(row_types: &[RowType]) -> Self {
        Self::new(row_types.iter().map(ColumnMeta::from_row_type).collect())
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.column_type.clone()).collect()
    }
}
