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

//! Query exec response types.
//!
//! These map directly to the JSON returned by the query endpoint. The
//! connection layer deserializes them and hands the `data` object to the
//! pipeline.

use crate::error::{Result, SnowflakeErrorHelper};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Outer envelope of a query response.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecResponseEnvelope {
    #[serde(default)]
    pub data: Option<ExecResponse>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub success: bool,
}

impl ExecResponseEnvelope {
    /// Unwrap the `data` object, surfacing a server-reported failure as-is.
    pub fn into_result(self) -> Result<ExecResponse> {
        if !self.success {
            let message = self.message.unwrap_or_else(|| "query failed".to_string());
            let message = match self.code {
                Some(code) => format!("{} (code {})", message, code),
                None => message,
            };
            return Err(SnowflakeErrorHelper::server().message(message));
        }
        self.data.ok_or_else(|| {
            SnowflakeErrorHelper::server().message("successful response carried no data")
        })
    }
}

/// The `data` object of a query response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Vec<SessionParameter>,
    #[serde(default, rename = "rowtype", deserialize_with = "null_as_default")]
    pub row_type: Vec<RowType>,
    /// Inline rows for JSON results.
    #[serde(default, deserialize_with = "null_as_default")]
    pub rowset: Vec<Vec<Option<String>>>,
    /// Inline Arrow IPC stream (base64-encoded in JSON, decoded by serde).
    #[serde(
        default,
        rename = "rowsetBase64",
        deserialize_with = "deserialize_base64_rowset"
    )]
    pub rowset_base64: Option<Vec<u8>>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub returned: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub query_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chunks: Vec<ExecResponseChunk>,
    /// Transient key used to decrypt every chunk of this result.
    #[serde(default)]
    pub qrmk: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chunk_headers: HashMap<String, String>,
    #[serde(default)]
    pub query_result_format: Option<String>,
    /// Comma-separated child result ids of a multi-statement query.
    #[serde(default)]
    pub result_ids: Option<String>,
    #[serde(default)]
    pub result_types: Option<String>,
}

/// Deserialize the base64-encoded inline Arrow rowset.
/// Explicit JSON `null` reads as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_base64_rowset<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) if !s.is_empty() => STANDARD
            .decode(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// Wire format of the result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    /// Row-oriented JSON text.
    #[default]
    Json,
    /// Arrow IPC stream.
    Arrow,
}

impl ResultFormat {
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(|v| v.to_ascii_lowercase()) {
            None => Ok(ResultFormat::Json),
            Some(v) if v == "json" => Ok(ResultFormat::Json),
            Some(v) if v == "arrow" || v == "arrow_force" => Ok(ResultFormat::Arrow),
            Some(other) => Err(SnowflakeErrorHelper::invalid_state()
                .message(format!("unsupported query result format '{}'", other))),
        }
    }
}

impl ExecResponse {
    pub fn result_format(&self) -> Result<ResultFormat> {
        ResultFormat::parse(self.query_result_format.as_deref())
    }

    /// Child result ids for multi-statement queries, in statement order.
    pub fn child_result_ids(&self) -> Vec<String> {
        self.result_ids
            .as_deref()
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a session parameter by name (case-insensitive).
    pub fn parameter(&self, name: &str) -> Option<&SessionParameter> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Session parameter echoed back in the response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionParameter {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl SessionParameter {
    /// Value rendered as text, whatever its JSON type.
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Column (or nested field) metadata from `rowtype`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowType {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub byte_length: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<RowType>,
}

fn default_nullable() -> bool {
    true
}

/// One entry of the chunk manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponseChunk {
    pub url: String,
    pub row_count: i64,
    #[serde(default)]
    pub uncompressed_size: i64,
    #[serde(default)]
    pub compressed_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_exec_response_deserialization() {
        let json = r#"{
            "parameters": [{"name": "CLIENT_PREFETCH_THREADS", "value": 8}],
            "rowtype": [{"name": "C1", "type": "fixed", "scale": 0, "precision": 38, "nullable": false}],
            "rowset": [["1"], [null]],
            "total": 1002,
            "returned": 2,
            "queryId": "01a2-query",
            "chunks": [
                {"url": "https://bucket.example.com/c0", "rowCount": 500, "uncompressedSize": 9000, "compressedSize": 1200},
                {"url": "https://bucket.example.com/c1", "rowCount": 500, "uncompressedSize": 9000, "compressedSize": 1100}
            ],
            "qrmk": "c2VjcmV0",
            "chunkHeaders": {},
            "queryResultFormat": "json"
        }"#;

        let response: ExecResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.query_id, "01a2-query");
        assert_eq!(response.rowset.len(), 2);
        assert_eq!(response.rowset[1][0], None);
        assert_eq!(response.chunks.len(), 2);
        assert_eq!(response.chunks[1].row_count, 500);
        assert_eq!(response.result_format().unwrap(), ResultFormat::Json);
        assert_eq!(
            response.parameter("client_prefetch_threads").unwrap().value_text(),
            "8"
        );
        assert!(response.rowset_base64.is_none());
    }

    #[test]
    fn test_null_collections_read_as_empty() {
        let json = r#"{
            "queryId": "01a2-null",
            "rowtype": null,
            "rowset": null,
            "rowsetBase64": null,
            "chunkHeaders": null,
            "chunks": null,
            "parameters": null,
            "queryResultFormat": "json"
        }"#;

        let response: ExecResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.query_id, "01a2-null");
        assert!(response.row_type.is_empty());
        assert!(response.rowset.is_empty());
        assert!(response.rowset_base64.is_none());
        assert!(response.chunk_headers.is_empty());
        assert!(response.chunks.is_empty());
        assert!(response.parameters.is_empty());

        let nested: RowType =
            serde_json::from_str(r#"{"name":"O","type":"object","fields":null}"#).unwrap();
        assert!(nested.fields.is_empty());
    }

    #[test]
    fn test_rowset_base64_is_decoded() {
        // "Hello, World!" in base64
        let json = r#"{"rowsetBase64": "SGVsbG8sIFdvcmxkIQ==", "queryResultFormat": "arrow"}"#;
        let response: ExecResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.rowset_base64.unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_empty_rowset_base64() {
        let json = r#"{"rowsetBase64": ""}"#;
        let response: ExecResponse = serde_json::from_str(json).unwrap();
        assert!(response.rowset_base64.is_none());
    }

    #[test]
    fn test_result_format_parsing() {
        assert_eq!(ResultFormat::parse(None).unwrap(), ResultFormat::Json);
        assert_eq!(ResultFormat::parse(Some("ARROW")).unwrap(), ResultFormat::Arrow);
        assert!(ResultFormat::parse(Some("parquet")).is_err());
    }

    #[test]
    fn test_child_result_ids() {
        let response = ExecResponse {
            result_ids: Some("id-1, id-2,,id-3".to_string()),
            ..Default::default()
        };
        assert_eq!(response.child_result_ids(), vec!["id-1", "id-2", "id-3"]);
        assert!(ExecResponse::default().child_result_ids().is_empty());
    }

    #[test]
    fn test_envelope_failure_is_server_error() {
        let json = r#"{"success": false, "message": "SQL compilation error", "code": "001003"}"#;
        let envelope: ExecResponseEnvelope = serde_json::from_str(json).unwrap();
        let err = envelope.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.message().contains("001003"));
    }

    #[test]
    fn test_envelope_success() {
        let json = r#"{"success": true, "data": {"queryId": "q1"}}"#;
        let envelope: ExecResponseEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.into_result().unwrap().query_id, "q1");
    }
}
