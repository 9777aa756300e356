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

//! Type definitions for the result-set pipeline.
//!
//! This module contains data structures organized by domain:
//! - `response`: exec response types as returned by the query endpoint
//! - `schema`: column metadata and logical types
//! - `chunk`: chunk manifest and raw chunk payloads
//! - `config`: pipeline configuration and option parsing

pub mod chunk;
pub mod config;
pub mod response;
pub mod schema;

// Re-export commonly used types
pub use chunk::{ChunkDescriptor, ChunkManifest, RawChunkBytes};
pub use config::{ResultStreamConfig, RetryPolicy};
pub use response::{
    ExecResponse, ExecResponseChunk, ExecResponseEnvelope, ResultFormat, RowType,
    SessionParameter,
};
pub use schema::{ColumnMeta, ColumnType, ResultSchema, ResultSchemaRef, TypeKind};
