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

//! Collaborators the pipeline talks to over the network.
//!
//! - `ChunkHttpClient`: pooled HTTP client with retry logic for chunk downloads
//! - `ResultService`: the query service, used to load child results of a
//!   multi-statement query

pub mod http;

use crate::error::Result;
use crate::types::response::ExecResponse;
use async_trait::async_trait;

pub use http::{ChunkHttpClient, HttpClientConfig};

/// Access to results held by the query service.
///
/// Implemented by the connection layer; the pipeline only needs to load a
/// child result by its id.
#[async_trait]
pub trait ResultService: Send + Sync + std::fmt::Debug {
    /// Fetch the exec response of one child result of a multi-statement query.
    async fn get_child_result(&self, result_id: &str) -> Result<ExecResponse>;
}
