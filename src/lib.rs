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

//! Streaming result sets for Snowflake
//!
//! This crate turns a query's exec response into rows. It covers everything
//! between "the server answered" and "the caller scans a row":
//!
//! - Inline rows embedded in the response
//! - Remote chunks downloaded from presigned storage locations, with SSE-C
//!   headers, retry and gzip / LZ4 decompression
//! - Bounded, ordered prefetching of chunks on the tokio runtime
//! - JSON and Arrow wire formats decoding to the same [`Value`]s, including
//!   structured OBJECT / ARRAY / MAP columns
//! - Multi-statement results chained through child result ids
//! - Raw Arrow record batches for callers that want columnar data
//!
//! Query submission, sessions and authentication are out of scope: the
//! caller supplies the [`ExecResponse`] and, for multi-statement queries, a
//! [`ResultService`] that loads child results.
//!
//! ## Example
//!
//! ```ignore
//! use snowflake_rows::{ResultSetFactory, ResultStreamConfig};
//! use std::sync::Arc;
//!
//! let mut config = ResultStreamConfig::default();
//! config.set_option("snowflake.result.prefetch_limit", "8")?;
//!
//! let factory = Arc::new(ResultSetFactory::new(config, tokio::runtime::Handle::current())?);
//! let mut result_set = factory.create_result_set(&response).await?;
//! loop {
//!     while result_set.advance().await? {
//!         let (mut id, mut name) = (0i64, None::<String>);
//!         result_set.scan(&mut [&mut id, &mut name])?;
//!     }
//!     if !result_set.next_result_set().await? {
//!         break;
//!     }
//! }
//! result_set.close().await?;
//! ```
//!
//! See [`types::config`] for the supported options.

pub mod client;
pub mod decode;
pub mod error;
pub mod logging;
pub mod reader;
pub mod scan;
pub mod types;
pub mod value;

pub use client::{ChunkHttpClient, HttpClientConfig, ResultService};
pub use decode::{BatchConverter, DecodeOptions, OutputFormats, TimestampUnit};
pub use error::{Error, ErrorKind, Result, SnowflakeErrorHelper};
pub use logging::{init_logging, LogConfig};
pub use reader::batches::ArrowBatchStream;
pub use reader::chain::{ChainState, ResultSet, Rows};
pub use reader::cursor::{PipelineState, RowCursor};
pub use reader::fetcher::{ChunkFetcher, HttpChunkFetcher};
pub use reader::scheduler::{PrefetchScheduler, SchedulerStats};
pub use reader::{ResultReader, ResultReaderAdapter, ResultSetFactory};
pub use scan::{FromValue, ObjectFields, ScanDestination, Structured, StructuredScanner};
pub use types::{
    ChunkDescriptor, ChunkManifest, ColumnMeta, ColumnType, ExecResponse, ExecResponseEnvelope,
    RawChunkBytes, ResultFormat, ResultSchema, ResultStreamConfig, RetryPolicy, TypeKind,
};
pub use value::{Row, StructuredValue, Value};
