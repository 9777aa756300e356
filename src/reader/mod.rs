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

//! Result pipelines built from exec responses.
//!
//! This module provides:
//! - `ResultSetFactory`: builds the pipeline for a response
//! - `RowCursor` / `ResultSet` / `Rows`: row access, with chaining
//! - `ArrowBatchStream` / `ResultReader`: raw Arrow batch access

pub mod batches;
pub mod chain;
pub mod cursor;
pub mod fetcher;
pub mod scheduler;

use crate::client::{ChunkHttpClient, ResultService};
use crate::decode::{
    decoder_for, parse_arrow_ipc, BatchConverter, DecodeOptions, DecodedChunk, OutputFormats,
};
use crate::error::{Result, SnowflakeErrorHelper};
use crate::logging::init_logging;
use crate::reader::batches::{ArrowBatchStream, BatchChunkProcessor};
use crate::reader::chain::{ResultSet, Rows};
use crate::reader::cursor::{RowChunkProcessor, RowCursor};
use crate::reader::fetcher::{ChunkFetcher, HttpChunkFetcher};
use crate::reader::scheduler::{ChunkProcessor, PrefetchScheduler};
use crate::types::chunk::ChunkManifest;
use crate::types::config::ResultStreamConfig;
use crate::types::response::{ExecResponse, ResultFormat};
use crate::types::schema::ResultSchema;
use arrow_array::RecordBatch;
use arrow_schema::{ArrowError, SchemaRef};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Factory that builds the pipeline for an exec response.
///
/// Owns the shared HTTP client and configuration. Each response gets its own
/// schema, decoder, manifest and scheduler; session parameters in the
/// response may adjust the configuration for that pipeline only.
pub struct ResultSetFactory {
    config: ResultStreamConfig,
    http_client: Arc<ChunkHttpClient>,
    fetcher: Option<Arc<dyn ChunkFetcher>>,
    result_service: Option<Arc<dyn ResultService>>,
    runtime_handle: Handle,
}

impl std::fmt::Debug for ResultSetFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSetFactory")
            .field("config", &self.config)
            .field("custom_fetcher", &self.fetcher.is_some())
            .field("result_service", &self.result_service)
            .finish()
    }
}

impl ResultSetFactory {
    /// Create a factory. Installs logging as configured.
    pub fn new(config: ResultStreamConfig, runtime_handle: Handle) -> Result<Self> {
        init_logging(&config.log);
        let http_client = Arc::new(ChunkHttpClient::new(config.http.clone())?);
        Ok(Self {
            config,
            http_client,
            fetcher: None,
            result_service: None,
            runtime_handle,
        })
    }

    /// Fetch chunks through `fetcher` instead of HTTPS.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ChunkFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Service used to load the child results of multi-statement queries.
    pub fn with_result_service(mut self, service: Arc<dyn ResultService>) -> Self {
        self.result_service = Some(service);
        self
    }

    pub fn config(&self) -> &ResultStreamConfig {
        &self.config
    }

    pub fn result_service(&self) -> Option<&Arc<dyn ResultService>> {
        self.result_service.as_ref()
    }

    pub fn runtime_handle(&self) -> &Handle {
        &self.runtime_handle
    }

    /// Build a row cursor over the response; remote chunks start prefetching
    /// immediately.
    pub fn create_cursor(&self, response: &ExecResponse) -> Result<RowCursor> {
        let config = self.pipeline_config(response);
        let format = response.result_format()?;
        let schema = Arc::new(ResultSchema::from_row_types(&response.row_type));
        let decoder = decoder_for(format, schema.clone(), Self::decode_options(&config, response));

        let inline_rows = decoder.decode_inline(response)?;
        let manifest = Arc::new(ChunkManifest::from_response(response, inline_rows.len())?);

        tracing::debug!(
            "Result {}: format={:?}, columns={}, inline_rows={}, chunks={}, total_rows={}, prefetch_limit={}",
            response.query_id,
            format,
            schema.len(),
            inline_rows.len(),
            manifest.len(),
            manifest.total_rows(),
            config.prefetch_limit
        );

        let scheduler = if manifest.is_empty() {
            None
        } else {
            let processor: Arc<dyn ChunkProcessor<DecodedChunk>> =
                Arc::new(RowChunkProcessor::new(decoder, manifest.clone()));
            Some(self.start_scheduler(response, &config, manifest, processor)?)
        };

        Ok(RowCursor::new(schema, inline_rows, scheduler))
    }

    /// Build the result set (following child results) of a response.
    pub async fn create_result_set(self: &Arc<Self>, response: &ExecResponse) -> Result<ResultSet> {
        ResultSet::new(Arc::clone(self), response).await
    }

    /// Blocking variant of [`create_result_set`](Self::create_result_set).
    pub fn create_rows(self: &Arc<Self>, response: &ExecResponse) -> Result<Rows> {
        let result_set = self.runtime_handle.block_on(self.create_result_set(response))?;
        Ok(Rows::new(result_set, self.runtime_handle.clone()))
    }

    /// Build a raw batch stream. Only Arrow results have batches.
    ///
    /// Batches are converted to native Arrow types; the stream's schema is
    /// derived from the row types alone.
    pub fn create_batch_stream(&self, response: &ExecResponse) -> Result<ArrowBatchStream> {
        if response.result_format()? != ResultFormat::Arrow {
            return Err(SnowflakeErrorHelper::invalid_state()
                .message("raw record batches are only available for Arrow results"));
        }
        let config = self.pipeline_config(response);
        let schema = Arc::new(ResultSchema::from_row_types(&response.row_type));
        let converter = Arc::new(BatchConverter::new(
            schema,
            config.batch_options(),
            &Self::decode_options(&config, response),
        ));

        let inline_batches = match response.rowset_base64.as_deref() {
            Some(data) if !data.is_empty() => converter.convert_all(&parse_arrow_ipc(data)?)?,
            _ => Vec::new(),
        };
        let inline_rows = inline_batches.iter().map(RecordBatch::num_rows).sum();
        let manifest = Arc::new(ChunkManifest::from_response(response, inline_rows)?);

        tracing::debug!(
            "Batch stream for {}: inline_batches={}, chunks={}, timestamp_unit={:?}",
            response.query_id,
            inline_batches.len(),
            manifest.len(),
            config.arrow_timestamp_unit
        );

        let scheduler = if manifest.is_empty() {
            None
        } else {
            let processor: Arc<dyn ChunkProcessor<Vec<RecordBatch>>> =
                Arc::new(BatchChunkProcessor::new(manifest.clone(), converter.clone()));
            Some(self.start_scheduler(response, &config, manifest, processor)?)
        };

        Ok(ArrowBatchStream::new(converter.schema(), inline_batches, scheduler))
    }

    /// Build a blocking batch reader.
    ///
    /// Results without any batch get an [`EmptyReader`] with the same
    /// schema a non-empty result would have.
    pub fn create_reader(&self, response: &ExecResponse) -> Result<Box<dyn ResultReader + Send>> {
        let stream = self.create_batch_stream(response)?;
        let schema = stream.schema();
        if stream.is_empty() {
            tracing::info!(
                "Using empty reader: no batches present for {}",
                response.query_id
            );
            return Ok(Box::new(EmptyReader::new(schema)));
        }

        tracing::info!("Using Arrow batch reader for {}", response.query_id);
        Ok(Box::new(BatchStreamReader {
            stream,
            schema,
            runtime_handle: self.runtime_handle.clone(),
        }))
    }

    // --- Internal methods ---

    fn pipeline_config(&self, response: &ExecResponse) -> ResultStreamConfig {
        let mut config = self.config.clone();
        config.apply_session_parameters(&response.parameters);
        config
    }

    fn decode_options(config: &ResultStreamConfig, response: &ExecResponse) -> DecodeOptions {
        DecodeOptions {
            higher_precision: config.higher_precision,
            formats: Arc::new(OutputFormats::from_parameters(&response.parameters)),
        }
    }

    fn fetcher_for(
        &self,
        response: &ExecResponse,
        config: &ResultStreamConfig,
    ) -> Result<Arc<dyn ChunkFetcher>> {
        if let Some(fetcher) = &self.fetcher {
            return Ok(Arc::clone(fetcher));
        }
        Ok(Arc::new(HttpChunkFetcher::for_response(
            Arc::clone(&self.http_client),
            response,
            config,
        )?))
    }

    fn start_scheduler<T: Send + 'static>(
        &self,
        response: &ExecResponse,
        config: &ResultStreamConfig,
        manifest: Arc<ChunkManifest>,
        processor: Arc<dyn ChunkProcessor<T>>,
    ) -> Result<PrefetchScheduler<T>> {
        let scheduler = PrefetchScheduler::new(
            manifest,
            self.fetcher_for(response, config)?,
            processor,
            config.prefetch_limit,
            config.chunk_ready_timeout,
            CancellationToken::new(),
            self.runtime_handle.clone(),
        );
        scheduler.start();
        Ok(scheduler)
    }
}

/// Trait for result readers.
pub trait ResultReader: Send {
    /// Get the schema of the result.
    fn schema(&self) -> Result<SchemaRef>;

    /// Get the next record batch, or None if end of results.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;
}

/// Blocking wrapper around an [`ArrowBatchStream`].
struct BatchStreamReader {
    stream: ArrowBatchStream,
    schema: SchemaRef,
    runtime_handle: Handle,
}

impl ResultReader for BatchStreamReader {
    fn schema(&self) -> Result<SchemaRef> {
        Ok(self.schema.clone())
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        self.runtime_handle.block_on(self.stream.next_batch())
    }
}

/// Empty reader for queries with no results.
///
/// Used for valid queries that return zero rows (e.g., `SELECT * WHERE 1=0`).
/// The schema is derived from the response's row types.
pub struct EmptyReader {
    schema: SchemaRef,
}

impl EmptyReader {
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema }
    }
}

impl ResultReader for EmptyReader {
    fn schema(&self) -> Result<SchemaRef> {
        Ok(self.schema.clone())
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        Ok(None)
    }
}

/// Adapter to make ResultReader work as arrow's RecordBatchReader.
pub struct ResultReaderAdapter {
    inner: Box<dyn ResultReader + Send>,
    schema: SchemaRef,
}

impl ResultReaderAdapter {
    /// Create a new adapter wrapping a ResultReader.
    pub fn new(inner: Box<dyn ResultReader + Send>) -> Result<Self> {
        let schema = inner.schema()?;
        Ok(Self { inner, schema })
    }
}

impl arrow_array::RecordBatchReader for ResultReaderAdapter {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl Iterator for ResultReaderAdapter {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => Some(Err(ArrowError::ExternalError(Box::new(e)))),
        }
    }
}
