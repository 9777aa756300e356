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

//! Raw Arrow batch access.
//!
//! For Arrow results the caller can skip row decoding and take the record
//! batches as they arrive: inline batches first, then every chunk's batches
//! in ordinal order, with the same bounded prefetch as the row cursor.
//! Batches are converted to native Arrow types on the worker that parsed
//! them, see [`BatchConverter`].

use crate::decode::{parse_arrow_ipc, BatchConverter};
use crate::error::{Result, SnowflakeErrorHelper};
use crate::reader::scheduler::{ChunkProcessor, PrefetchScheduler, SchedulerStats};
use crate::types::chunk::{ChunkManifest, RawChunkBytes};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Parses a chunk into record batches, checks the row count and converts.
pub struct BatchChunkProcessor {
    manifest: Arc<ChunkManifest>,
    converter: Arc<BatchConverter>,
}

impl BatchChunkProcessor {
    pub fn new(manifest: Arc<ChunkManifest>, converter: Arc<BatchConverter>) -> Self {
        Self {
            manifest,
            converter,
        }
    }
}

impl ChunkProcessor<Vec<RecordBatch>> for BatchChunkProcessor {
    fn process(&self, raw: RawChunkBytes) -> Result<Vec<RecordBatch>> {
        let batches = parse_arrow_ipc(&raw.bytes).map_err(|e| e.with_chunk(raw.ordinal))?;
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();

        if let Some(descriptor) = self.manifest.get(raw.ordinal) {
            if descriptor.row_count != rows {
                return Err(SnowflakeErrorHelper::decode()
                    .chunk(raw.ordinal)
                    .message(format!(
                        "chunk holds {} rows, manifest declares {}",
                        rows, descriptor.row_count
                    )));
            }
        }

        trace!(
            "Chunk {}: parsed {} batches ({} rows)",
            raw.ordinal,
            batches.len(),
            rows
        );
        self.converter
            .convert_all(&batches)
            .map_err(|e| e.with_chunk(raw.ordinal))
    }
}

/// Stream of record batches for one Arrow result.
pub struct ArrowBatchStream {
    buffer: VecDeque<RecordBatch>,
    scheduler: Option<PrefetchScheduler<Vec<RecordBatch>>>,
    schema: SchemaRef,
    cancel_token: CancellationToken,
    exhausted: bool,
}

impl std::fmt::Debug for ArrowBatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrowBatchStream")
            .field("buffered_batches", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl ArrowBatchStream {
    /// `inline_batches` must already be converted to `schema`.
    pub fn new(
        schema: SchemaRef,
        inline_batches: Vec<RecordBatch>,
        scheduler: Option<PrefetchScheduler<Vec<RecordBatch>>>,
    ) -> Self {
        let cancel_token = scheduler
            .as_ref()
            .map(|s| s.cancellation_token())
            .unwrap_or_default();
        Self {
            buffer: inline_batches.into(),
            scheduler,
            schema,
            cancel_token,
            exhausted: false,
        }
    }

    /// Next batch in ordinal order, or `None` at end of stream.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.cancel_token.is_cancelled() {
            return Err(SnowflakeErrorHelper::cancelled().message("result stream cancelled"));
        }

        loop {
            if let Some(batch) = self.buffer.pop_front() {
                return Ok(Some(batch));
            }
            if self.exhausted {
                return Ok(None);
            }

            let Some(scheduler) = &self.scheduler else {
                self.exhausted = true;
                return Ok(None);
            };
            match scheduler.next_chunk().await {
                Ok(Some(batches)) => self.buffer.extend(batches),
                Ok(None) => {
                    debug!("Batch stream reached end of data");
                    self.exhausted = true;
                }
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            }
        }
    }

    /// Schema of every batch, known before any chunk arrives.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// True when the result has no batch to hand out at all.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.scheduler.is_none()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(|s| s.stats())
    }

    /// Stop prefetching and drop every buffered batch. Idempotent.
    pub async fn close(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
        self.cancel_token.cancel();
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
    }
}
