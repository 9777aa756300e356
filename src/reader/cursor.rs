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

//! Row-at-a-time consumption of one result.
//!
//! The cursor walks the inline rows first and then every prefetched chunk in
//! ordinal order. A drained chunk is dropped before the next one is taken.

use crate::decode::{DecodedChunk, FormatDecoder};
use crate::error::{Error, Result, SnowflakeErrorHelper};
use crate::reader::scheduler::{ChunkProcessor, PrefetchScheduler, SchedulerStats};
use crate::types::chunk::{ChunkManifest, RawChunkBytes};
use crate::types::schema::{ColumnMeta, ColumnType, ResultSchemaRef};
use crate::value::Row;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Decodes a downloaded chunk into rows and checks the row count.
pub struct RowChunkProcessor {
    decoder: Arc<dyn FormatDecoder>,
    manifest: Arc<ChunkManifest>,
}

impl RowChunkProcessor {
    pub fn new(decoder: Arc<dyn FormatDecoder>, manifest: Arc<ChunkManifest>) -> Self {
        Self { decoder, manifest }
    }
}

impl ChunkProcessor<DecodedChunk> for RowChunkProcessor {
    fn process(&self, raw: RawChunkBytes) -> Result<DecodedChunk> {
        let ordinal = raw.ordinal;
        let rows = self.decoder.decode_chunk(&raw)?;

        if let Some(descriptor) = self.manifest.get(ordinal) {
            if descriptor.row_count != rows.len() {
                return Err(SnowflakeErrorHelper::decode().chunk(ordinal).message(format!(
                    "chunk decoded to {} rows, manifest declares {}",
                    rows.len(),
                    descriptor.row_count
                )));
            }
        }

        trace!("Chunk {}: decoded {} rows", ordinal, rows.len());
        Ok(DecodedChunk::remote(ordinal, rows))
    }
}

/// Where the cursor stands.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Chunk of the current row; `None` for inline rows or before the first row.
    pub chunk_ordinal: Option<usize>,
    pub row_offset: usize,
    /// Rows returned by `advance` so far.
    pub consumed: usize,
    /// No more rows will be returned.
    pub terminal: bool,
    /// The error that ended iteration, if any.
    pub pending_error: Option<Error>,
}

/// Sequential row access over inline rows plus prefetched chunks.
pub struct RowCursor {
    schema: ResultSchemaRef,
    inline: Option<DecodedChunk>,
    scheduler: Option<PrefetchScheduler<DecodedChunk>>,
    current: Option<DecodedChunk>,
    position: Option<usize>,
    state: PipelineState,
    cancel_token: CancellationToken,
    closed: bool,
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("columns", &self.schema.len())
            .field("state", &self.state)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RowCursor {
    /// Create a cursor. A started `scheduler` supplies the remote chunks and
    /// its token becomes the cursor's cancellation token.
    pub fn new(
        schema: ResultSchemaRef,
        inline_rows: Vec<Row>,
        scheduler: Option<PrefetchScheduler<DecodedChunk>>,
    ) -> Self {
        let cancel_token = scheduler
            .as_ref()
            .map(|s| s.cancellation_token())
            .unwrap_or_default();
        let inline = (!inline_rows.is_empty()).then(|| DecodedChunk::inline(inline_rows));

        Self {
            schema,
            inline,
            scheduler,
            current: None,
            position: None,
            state: PipelineState::default(),
            cancel_token,
            closed: false,
        }
    }

    /// Move to the next row.
    ///
    /// Returns `Ok(false)` at end of data, after a failure or after `close`.
    pub async fn advance(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.cancel_token.is_cancelled() {
            self.current = None;
            self.position = None;
            self.state.terminal = true;
            return Err(SnowflakeErrorHelper::cancelled().message("result stream cancelled"));
        }
        if self.state.terminal {
            return Ok(false);
        }

        loop {
            if let Some(chunk) = &self.current {
                let next = self.position.map_or(0, |p| p + 1);
                if next < chunk.len() {
                    self.position = Some(next);
                    self.state.row_offset = next;
                    self.state.consumed += 1;
                    return Ok(true);
                }
                trace!("Released chunk {:?} after {} rows", chunk.ordinal, chunk.len());
                self.current = None;
                self.position = None;
            }

            if let Some(inline) = self.inline.take() {
                self.state.chunk_ordinal = None;
                self.current = Some(inline);
                continue;
            }

            let Some(scheduler) = &self.scheduler else {
                self.finish();
                return Ok(false);
            };

            match scheduler.next_chunk().await {
                Ok(Some(chunk)) => {
                    self.state.chunk_ordinal = chunk.ordinal;
                    self.current = Some(chunk);
                }
                Ok(None) => {
                    self.finish();
                    return Ok(false);
                }
                Err(e) => {
                    debug!("Row cursor stopped: {}", e);
                    self.state.terminal = true;
                    self.state.pending_error = Some(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /// The row `advance` last moved to.
    pub fn current(&self) -> Option<&Row> {
        let position = self.position?;
        self.current.as_ref()?.rows.get(position)
    }

    /// Stop every background task and release all chunks. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.state.terminal = true;
        self.current = None;
        self.position = None;
        self.inline = None;
        self.cancel_token.cancel();

        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
        debug!("Row cursor closed after {} rows", self.state.consumed);
        Ok(())
    }

    pub fn schema(&self) -> &ResultSchemaRef {
        &self.schema
    }

    pub fn columns(&self) -> Vec<String> {
        self.schema.column_names()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.schema.column_types()
    }

    pub fn column_meta(&self) -> &[ColumnMeta] {
        self.schema.columns()
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// The error that ended iteration, if any.
    pub fn error(&self) -> Option<&Error> {
        self.state.pending_error.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Token a concurrent task can fire to abort iteration.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(|s| s.stats())
    }

    fn finish(&mut self) {
        self.state.terminal = true;
        debug!("Row cursor exhausted after {} rows", self.state.consumed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodeOptions, JsonRowDecoder};
    use crate::error::ErrorKind;
    use crate::reader::fetcher::ChunkFetcher;
    use crate::types::chunk::ChunkDescriptor;
    use crate::types::response::ResultFormat;
    use crate::types::schema::{ColumnMeta, ColumnType, ResultSchema, TypeKind};
    use crate::value::Value;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::runtime::Handle;

    /// Serves canned JSON bodies by ordinal.
    #[derive(Debug)]
    struct CannedFetcher {
        bodies: HashMap<usize, &'static str>,
    }

    #[async_trait]
    impl ChunkFetcher for CannedFetcher {
        async fn fetch(
            &self,
            descriptor: &ChunkDescriptor,
            _cancel: &CancellationToken,
        ) -> Result<RawChunkBytes> {
            Ok(RawChunkBytes {
                ordinal: descriptor.ordinal,
                format: ResultFormat::Json,
                bytes: self.bodies[&descriptor.ordinal].as_bytes().to_vec(),
            })
        }
    }

    fn schema() -> ResultSchemaRef {
        Arc::new(ResultSchema::new(vec![ColumnMeta::new(
            "N",
            ColumnType::new(TypeKind::Fixed),
        )]))
    }

    fn cursor(inline: Vec<i64>, chunks: Vec<(&'static str, i64)>) -> RowCursor {
        let schema = schema();
        let manifest = Arc::new(
            ChunkManifest::new(
                chunks
                    .iter()
                    .enumerate()
                    .map(|(i, (_, rows))| (format!("https://stage/{}", i), *rows, 0, 0)),
                inline.len(),
                None,
            )
            .unwrap(),
        );
        let fetcher = Arc::new(CannedFetcher {
            bodies: chunks.iter().map(|(body, _)| *body).enumerate().collect(),
        });
        let decoder = Arc::new(JsonRowDecoder::new(schema.clone(), DecodeOptions::default()));
        let scheduler = PrefetchScheduler::new(
            manifest.clone(),
            fetcher,
            Arc::new(RowChunkProcessor::new(decoder, manifest)),
            2,
            Some(Duration::from_millis(20)),
            CancellationToken::new(),
            Handle::current(),
        );
        scheduler.start();

        let inline = inline
            .into_iter()
            .map(|n| Row::new(vec![Value::Int(n)]))
            .collect();
        RowCursor::new(schema, inline, Some(scheduler))
    }

    async fn drain(cursor: &mut RowCursor) -> Result<Vec<i64>> {
        let mut out = Vec::new();
        while cursor.advance().await? {
            match cursor.current().unwrap()[0] {
                Value::Int(n) => out.push(n),
                ref other => panic!("unexpected value {:?}", other),
            }
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_inline_then_chunks_in_order() {
        let mut cursor = cursor(vec![1, 2], vec![(r#"["3"],["4"]"#, 2), (r#"["5"]"#, 1)]);
        assert_eq!(drain(&mut cursor).await.unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(cursor.state().terminal);
        assert_eq!(cursor.state().consumed, 5);
        assert!(cursor.current().is_none());
        assert!(!cursor.advance().await.unwrap());
    }

    #[tokio::test]
    async fn test_inline_only_cursor() {
        let inline = vec![Row::new(vec![Value::Int(9)])];
        let mut cursor = RowCursor::new(schema(), inline, None);
        assert!(cursor.advance().await.unwrap());
        assert_eq!(cursor.current().unwrap()[0], Value::Int(9));
        assert_eq!(cursor.state().chunk_ordinal, None);
        assert!(!cursor.advance().await.unwrap());
    }

    #[tokio::test]
    async fn test_row_count_mismatch_is_decode_error() {
        let mut cursor = cursor(vec![], vec![(r#"["1"]"#, 1), (r#"["2"]"#, 3)]);
        assert!(cursor.advance().await.unwrap());

        let err = cursor.advance().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.chunk(), Some(1));
        assert!(cursor.current().is_none());
        assert!(cursor.error().is_some());
        assert!(!cursor.advance().await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_chunk_surfaces_at_its_ordinal() {
        let mut cursor = cursor(vec![7], vec![(r#"["8"]"#, 1), (r#"["oops"#, 1)]);
        assert!(cursor.advance().await.unwrap());
        assert!(cursor.advance().await.unwrap());
        assert_eq!(cursor.current().unwrap()[0], Value::Int(8));

        let err = cursor.advance().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.chunk(), Some(1));
        cursor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_ends_iteration() {
        let mut cursor = cursor(vec![1], vec![(r#"["2"]"#, 1)]);
        assert!(cursor.advance().await.unwrap());

        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        assert!(cursor.is_closed());
        assert!(!cursor.advance().await.unwrap());
        assert_eq!(cursor.columns(), vec!["N".to_string()]);
        let stats = cursor.scheduler_stats().unwrap();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.buffered, 0);
    }

    #[tokio::test]
    async fn test_cancel_token_fails_advance() {
        let mut cursor = cursor(vec![1, 2], vec![(r#"["3"]"#, 1)]);
        assert!(cursor.advance().await.unwrap());

        cursor.cancellation_token().cancel();
        let err = cursor.advance().await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(cursor.current().is_none());
        cursor.close().await.unwrap();
    }
}
