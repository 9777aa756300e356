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

//! Chunk fetching from cloud storage.
//!
//! This module handles downloading chunk payloads from their presigned
//! locations, including credential headers, speed monitoring and
//! decompression.

use crate::client::ChunkHttpClient;
use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::chunk::{ChunkDescriptor, RawChunkBytes};
use crate::types::config::{ResultStreamConfig, RetryPolicy};
use crate::types::response::{ExecResponse, ResultFormat};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use lz4_flex::frame::FrameDecoder;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const SSE_C_ALGORITHM_HEADER: &str = "x-amz-server-side-encryption-customer-algorithm";
pub const SSE_C_KEY_HEADER: &str = "x-amz-server-side-encryption-customer-key";
pub const SSE_C_AES: &str = "AES256";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];

/// Downloads the payload of one chunk.
///
/// Implementations must be safe to call concurrently for different chunks.
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    async fn fetch(
        &self,
        descriptor: &ChunkDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RawChunkBytes>;
}

/// Headers sent with every chunk request.
///
/// Explicit chunk headers win; otherwise the result key is sent as an SSE-C
/// customer key so the storage service can decrypt the object.
pub fn chunk_request_headers(
    qrmk: Option<&str>,
    chunk_headers: &HashMap<String, String>,
) -> HashMap<String, String> {
    if !chunk_headers.is_empty() {
        return chunk_headers.clone();
    }
    match qrmk {
        Some(key) if !key.is_empty() => HashMap::from([
            (SSE_C_ALGORITHM_HEADER.to_string(), SSE_C_AES.to_string()),
            (SSE_C_KEY_HEADER.to_string(), key.to_string()),
        ]),
        _ => HashMap::new(),
    }
}

/// Undo gzip or LZ4-frame compression, detected by magic bytes.
pub fn decompress(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::with_capacity(bytes.len() * 4);
        GzDecoder::new(Cursor::new(&bytes))
            .read_to_end(&mut out)
            .map_err(|e| {
                SnowflakeErrorHelper::decode().message(format!("gzip decompression failed: {}", e))
            })?;
        return Ok(out);
    }
    if bytes.starts_with(&LZ4_FRAME_MAGIC) {
        let mut out = Vec::with_capacity(bytes.len() * 4);
        FrameDecoder::new(Cursor::new(&bytes))
            .read_to_end(&mut out)
            .map_err(|e| {
                SnowflakeErrorHelper::decode().message(format!("LZ4 decompression failed: {}", e))
            })?;
        return Ok(out);
    }
    Ok(bytes)
}

/// Fetches chunks over HTTPS.
///
/// Handles:
/// - HTTP GET to the presigned location with credential headers
/// - Retry of transient failures (delegated to [`ChunkHttpClient`])
/// - gzip / LZ4 decompression
/// - Download speed monitoring
#[derive(Debug)]
pub struct HttpChunkFetcher {
    http_client: Arc<ChunkHttpClient>,
    headers: HashMap<String, String>,
    format: ResultFormat,
    retry: RetryPolicy,
    speed_threshold_mbps: f64,
}

impl HttpChunkFetcher {
    pub fn new(
        http_client: Arc<ChunkHttpClient>,
        headers: HashMap<String, String>,
        format: ResultFormat,
        retry: RetryPolicy,
        speed_threshold_mbps: f64,
    ) -> Self {
        Self {
            http_client,
            headers,
            format,
            retry,
            speed_threshold_mbps,
        }
    }

    /// Fetcher for the chunks of one exec response.
    pub fn for_response(
        http_client: Arc<ChunkHttpClient>,
        response: &ExecResponse,
        config: &ResultStreamConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            http_client,
            chunk_request_headers(response.qrmk.as_deref(), &response.chunk_headers),
            response.result_format()?,
            config.retry.clone(),
            config.speed_threshold_mbps,
        ))
    }
}

#[async_trait]
impl ChunkFetcher for HttpChunkFetcher {
    async fn fetch(
        &self,
        descriptor: &ChunkDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RawChunkBytes> {
        let start = Instant::now();

        debug!(
            "Downloading chunk {} ({} rows, {} bytes compressed)",
            descriptor.ordinal, descriptor.row_count, descriptor.compressed_size
        );

        let body = self
            .http_client
            .get_with_retry(
                descriptor.ordinal,
                &descriptor.url,
                &self.headers,
                &self.retry,
                cancel,
            )
            .await?;

        let elapsed = start.elapsed();
        let size_mb = body.len() as f64 / 1024.0 / 1024.0;
        let speed_mbps = size_mb / elapsed.as_secs_f64().max(f64::EPSILON);

        debug!(
            "Downloaded chunk {}: {:.2} MB in {:.2}s ({:.2} MB/s)",
            descriptor.ordinal,
            size_mb,
            elapsed.as_secs_f64(),
            speed_mbps
        );

        if speed_mbps < self.speed_threshold_mbps {
            warn!(
                "Chunk download slower than threshold: {:.2} MB/s (threshold: {:.2} MB/s)",
                speed_mbps, self.speed_threshold_mbps
            );
        }

        let bytes = decompress(body).map_err(|e| e.with_chunk(descriptor.ordinal))?;

        Ok(RawChunkBytes {
            ordinal: descriptor.ordinal,
            format: self.format,
            bytes,
        })
    }
}
