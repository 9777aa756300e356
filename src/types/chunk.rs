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

//! Chunk manifest types.
//!
//! The manifest is the ordered list of remote chunks that follow the inline
//! rows of a result. It is built once per result set and never mutated, so
//! fetch tasks share it through an `Arc` without locking.

use crate::error::{Result, SnowflakeErrorHelper};
use crate::types::response::{ExecResponse, ResultFormat};
use std::collections::HashSet;

/// One remote chunk of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position of the chunk in the manifest (0-based, after inline rows).
    pub ordinal: usize,
    /// Presigned location of the chunk payload.
    pub url: String,
    pub row_count: usize,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

/// Downloaded, decompressed payload for one chunk.
#[derive(Debug, Clone)]
pub struct RawChunkBytes {
    pub ordinal: usize,
    pub format: ResultFormat,
    pub bytes: Vec<u8>,
}

/// Ordered, validated list of chunk descriptors.
#[derive(Debug, Clone, Default)]
pub struct ChunkManifest {
    chunks: Vec<ChunkDescriptor>,
    inline_rows: usize,
}

impl ChunkManifest {
    /// Build a manifest from `(url, row_count, uncompressed, compressed)` entries.
    ///
    /// Fails when a row count is negative, a location repeats, or the row
    /// counts don't add up to `declared_total`.
    pub fn new(
        entries: impl IntoIterator<Item = (String, i64, i64, i64)>,
        inline_rows: usize,
        declared_total: Option<i64>,
    ) -> Result<Self> {
        let mut chunks = Vec::new();
        let mut seen = HashSet::new();

        for (ordinal, (url, row_count, uncompressed_size, compressed_size)) in
            entries.into_iter().enumerate()
        {
            let row_count = usize::try_from(row_count).map_err(|_| {
                SnowflakeErrorHelper::manifest()
                    .chunk(ordinal)
                    .message(format!("negative row count {}", row_count))
            })?;
            if !seen.insert(url.clone()) {
                return Err(SnowflakeErrorHelper::manifest()
                    .chunk(ordinal)
                    .message("chunk location appears more than once in the manifest"));
            }
            chunks.push(ChunkDescriptor {
                ordinal,
                url,
                row_count,
                uncompressed_size: u64::try_from(uncompressed_size).unwrap_or(0),
                compressed_size: u64::try_from(compressed_size).unwrap_or(0),
            });
        }

        let manifest = Self {
            chunks,
            inline_rows,
        };

        if let Some(total) = declared_total {
            let counted = manifest.total_rows() as i64;
            if counted != total {
                return Err(SnowflakeErrorHelper::manifest().message(format!(
                    "declared total of {} rows, but inline rows ({}) and chunk rows ({}) add up to {}",
                    total,
                    inline_rows,
                    counted - inline_rows as i64,
                    counted
                )));
            }
        }

        Ok(manifest)
    }

    /// Build the manifest of an exec response whose inline rows have been decoded.
    pub fn from_response(response: &ExecResponse, inline_rows: usize) -> Result<Self> {
        Self::new(
            response.chunks.iter().map(|c| {
                (
                    c.url.clone(),
                    c.row_count,
                    c.uncompressed_size,
                    c.compressed_size,
                )
            }),
            inline_rows,
            response.total,
        )
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&ChunkDescriptor> {
        self.chunks.get(ordinal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkDescriptor> {
        self.chunks.iter()
    }

    pub fn inline_rows(&self) -> usize {
        self.inline_rows
    }

    /// Inline rows plus every chunk's rows.
    pub fn total_rows(&self) -> usize {
        self.inline_rows + self.chunks.iter().map(|c| c.row_count).sum::<usize>()
    }

    pub fn total_uncompressed_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.uncompressed_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::response::ExecResponseChunk;

    fn entry(i: usize, rows: i64) -> (String, i64, i64, i64) {
        (format!("https://bucket.example.com/chunk{}", i), rows, 1000, 100)
    }

    #[test]
    fn test_manifest_assigns_ordinals() {
        let manifest = ChunkManifest::new(vec![entry(0, 10), entry(1, 20)], 5, Some(35)).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get(1).unwrap().ordinal, 1);
        assert_eq!(manifest.get(1).unwrap().row_count, 20);
        assert_eq!(manifest.total_rows(), 35);
        assert_eq!(manifest.total_uncompressed_size(), 2000);
    }

    #[test]
    fn test_manifest_rejects_inconsistent_total() {
        let err = ChunkManifest::new(vec![entry(0, 10), entry(1, 20)], 5, Some(40)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Manifest);
        assert!(err.message().contains("40"));
    }

    #[test]
    fn test_manifest_rejects_duplicate_location() {
        let err = ChunkManifest::new(vec![entry(0, 10), entry(0, 10)], 0, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Manifest);
        assert_eq!(err.chunk(), Some(1));
    }

    #[test]
    fn test_manifest_rejects_negative_row_count() {
        let err = ChunkManifest::new(vec![entry(0, -1)], 0, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Manifest);
    }

    #[test]
    fn test_manifest_without_declared_total() {
        let manifest = ChunkManifest::new(Vec::new(), 3, None).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.total_rows(), 3);
    }

    #[test]
    fn test_manifest_from_response() {
        let response = ExecResponse {
            total: Some(7),
            chunks: vec![ExecResponseChunk {
                url: "https://bucket.example.com/c0".to_string(),
                row_count: 4,
                uncompressed_size: 64,
                compressed_size: 32,
            }],
            ..Default::default()
        };
        let manifest = ChunkManifest::from_response(&response, 3).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.inline_rows(), 3);
        assert_eq!(manifest.get(0).unwrap().compressed_size, 32);
    }
}
