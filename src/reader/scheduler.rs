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

//! Bounded, ordered chunk prefetching.
//!
//! The scheduler downloads and processes chunks on background tasks while
//! the consumer works through earlier ones. It guarantees:
//! - Chunks are released strictly in manifest order, whatever order they
//!   finish in
//! - Each chunk is fetched at most once
//! - No more than `prefetch_limit` chunks are in flight or buffered at once
//! - After cancellation or shutdown no task keeps running and no further
//!   chunk is released
//!
//! All bookkeeping lives behind one lock; a single [`Notify`] wakes the
//! consumer whenever a chunk settles.

use crate::error::{Error, Result, SnowflakeErrorHelper};
use crate::reader::fetcher::ChunkFetcher;
use crate::types::chunk::{ChunkManifest, RawChunkBytes};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Turns downloaded bytes into the payload handed to the consumer.
///
/// Runs on the fetch task, so decoding overlaps with consumption.
pub trait ChunkProcessor<T>: Send + Sync {
    fn process(&self, raw: RawChunkBytes) -> Result<T>;
}

/// Point-in-time view of the scheduler's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Chunks handed to a fetch task so far.
    pub launched: usize,
    pub in_flight: usize,
    /// Settled chunks waiting for the consumer.
    pub buffered: usize,
    /// Highest `in_flight + buffered` ever observed.
    pub peak_resident: usize,
}

struct SchedulerState<T> {
    completed: BTreeMap<usize, Result<T>>,
    next_expected: usize,
    next_to_launch: usize,
    in_flight: usize,
    closed: bool,
    launched: usize,
    peak_resident: usize,
}

impl<T> SchedulerState<T> {
    fn resident(&self) -> usize {
        self.in_flight + self.completed.len()
    }
}

struct Shared<T> {
    state: Mutex<SchedulerState<T>>,
    chunk_ready: Notify,
}

impl<T> Shared<T> {
    /// Lock for background tasks, which keep going on a poisoned lock.
    fn lock_relaxed(&self) -> MutexGuard<'_, SchedulerState<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Prefetches the chunks of one manifest with bounded parallelism.
pub struct PrefetchScheduler<T: Send + 'static> {
    manifest: Arc<ChunkManifest>,
    fetcher: Arc<dyn ChunkFetcher>,
    processor: Arc<dyn ChunkProcessor<T>>,
    prefetch_limit: usize,
    chunk_ready_timeout: Option<Duration>,
    shared: Arc<Shared<T>>,
    tasks: Mutex<JoinSet<()>>,
    cancel_token: CancellationToken,
    runtime_handle: Handle,
}

impl<T: Send + 'static> std::fmt::Debug for PrefetchScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchScheduler")
            .field("chunks", &self.manifest.len())
            .field("prefetch_limit", &self.prefetch_limit)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: Send + 'static> PrefetchScheduler<T> {
    /// Create a scheduler. Nothing is fetched until [`start`](Self::start).
    ///
    /// A `prefetch_limit` of zero is treated as one.
    pub fn new(
        manifest: Arc<ChunkManifest>,
        fetcher: Arc<dyn ChunkFetcher>,
        processor: Arc<dyn ChunkProcessor<T>>,
        prefetch_limit: usize,
        chunk_ready_timeout: Option<Duration>,
        cancel_token: CancellationToken,
        runtime_handle: Handle,
    ) -> Self {
        Self {
            manifest,
            fetcher,
            processor,
            prefetch_limit: prefetch_limit.max(1),
            chunk_ready_timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    completed: BTreeMap::new(),
                    next_expected: 0,
                    next_to_launch: 0,
                    in_flight: 0,
                    closed: false,
                    launched: 0,
                    peak_resident: 0,
                }),
                chunk_ready: Notify::new(),
            }),
            tasks: Mutex::new(JoinSet::new()),
            cancel_token,
            runtime_handle,
        }
    }

    /// Launch the first window of fetches.
    pub fn start(&self) {
        debug!(
            "Starting prefetch of {} chunks with limit {}",
            self.manifest.len(),
            self.prefetch_limit
        );
        self.launch_available();
    }

    /// Wait for the next chunk in manifest order.
    ///
    /// Returns `Ok(None)` once every chunk has been released or the
    /// scheduler has been shut down.
    pub async fn next_chunk(&self) -> Result<Option<T>> {
        loop {
            if self.cancel_token.is_cancelled() {
                return Err(SnowflakeErrorHelper::cancelled().message("result stream cancelled"));
            }

            let ordinal = {
                let mut state = self.lock_state()?;
                if state.closed {
                    return Ok(None);
                }

                let ordinal = state.next_expected;
                if ordinal >= self.manifest.len() {
                    debug!("End of stream reached at chunk {}", ordinal);
                    return Ok(None);
                }

                if let Some(result) = state.completed.remove(&ordinal) {
                    state.next_expected += 1;
                    let (in_flight, buffered) = (state.in_flight, state.completed.len());
                    drop(state);

                    debug!(
                        "Released chunk {}: in_flight={}, buffered={}, limit={}",
                        ordinal, in_flight, buffered, self.prefetch_limit
                    );

                    self.reap_finished();
                    self.launch_available();
                    return result.map(Some).map_err(|e| e.with_chunk(ordinal));
                }
                ordinal
            };

            let timeout = async {
                match self.chunk_ready_timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    return Err(SnowflakeErrorHelper::cancelled().message("result stream cancelled"));
                }
                _ = self.shared.chunk_ready.notified() => {
                    // A chunk settled, loop to check
                }
                _ = timeout => {
                    debug!("Timeout waiting for chunk {}, continuing...", ordinal);
                }
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.lock_relaxed();
        SchedulerStats {
            launched: state.launched,
            in_flight: state.in_flight,
            buffered: state.completed.len(),
            peak_resident: state.peak_resident,
        }
    }

    /// Cancel all pending operations.
    pub fn cancel(&self) {
        debug!("Cancelling prefetch scheduler");
        self.cancel_token.cancel();
        self.shared.chunk_ready.notify_one();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Cancel, drop buffered chunks and wait for every task to stop.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.lock_relaxed();
            state.closed = true;
            state.completed.clear();
        }
        self.cancel();

        let mut tasks = {
            let mut guard = match self.tasks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *guard)
        };
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        let mut state = self.shared.lock_relaxed();
        state.in_flight = 0;
        state.completed.clear();
        debug!(
            "Prefetch scheduler shut down after launching {} of {} chunks",
            state.launched,
            self.manifest.len()
        );
    }

    // --- Internal methods ---

    fn lock_state(&self) -> Result<MutexGuard<'_, SchedulerState<T>>> {
        self.shared.state.lock().map_err(|_| {
            SnowflakeErrorHelper::invalid_state().message("prefetch scheduler state is poisoned")
        })
    }

    /// Drop handles of tasks that already finished.
    fn reap_finished(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            while tasks.try_join_next().is_some() {}
        }
    }

    /// Spawn fetch tasks while the residency window has room.
    fn launch_available(&self) {
        let ordinals: Vec<usize> = {
            let mut state = self.shared.lock_relaxed();
            let mut ordinals = Vec::new();
            if state.closed || self.cancel_token.is_cancelled() {
                return;
            }
            while state.next_to_launch < self.manifest.len()
                && state.resident() < self.prefetch_limit
            {
                ordinals.push(state.next_to_launch);
                state.next_to_launch += 1;
                state.in_flight += 1;
                state.launched += 1;
                state.peak_resident = state.peak_resident.max(state.resident());
            }
            if !ordinals.is_empty() {
                debug!(
                    "Scheduling chunks {:?}: in_flight={}, buffered={}, limit={}",
                    ordinals,
                    state.in_flight,
                    state.completed.len(),
                    self.prefetch_limit
                );
            }
            ordinals
        };

        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for ordinal in ordinals {
            let descriptor = self.manifest.get(ordinal).cloned();
            let fetcher = Arc::clone(&self.fetcher);
            let processor = Arc::clone(&self.processor);
            let shared = Arc::clone(&self.shared);
            let cancel_token = self.cancel_token.clone();

            tasks.spawn_on(
                async move {
                    let result = match descriptor {
                        Some(descriptor) => {
                            match fetcher.fetch(&descriptor, &cancel_token).await {
                                Ok(raw) => processor.process(raw),
                                Err(e) => Err(e),
                            }
                        }
                        None => Err(SnowflakeErrorHelper::invalid_state()
                            .message("chunk missing from manifest")),
                    }
                    .map_err(|e: Error| e.with_chunk(ordinal));

                    match &result {
                        Ok(_) => debug!("Chunk {} ready", ordinal),
                        Err(e) if e.is_cancelled() => debug!("Chunk {} cancelled", ordinal),
                        Err(e) => error!("Failed to load chunk {}: {}", ordinal, e),
                    }

                    {
                        let mut state = shared.lock_relaxed();
                        state.in_flight = state.in_flight.saturating_sub(1);
                        if !state.closed {
                            state.completed.insert(ordinal, result);
                        }
                    }
                    shared.chunk_ready.notify_one();
                },
                &self.runtime_handle,
            );
        }
    }
}

impl<T: Send + 'static> Drop for PrefetchScheduler<T> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::chunk::ChunkDescriptor;
    use crate::types::response::ResultFormat;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the ordinal as the payload; selected chunks fail.
    #[derive(Debug, Default)]
    struct MockFetcher {
        calls: Vec<AtomicUsize>,
        failing: Option<usize>,
        delay: Duration,
    }

    impl MockFetcher {
        fn new(chunks: usize) -> Self {
            Self {
                calls: (0..chunks).map(|_| AtomicUsize::new(0)).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ChunkFetcher for MockFetcher {
        async fn fetch(
            &self,
            descriptor: &ChunkDescriptor,
            cancel: &CancellationToken,
        ) -> Result<RawChunkBytes> {
            self.calls[descriptor.ordinal].fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(SnowflakeErrorHelper::cancelled().message("cancelled"));
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
            if self.failing == Some(descriptor.ordinal) {
                return Err(SnowflakeErrorHelper::fetch()
                    .status(403)
                    .message("HTTP 403 - AccessDenied"));
            }
            Ok(RawChunkBytes {
                ordinal: descriptor.ordinal,
                format: ResultFormat::Json,
                bytes: vec![descriptor.ordinal as u8],
            })
        }
    }

    struct FirstByte;

    impl ChunkProcessor<u8> for FirstByte {
        fn process(&self, raw: RawChunkBytes) -> Result<u8> {
            Ok(raw.bytes[0])
        }
    }

    fn manifest(chunks: usize) -> Arc<ChunkManifest> {
        Arc::new(
            ChunkManifest::new(
                (0..chunks).map(|i| (format!("https://stage/chunk_{}", i), 1, 10, 5)),
                0,
                None,
            )
            .unwrap(),
        )
    }

    fn scheduler(fetcher: Arc<MockFetcher>, chunks: usize, limit: usize) -> PrefetchScheduler<u8> {
        PrefetchScheduler::new(
            manifest(chunks),
            fetcher,
            Arc::new(FirstByte),
            limit,
            Some(Duration::from_millis(20)),
            CancellationToken::new(),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_releases_in_order_and_fetches_once() {
        let fetcher = Arc::new(MockFetcher::new(6));
        let scheduler = scheduler(fetcher.clone(), 6, 3);
        scheduler.start();

        let mut seen = Vec::new();
        while let Some(payload) = scheduler.next_chunk().await.unwrap() {
            seen.push(payload);
        }

        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        for calls in &fetcher.calls {
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
        let stats = scheduler.stats();
        assert_eq!(stats.launched, 6);
        assert!(stats.peak_resident <= 3);
    }

    #[tokio::test]
    async fn test_window_bounds_launches_before_consumption() {
        let fetcher = Arc::new(MockFetcher::new(10));
        let scheduler = scheduler(fetcher, 10, 2);
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = scheduler.stats();
        assert_eq!(stats.launched, 2);
        assert_eq!(stats.buffered, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_zero_limit_still_progresses() {
        let fetcher = Arc::new(MockFetcher::new(2));
        let scheduler = scheduler(fetcher, 2, 0);
        scheduler.start();
        assert_eq!(scheduler.next_chunk().await.unwrap(), Some(0));
        assert_eq!(scheduler.next_chunk().await.unwrap(), Some(1));
        assert_eq!(scheduler.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_carries_chunk_ordinal() {
        let mut mock = MockFetcher::new(4);
        mock.failing = Some(2);
        let scheduler = scheduler(Arc::new(mock), 4, 4);
        scheduler.start();

        assert_eq!(scheduler.next_chunk().await.unwrap(), Some(0));
        assert_eq!(scheduler.next_chunk().await.unwrap(), Some(1));
        let err = scheduler.next_chunk().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert_eq!(err.chunk(), Some(2));
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiting_consumer() {
        let mut mock = MockFetcher::new(1);
        mock.delay = Duration::from_secs(3600);
        let scheduler = Arc::new(scheduler(Arc::new(mock), 1, 1));
        scheduler.start();

        let canceller = Arc::clone(&scheduler);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), scheduler.next_chunk())
            .await
            .expect("consumer should wake on cancel")
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_stops_tasks_and_is_idempotent() {
        let mut mock = MockFetcher::new(3);
        mock.delay = Duration::from_secs(3600);
        let scheduler = scheduler(Arc::new(mock), 3, 3);
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        scheduler.shutdown().await;
        scheduler.shutdown().await;

        let stats = scheduler.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.buffered, 0);
        assert!(scheduler.next_chunk().await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_manifest_ends_immediately() {
        let scheduler = scheduler(Arc::new(MockFetcher::new(0)), 0, 4);
        scheduler.start();
        assert_eq!(scheduler.next_chunk().await.unwrap(), None);
        assert_eq!(scheduler.stats().launched, 0);
    }
}
