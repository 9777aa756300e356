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

//! Result sets and multi-statement chaining.
//!
//! A multi-statement query returns a parent response listing child result
//! ids. [`ResultSet`] activates the first child immediately and each further
//! child on `next_result_set`, giving every child its own pipeline.
//! [`Rows`] exposes the same operations synchronously.

use crate::error::{Result, SnowflakeErrorHelper};
use crate::reader::cursor::RowCursor;
use crate::reader::ResultSetFactory;
use crate::scan::{scan_row, ScanDestination};
use crate::types::response::ExecResponse;
use crate::types::schema::{ColumnType, ResultSchemaRef};
use crate::value::Row;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Position in a chain of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// A plain single-statement result.
    Single,
    /// More child results follow the current one.
    HasNext,
    /// The current result is the last one.
    Exhausted,
}

/// Async row interface over one result or a chain of child results.
#[derive(Debug)]
pub struct ResultSet {
    factory: Arc<ResultSetFactory>,
    cursor: RowCursor,
    pending: VecDeque<String>,
    chain_state: ChainState,
    query_id: String,
}

impl ResultSet {
    /// Build the result set of an exec response.
    ///
    /// With child result ids present, the first child is loaded through the
    /// factory's result service and becomes the current result.
    pub async fn new(factory: Arc<ResultSetFactory>, response: &ExecResponse) -> Result<Self> {
        let mut pending: VecDeque<String> = response.child_result_ids().into();

        let Some(first) = pending.pop_front() else {
            let cursor = factory.create_cursor(response)?;
            return Ok(Self {
                factory,
                cursor,
                pending,
                chain_state: ChainState::Single,
                query_id: response.query_id.clone(),
            });
        };

        info!(
            "Multi-statement result {}: {} child results",
            response.query_id,
            pending.len() + 1
        );

        let child = Self::load_child(&factory, &first).await?;
        let cursor = factory.create_cursor(&child)?;
        let chain_state = if pending.is_empty() {
            ChainState::Exhausted
        } else {
            ChainState::HasNext
        };

        Ok(Self {
            factory,
            cursor,
            pending,
            chain_state,
            query_id: child.query_id,
        })
    }

    pub fn columns(&self) -> Vec<String> {
        self.cursor.columns()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.cursor.column_types()
    }

    pub fn schema(&self) -> &ResultSchemaRef {
        self.cursor.schema()
    }

    pub async fn advance(&mut self) -> Result<bool> {
        self.cursor.advance().await
    }

    pub fn current(&self) -> Option<&Row> {
        self.cursor.current()
    }

    /// Copy the current row into `destinations`, one per column.
    pub fn scan(&self, destinations: &mut [&mut dyn ScanDestination]) -> Result<()> {
        let row = self.cursor.current().ok_or_else(|| {
            SnowflakeErrorHelper::invalid_state().message("scan called without a current row")
        })?;
        scan_row(row, self.cursor.column_meta(), destinations)
    }

    /// Move to the next child result.
    ///
    /// Returns `false` (and stays on the current result) when there is none.
    /// A child that fails to load ends the chain: the error is returned and
    /// later calls return `false`.
    pub async fn next_result_set(&mut self) -> Result<bool> {
        if self.chain_state != ChainState::HasNext {
            self.chain_state = ChainState::Exhausted;
            return Ok(false);
        }
        let Some(next) = self.pending.pop_front() else {
            self.chain_state = ChainState::Exhausted;
            return Ok(false);
        };

        self.cursor.close().await?;
        let activated = match Self::load_child(&self.factory, &next).await {
            Ok(child) => self.factory.create_cursor(&child).map(|cursor| (cursor, child)),
            Err(e) => Err(e),
        };
        let (cursor, child) = match activated {
            Ok(activated) => activated,
            Err(e) => {
                // The chain can't resume past a child that failed to load.
                warn!(
                    "Child result {} failed; dropping {} remaining results",
                    next,
                    self.pending.len()
                );
                self.pending.clear();
                self.chain_state = ChainState::Exhausted;
                return Err(e);
            }
        };
        self.cursor = cursor;
        self.query_id = child.query_id;
        if self.pending.is_empty() {
            self.chain_state = ChainState::Exhausted;
        }

        debug!(
            "Activated child result {}: {} columns, {} results remaining",
            self.query_id,
            self.cursor.columns().len(),
            self.pending.len()
        );
        Ok(true)
    }

    /// Close the current result and drop any remaining children. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        if self.chain_state == ChainState::HasNext {
            self.chain_state = ChainState::Exhausted;
        }
        self.cursor.close().await
    }

    pub fn chain_state(&self) -> ChainState {
        self.chain_state
    }

    /// Query id of the current result.
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn cursor(&self) -> &RowCursor {
        &self.cursor
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cursor.cancellation_token()
    }

    async fn load_child(factory: &ResultSetFactory, result_id: &str) -> Result<ExecResponse> {
        let service = factory.result_service().ok_or_else(|| {
            SnowflakeErrorHelper::invalid_state()
                .message("multi-statement result needs a result service to load child results")
        })?;
        debug!("Loading child result {}", result_id);
        service.get_child_result(result_id).await
    }
}

/// Blocking row interface in the shape database clients expect.
///
/// Must not be used from inside an async context.
#[derive(Debug)]
pub struct Rows {
    inner: ResultSet,
    runtime_handle: Handle,
}

impl Rows {
    pub fn new(inner: ResultSet, runtime_handle: Handle) -> Self {
        Self {
            inner,
            runtime_handle,
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.inner.columns()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.inner.column_types()
    }

    /// Advance to the next row.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<bool> {
        self.runtime_handle.block_on(self.inner.advance())
    }

    pub fn current(&self) -> Option<&Row> {
        self.inner.current()
    }

    pub fn scan(&self, destinations: &mut [&mut dyn ScanDestination]) -> Result<()> {
        self.inner.scan(destinations)
    }

    pub fn next_result_set(&mut self) -> Result<bool> {
        self.runtime_handle.block_on(self.inner.next_result_set())
    }

    pub fn close(&mut self) -> Result<()> {
        self.runtime_handle.block_on(self.inner.close())
    }

    pub fn result_set(&self) -> &ResultSet {
        &self.inner
    }

    pub fn into_inner(self) -> ResultSet {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResultService;
    use crate::error::ErrorKind;
    use crate::types::config::ResultStreamConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn response(json: &str) -> ExecResponse {
        serde_json::from_str(json).unwrap()
    }

    #[derive(Debug, Default)]
    struct MockService {
        children: HashMap<String, ExecResponse>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResultService for MockService {
        async fn get_child_result(&self, result_id: &str) -> Result<ExecResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.children.get(result_id).cloned().ok_or_else(|| {
                SnowflakeErrorHelper::server().message(format!("no result {}", result_id))
            })
        }
    }

    fn child(query_id: &str, column: &str, values: &[&str]) -> ExecResponse {
        let rows: Vec<String> = values.iter().map(|v| format!(r#"["{}"]"#, v)).collect();
        response(&format!(
            r#"{{"queryId":"{}","rowtype":[{{"name":"{}","type":"fixed","scale":0,"nullable":true}}],"rowset":[{}],"total":{},"queryResultFormat":"json"}}"#,
            query_id,
            column,
            rows.join(","),
            values.len()
        ))
    }

    fn factory(service: Option<Arc<MockService>>) -> Arc<ResultSetFactory> {
        let factory = ResultSetFactory::new(ResultStreamConfig::default(), Handle::current()).unwrap();
        Arc::new(match service {
            Some(service) => factory.with_result_service(service),
            None => factory,
        })
    }

    async fn drain(result_set: &mut ResultSet) -> Vec<i64> {
        let mut out = Vec::new();
        while result_set.advance().await.unwrap() {
            let mut n = 0i64;
            result_set.scan(&mut [&mut n]).unwrap();
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn test_single_result() {
        let mut rs = ResultSet::new(factory(None), &child("q1", "A", &["1", "2"]))
            .await
            .unwrap();
        assert_eq!(rs.chain_state(), ChainState::Single);
        assert_eq!(drain(&mut rs).await, vec![1, 2]);
        assert!(!rs.next_result_set().await.unwrap());
        assert_eq!(rs.chain_state(), ChainState::Exhausted);
        rs.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_chain_of_three_children() {
        let service = Arc::new(MockService {
            children: HashMap::from([
                ("c1".to_string(), child("c1", "A", &["1"])),
                ("c2".to_string(), child("c2", "B", &["2", "3"])),
                ("c3".to_string(), child("c3", "C", &[])),
            ]),
            ..Default::default()
        });
        let parent = response(r#"{"queryId":"parent","resultIds":"c1,c2,c3","rowtype":[],"rowset":[]}"#);

        let mut rs = ResultSet::new(factory(Some(service.clone())), &parent)
            .await
            .unwrap();
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rs.chain_state(), ChainState::HasNext);

        let mut results = Vec::new();
        let mut advances = 0;
        loop {
            results.push((rs.query_id().to_string(), rs.columns(), drain(&mut rs).await));
            if !rs.next_result_set().await.unwrap() {
                break;
            }
            advances += 1;
        }

        assert_eq!(advances, 2);
        assert_eq!(
            results,
            vec![
                ("c1".to_string(), vec!["A".to_string()], vec![1]),
                ("c2".to_string(), vec!["B".to_string()], vec![2, 3]),
                ("c3".to_string(), vec!["C".to_string()], vec![]),
            ]
        );
        assert_eq!(rs.chain_state(), ChainState::Exhausted);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_child_ends_chain() {
        // c2 is unknown to the service, so loading it fails.
        let service = Arc::new(MockService {
            children: HashMap::from([
                ("c1".to_string(), child("c1", "A", &["1"])),
                ("c3".to_string(), child("c3", "C", &["3"])),
            ]),
            ..Default::default()
        });
        let parent = response(r#"{"queryId":"parent","resultIds":"c1,c2,c3","rowtype":[],"rowset":[]}"#);

        let mut rs = ResultSet::new(factory(Some(service.clone())), &parent)
            .await
            .unwrap();
        assert_eq!(drain(&mut rs).await, vec![1]);

        let err = rs.next_result_set().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(rs.chain_state(), ChainState::Exhausted);

        // c3 is never reached.
        assert!(!rs.next_result_set().await.unwrap());
        assert_eq!(rs.chain_state(), ChainState::Exhausted);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        rs.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_children_need_a_result_service() {
        let parent = response(r#"{"queryId":"p","resultIds":"c1","rowtype":[],"rowset":[]}"#);
        let err = ResultSet::new(factory(None), &parent).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_scan_without_current_row() {
        let rs = ResultSet::new(factory(None), &child("q", "A", &["1"]))
            .await
            .unwrap();
        let mut n = 0i64;
        let err = rs.scan(&mut [&mut n]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_rows_blocking_interface() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let factory = Arc::new(
            ResultSetFactory::new(ResultStreamConfig::default(), runtime.handle().clone())
                .unwrap(),
        );
        let result_set = runtime
            .block_on(ResultSet::new(factory, &child("q", "A", &["4", "5"])))
            .unwrap();
        let mut rows = Rows::new(result_set, runtime.handle().clone());

        assert_eq!(rows.columns(), vec!["A".to_string()]);
        let mut seen = Vec::new();
        while rows.next().unwrap() {
            let mut n: Option<i64> = None;
            rows.scan(&mut [&mut n]).unwrap();
            seen.push(n);
        }
        assert_eq!(seen, vec![Some(4), Some(5)]);
        assert_eq!(rows.current(), None);
        assert!(!rows.next_result_set().unwrap());
        rows.close().unwrap();
        rows.close().unwrap();
        assert_eq!(rows.result_set().cursor().state().consumed, 2);
    }
}
