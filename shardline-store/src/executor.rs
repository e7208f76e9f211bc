//! Retrying executor for keyed-item operations.
//!
//! The `ItemExecutor` wraps any [`ItemStore`] and gives every logical
//! operation bounded retry with linear backoff:
//!
//! - Single-item calls, queries and scans are retried only while the table
//!   reports `ResourceNotFound`. Every other failure is returned at once.
//! - Batch calls are re-issued with just the unprocessed residue until the
//!   residue is empty or the batch budget is spent. The result is `Ok` either
//!   way and carries whatever is still unprocessed.
//!
//! Attempts within one operation are strictly sequential.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use shardline_core::limits::{BATCH_GET_KEYS_MAX, BATCH_WRITE_ITEMS_MAX, PAGES_MAX};
use shardline_core::RetryConfig;
use tracing::{debug, error, warn};

use crate::error::{StoreError, StoreResult};
use crate::item::Item;
use crate::request::{
    BatchGetRequest, BatchWriteRequest, DeleteItemRequest, GetItemRequest, PutItemRequest,
    QueryRequest, ScanRequest, UpdateItemRequest, WriteRequest,
};
use crate::storage::ItemStore;

// -----------------------------------------------------------------------------
// Batch outcomes
// -----------------------------------------------------------------------------

/// Aggregate result of a batch-get after reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetOutcome {
    /// Items found, per table, across every attempt.
    pub items: BTreeMap<String, Vec<Item>>,
    /// Keys still unprocessed once the budget was spent.
    pub unprocessed: BTreeMap<String, Vec<Item>>,
    /// Backend calls issued.
    pub attempts: u32,
}

impl BatchGetOutcome {
    /// Returns true if every key was serviced.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unprocessed.values().all(Vec::is_empty)
    }

    /// Number of keys left unprocessed.
    #[must_use]
    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed.values().map(Vec::len).sum()
    }

    /// Items found in one table.
    #[must_use]
    pub fn items_for(&self, table: &str) -> &[Item] {
        self.items.get(table).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Aggregate result of a batch-write after reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteOutcome {
    /// Writes still unprocessed once the budget was spent.
    pub unprocessed: BTreeMap<String, Vec<WriteRequest>>,
    /// Backend calls issued.
    pub attempts: u32,
}

impl BatchWriteOutcome {
    /// Returns true if every write was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unprocessed.values().all(Vec::is_empty)
    }

    /// Number of writes left unprocessed.
    #[must_use]
    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed.values().map(Vec::len).sum()
    }
}

// -----------------------------------------------------------------------------
// ItemExecutor
// -----------------------------------------------------------------------------

/// Retrying executor over an item store.
///
/// Cloning is cheap; clones share the backend.
pub struct ItemExecutor<S: ItemStore> {
    /// Backend.
    store: Arc<S>,
    /// Retry tunables.
    retry: RetryConfig,
}

impl<S: ItemStore> Clone for ItemExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<S: ItemStore> ItemExecutor<S> {
    /// Creates an executor owning the backend.
    #[must_use]
    pub fn new(store: S, retry: RetryConfig) -> Self {
        Self::from_arc(Arc::new(store), retry)
    }

    /// Creates an executor over a shared backend.
    #[must_use]
    pub const fn from_arc(store: Arc<S>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Returns a reference to the backend.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the retry configuration.
    #[must_use]
    pub const fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    // -------------------------------------------------------------------------
    // Single-item operations
    // -------------------------------------------------------------------------

    /// Fetches one item; `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns the backend error once retries are exhausted or on any
    /// non-transient failure.
    pub async fn get_item(&self, request: &GetItemRequest) -> StoreResult<Option<Item>> {
        self.with_retry("get_item", &request.table, || self.store.get_item(request))
            .await
    }

    /// Writes one item.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` without retrying if the condition
    /// does not hold.
    pub async fn put_item(&self, request: &PutItemRequest) -> StoreResult<()> {
        self.with_retry("put_item", &request.table, || self.store.put_item(request))
            .await
    }

    /// Updates one item and returns it as committed.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` without retrying if the condition
    /// does not hold.
    pub async fn update_item(&self, request: &UpdateItemRequest) -> StoreResult<Item> {
        self.with_retry("update_item", &request.table, || {
            self.store.update_item(request)
        })
        .await
    }

    /// Deletes one item.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` without retrying if the condition
    /// does not hold.
    pub async fn delete_item(&self, request: &DeleteItemRequest) -> StoreResult<()> {
        self.with_retry("delete_item", &request.table, || {
            self.store.delete_item(request)
        })
        .await
    }

    /// Fetches every page of a query.
    ///
    /// # Errors
    ///
    /// Returns the first page error, or `Validation` if the result spans
    /// more than `PAGES_MAX` pages.
    pub async fn query_all(&self, request: &QueryRequest) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut page_request = request.clone();
        for _ in 0..PAGES_MAX {
            let page = self
                .with_retry("query", &request.table, || self.store.query(&page_request))
                .await?;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => page_request.exclusive_start_key = Some(key),
                None => return Ok(items),
            }
        }
        Err(StoreError::validation(format!(
            "query on '{}' exceeded {PAGES_MAX} pages",
            request.table
        )))
    }

    /// Fetches every page of a scan.
    ///
    /// # Errors
    ///
    /// Returns the first page error, or `Validation` if the result spans
    /// more than `PAGES_MAX` pages.
    pub async fn scan_all(&self, request: &ScanRequest) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut page_request = request.clone();
        for _ in 0..PAGES_MAX {
            let page = self
                .with_retry("scan", &request.table, || self.store.scan(&page_request))
                .await?;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => page_request.exclusive_start_key = Some(key),
                None => return Ok(items),
            }
        }
        Err(StoreError::validation(format!(
            "scan on '{}' exceeded {PAGES_MAX} pages",
            request.table
        )))
    }

    // -------------------------------------------------------------------------
    // Batch operations
    // -------------------------------------------------------------------------

    /// Fetches many items, re-issuing unprocessed keys until none remain or
    /// the batch budget is spent.
    ///
    /// An empty request returns an empty outcome without touching the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the request exceeds the batch-get ceiling, or
    /// any backend error other than a missing table or throttling.
    pub async fn batch_get(&self, request: BatchGetRequest) -> StoreResult<BatchGetOutcome> {
        let key_count = request.key_count();
        if key_count > BATCH_GET_KEYS_MAX {
            return Err(StoreError::validation(format!(
                "batch get of {key_count} keys exceeds ceiling of {BATCH_GET_KEYS_MAX}"
            )));
        }

        let mut outcome = BatchGetOutcome::default();
        let mut pending = request;
        let mut retries = 0u32;
        while !pending.is_empty() {
            outcome.attempts += 1;
            let result = self.store.batch_get_item(&pending).await;
            let residue = match result {
                Ok(output) => {
                    for (table, items) in output.responses {
                        outcome.items.entry(table).or_default().extend(items);
                    }
                    output.unprocessed
                }
                Err(err @ (StoreError::ResourceNotFound { .. }
                | StoreError::ThroughputExceeded { .. })) => {
                    debug!(error = %err, attempt = outcome.attempts, "Batch get not serviced");
                    std::mem::take(&mut pending.tables)
                }
                Err(err) => return Err(Self::surface("batch_get_item", err)),
            };
            let residue: BTreeMap<_, _> = residue
                .into_iter()
                .filter(|(_, keys)| !keys.is_empty())
                .collect();

            if residue.is_empty() {
                break;
            }
            if retries >= self.retry.batch_retry_budget {
                let remaining: usize = residue.values().map(Vec::len).sum();
                warn!(
                    remaining,
                    attempts = outcome.attempts,
                    "Batch get budget exhausted with unprocessed keys"
                );
                outcome.unprocessed = residue;
                break;
            }

            retries += 1;
            let delay = self.retry.delay_after(retries);
            debug!(
                remaining = residue.values().map(Vec::len).sum::<usize>(),
                retry = retries,
                delay_ms = delay.as_millis(),
                "Re-issuing unprocessed batch get keys"
            );
            tokio::time::sleep(delay).await;
            pending = BatchGetRequest { tables: residue };
        }
        Ok(outcome)
    }

    /// Writes many items, re-issuing unprocessed writes until none remain or
    /// the batch budget is spent.
    ///
    /// An empty request returns an empty outcome without touching the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the request exceeds the batch-write ceiling,
    /// or any backend error other than a missing table or throttling.
    pub async fn batch_write(&self, request: BatchWriteRequest) -> StoreResult<BatchWriteOutcome> {
        let write_count = request.write_count();
        if write_count > BATCH_WRITE_ITEMS_MAX {
            return Err(StoreError::validation(format!(
                "batch write of {write_count} items exceeds ceiling of {BATCH_WRITE_ITEMS_MAX}"
            )));
        }

        let mut outcome = BatchWriteOutcome::default();
        let mut pending = request;
        let mut retries = 0u32;
        while !pending.is_empty() {
            outcome.attempts += 1;
            let result = self.store.batch_write_item(&pending).await;
            let residue = match result {
                Ok(output) => output.unprocessed,
                Err(err @ (StoreError::ResourceNotFound { .. }
                | StoreError::ThroughputExceeded { .. })) => {
                    debug!(error = %err, attempt = outcome.attempts, "Batch write not serviced");
                    std::mem::take(&mut pending.tables)
                }
                Err(err) => return Err(Self::surface("batch_write_item", err)),
            };
            let residue: BTreeMap<_, _> = residue
                .into_iter()
                .filter(|(_, writes)| !writes.is_empty())
                .collect();

            if residue.is_empty() {
                break;
            }
            if retries >= self.retry.batch_retry_budget {
                let remaining: usize = residue.values().map(Vec::len).sum();
                warn!(
                    remaining,
                    attempts = outcome.attempts,
                    "Batch write budget exhausted with unprocessed writes"
                );
                outcome.unprocessed = residue;
                break;
            }

            retries += 1;
            let delay = self.retry.delay_after(retries);
            debug!(
                remaining = residue.values().map(Vec::len).sum::<usize>(),
                retry = retries,
                delay_ms = delay.as_millis(),
                "Re-issuing unprocessed batch writes"
            );
            tokio::time::sleep(delay).await;
            pending = BatchWriteRequest { tables: residue };
        }
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Runs `call` until it succeeds, fails with anything other than
    /// `ResourceNotFound`, or `retry.attempts` attempts have been made.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        table: &str,
        mut call: F,
    ) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(StoreError::ResourceNotFound { .. }) if attempt < attempts => {
                    let delay = self.retry.delay_after(attempt);
                    debug!(
                        operation,
                        table,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Table reported not found, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err @ StoreError::ResourceNotFound { .. }) => {
                    warn!(operation, table, attempts, "Retry attempts exhausted");
                    return Err(err);
                }
                Err(err) => return Err(Self::surface(operation, err)),
            }
        }
    }

    /// Logs unexpected faults before handing them back.
    fn surface(operation: &'static str, err: StoreError) -> StoreError {
        if matches!(err, StoreError::Transport { .. }) {
            error!(operation, error = %err, "Unexpected store failure");
        }
        err
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use num_bigint::BigInt;

    use super::*;
    use crate::expr::{CompareOp, Condition, UpdateAction};
    use crate::item::{item, AttributeValue};
    use crate::schema::{KeySchema, TableSchema};
    use crate::simulated::{ItemStoreFaultConfig, SimulatedItemStore};

    const TABLE: &str = "bal_shard_1";

    fn retry(attempts: u32, budget: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            batch_retry_budget: budget,
            constant_delay_ms: 0,
            variable_delay_ms: 0,
        }
    }

    fn executor(config: ItemStoreFaultConfig, retry: RetryConfig) -> ItemExecutor<SimulatedItemStore> {
        let store = SimulatedItemStore::with_faults(42, config);
        store.create_table(TableSchema::new(
            TABLE,
            KeySchema::composite("owner_address", "asset_address"),
        ));
        ItemExecutor::new(store, retry)
    }

    fn key(owner: &str) -> Item {
        item([
            ("owner_address", AttributeValue::s(owner)),
            ("asset_address", AttributeValue::s("0xerc20")),
        ])
    }

    fn record(owner: &str, settled: i64) -> Item {
        let mut it = key(owner);
        it.insert("settled_balance".to_string(), AttributeValue::n(settled));
        it
    }

    #[tokio::test]
    async fn test_transient_missing_table_is_retried() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_missing_table_failures(3),
            retry(10, 0),
        );
        exec.put_item(&PutItemRequest::new(TABLE, record("0xabc", 1)))
            .await
            .unwrap();
        assert_eq!(exec.store().call_count(), 4);
    }

    #[tokio::test]
    async fn test_retry_attempts_are_bounded() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_missing_table_failures(100),
            retry(4, 0),
        );
        let err = exec
            .get_item(&GetItemRequest::new(TABLE, key("0xabc")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ResourceNotFound { .. }));
        assert_eq!(exec.store().call_count(), 4);
    }

    #[tokio::test]
    async fn test_conditional_failure_is_not_retried() {
        let exec = executor(ItemStoreFaultConfig::none(), retry(10, 0));
        let request = UpdateItemRequest::new(
            TABLE,
            key("0xabc"),
            vec![UpdateAction::add("settled_balance", BigInt::from(-1))],
        )
        .with_condition(Condition::compare(
            "settled_balance",
            CompareOp::Ge,
            AttributeValue::n(1),
        ));
        let err = exec.update_item(&request).await.unwrap_err();
        assert!(err.is_conditional_check_failed());
        assert_eq!(exec.store().call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_force_transport_fail(),
            retry(10, 0),
        );
        let err = exec
            .delete_item(&DeleteItemRequest::new(TABLE, key("0xabc")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transport { .. }));
        assert_eq!(exec.store().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_missing_table_failures(3),
            RetryConfig {
                attempts: 10,
                batch_retry_budget: 0,
                constant_delay_ms: 25,
                variable_delay_ms: 25,
            },
        );
        let started = tokio::time::Instant::now();
        exec.get_item(&GetItemRequest::new(TABLE, key("0xabc")))
            .await
            .unwrap();
        // (25 + 25) + (25 + 50) + (25 + 75)
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(225), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_batch_write_converges_within_budget() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_batch_unprocessed_calls(3),
            retry(10, 5),
        );
        let writes = (0..10)
            .map(|i| WriteRequest::Put(record(&format!("0x{i}"), i)))
            .collect();
        let outcome = exec
            .batch_write(BatchWriteRequest::new().with_writes(TABLE, writes))
            .await
            .unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.attempts, 4);
        assert_eq!(exec.store().item_count(TABLE), 10);
    }

    #[tokio::test]
    async fn test_batch_residue_after_budget() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_batch_unprocessed_calls(10),
            retry(10, 2),
        );
        let keys = vec![key("0xa"), key("0xb")];
        let outcome = exec
            .batch_get(BatchGetRequest::new().with_keys(TABLE, keys))
            .await
            .unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.unprocessed_count(), 2);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_batch_missing_table_marks_request_unprocessed() {
        let exec = executor(
            ItemStoreFaultConfig::none()
                .with_batch_missing_table_calls(1)
                .with_batch_throttle_calls(1),
            retry(10, 3),
        );
        exec.store().put_raw_item(TABLE, record("0xa", 5));
        let outcome = exec
            .batch_get(BatchGetRequest::new().with_keys(TABLE, vec![key("0xa"), key("0xb")]))
            .await
            .unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.items_for(TABLE), &[record("0xa", 5)]);
    }

    #[tokio::test]
    async fn test_batch_partial_results_merge() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_unprocessed_rate(0.5),
            retry(10, 50),
        );
        for i in 0..40 {
            exec.store().put_raw_item(TABLE, record(&format!("0x{i}"), i));
        }
        let keys = (0..40).map(|i| key(&format!("0x{i}"))).collect();
        let outcome = exec
            .batch_get(BatchGetRequest::new().with_keys(TABLE, keys))
            .await
            .unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.items_for(TABLE).len(), 40);
        assert!(outcome.attempts > 1);
    }

    #[tokio::test]
    async fn test_batch_ceiling_rejected_before_io() {
        let exec = executor(ItemStoreFaultConfig::none(), retry(10, 5));
        let keys = (0..=BATCH_GET_KEYS_MAX)
            .map(|i| key(&format!("0x{i}")))
            .collect();
        let err = exec
            .batch_get(BatchGetRequest::new().with_keys(TABLE, keys))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert_eq!(exec.store().call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_backend() {
        let exec = executor(ItemStoreFaultConfig::none(), retry(10, 5));
        let outcome = exec.batch_get(BatchGetRequest::new()).await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.attempts, 0);
        assert_eq!(exec.store().call_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_all_follows_pages() {
        let exec = executor(
            ItemStoreFaultConfig::none().with_missing_table_failures(1),
            retry(10, 0),
        );
        for i in 0..7 {
            exec.store().put_raw_item(TABLE, record(&format!("0x{i}"), i));
        }
        let items = exec
            .scan_all(&ScanRequest::new(TABLE).with_limit(3))
            .await
            .unwrap();
        assert_eq!(items.len(), 7);
    }
}
