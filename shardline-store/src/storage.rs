//! Keyed-item backend abstraction.
//!
//! This module provides the trait every backend implements (the simulated
//! in-memory store for tests, DynamoDB in production). It is a thin mirror
//! of the wire API: one call per method, no retries. Retrying and batch
//! reconciliation live in [`crate::ItemExecutor`].

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::item::Item;
use crate::request::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, DeleteItemRequest,
    GetItemRequest, Page, PutItemRequest, QueryRequest, ScanRequest, UpdateItemRequest,
};

/// Keyed-item backend trait.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetches one item; `Ok(None)` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the call fails.
    async fn get_item(&self, request: &GetItemRequest) -> StoreResult<Option<Item>>;

    /// Writes one item, honouring the request's condition.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` if the condition does not hold.
    async fn put_item(&self, request: &PutItemRequest) -> StoreResult<()>;

    /// Updates one item and returns it as stored after the update.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` if the condition does not hold; the
    /// stored item is then unchanged.
    async fn update_item(&self, request: &UpdateItemRequest) -> StoreResult<Item>;

    /// Deletes one item. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` if the condition does not hold.
    async fn delete_item(&self, request: &DeleteItemRequest) -> StoreResult<()>;

    /// Returns one page of items matching the key equality constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or index is missing or the call fails.
    async fn query(&self, request: &QueryRequest) -> StoreResult<Page>;

    /// Returns one page of a full-table scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is missing or the call fails.
    async fn scan(&self, request: &ScanRequest) -> StoreResult<Page>;

    /// Fetches many items; keys not serviced come back as `unprocessed`.
    ///
    /// # Errors
    ///
    /// Returns an error if a table is missing or the call fails outright.
    async fn batch_get_item(&self, request: &BatchGetRequest) -> StoreResult<BatchGetOutput>;

    /// Writes many items; writes not serviced come back as `unprocessed`.
    ///
    /// # Errors
    ///
    /// Returns an error if a table is missing or the call fails outright.
    async fn batch_write_item(&self, request: &BatchWriteRequest) -> StoreResult<BatchWriteOutput>;
}
