//! DynamoDB Local integration tests for `DynamoDbItemStore`.
//!
//! These tests require DynamoDB Local to be running. Start it with:
//!
//! ```bash
//! docker run --rm -p 8000:8000 amazon/dynamodb-local
//! ```
//!
//! Create the test table:
//!
//! ```bash
//! aws --endpoint-url=http://localhost:8000 dynamodb create-table \
//!     --table-name shardline-test \
//!     --attribute-definitions AttributeName=owner_address,AttributeType=S \
//!         AttributeName=asset_address,AttributeType=S \
//!     --key-schema AttributeName=owner_address,KeyType=HASH \
//!         AttributeName=asset_address,KeyType=RANGE \
//!     --billing-mode PAY_PER_REQUEST
//! ```
//!
//! Run tests with:
//!
//! ```bash
//! cargo test -p shardline-store --features dynamodb --test dynamodb_integration -- --ignored
//! ```

#![cfg(feature = "dynamodb")]

use shardline_core::RetryConfig;
use shardline_store::{
    item, AttributeValue, BatchGetRequest, BatchWriteRequest, BigInt, CompareOp, Condition,
    DeleteItemRequest, DynamoDbConfig, DynamoDbItemStore, GetItemRequest, Item, ItemExecutor,
    QueryRequest, StoreError, UpdateAction, UpdateItemRequest, WriteRequest,
};

const TEST_TABLE: &str = "shardline-test";
const LOCAL_ENDPOINT: &str = "http://localhost:8000";

async fn create_executor() -> ItemExecutor<DynamoDbItemStore> {
    let config = DynamoDbConfig::default()
        .with_endpoint(LOCAL_ENDPOINT)
        .with_region("us-east-1");
    let store = DynamoDbItemStore::new(config).await;
    ItemExecutor::new(store, RetryConfig::default())
}

fn key(owner: &str) -> Item {
    item([
        ("owner_address", AttributeValue::s(owner)),
        ("asset_address", AttributeValue::s("0xerc20")),
    ])
}

// -----------------------------------------------------------------------------
// Single-item Operations
// -----------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires DynamoDB Local"]
async fn test_dynamodb_conditional_add() {
    let executor = create_executor().await;
    let key = key("0xintegration-add");
    executor
        .delete_item(&DeleteItemRequest::new(TEST_TABLE, key.clone()))
        .await
        .expect("delete failed");

    let credit = UpdateItemRequest::new(
        TEST_TABLE,
        key.clone(),
        vec![UpdateAction::add("pessimistic_settled_balance", BigInt::from(10))],
    );
    let committed = executor.update_item(&credit).await.expect("update failed");
    assert_eq!(
        committed["pessimistic_settled_balance"],
        AttributeValue::n(10)
    );

    let overdraft = UpdateItemRequest::new(
        TEST_TABLE,
        key.clone(),
        vec![UpdateAction::add("pessimistic_settled_balance", BigInt::from(-20))],
    )
    .with_condition(Condition::compare(
        "pessimistic_settled_balance",
        CompareOp::Ge,
        AttributeValue::n(20),
    ));
    let err = executor.update_item(&overdraft).await.unwrap_err();
    assert!(matches!(err, StoreError::ConditionalCheckFailed { .. }));

    let stored = executor
        .get_item(&GetItemRequest::new(TEST_TABLE, key).consistent())
        .await
        .expect("get failed")
        .expect("item missing");
    assert_eq!(stored["pessimistic_settled_balance"], AttributeValue::n(10));
}

// -----------------------------------------------------------------------------
// Batch Operations
// -----------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires DynamoDB Local"]
async fn test_dynamodb_batch_roundtrip() {
    let executor = create_executor().await;
    let owners: Vec<String> = (0..10).map(|i| format!("0xbatch-{i}")).collect();

    let writes = owners
        .iter()
        .map(|owner| {
            let mut record = key(owner);
            record.insert("settled_balance".to_string(), AttributeValue::n(1));
            WriteRequest::Put(record)
        })
        .collect();
    let outcome = executor
        .batch_write(BatchWriteRequest::new().with_writes(TEST_TABLE, writes))
        .await
        .expect("batch write failed");
    assert!(outcome.is_complete());

    let keys = owners.iter().map(|owner| key(owner)).collect();
    let outcome = executor
        .batch_get(BatchGetRequest::new().with_keys(TEST_TABLE, keys))
        .await
        .expect("batch get failed");
    assert!(outcome.is_complete());
    assert_eq!(outcome.items_for(TEST_TABLE).len(), owners.len());
}

#[tokio::test]
#[ignore = "requires DynamoDB Local"]
async fn test_dynamodb_query_by_partition() {
    let executor = create_executor().await;
    let items = executor
        .query_all(&QueryRequest::new(TEST_TABLE).key_eq("owner_address", "0xbatch-0"))
        .await
        .expect("query failed");
    assert!(items.len() <= 1);
}

#[tokio::test]
#[ignore = "requires DynamoDB Local"]
async fn test_dynamodb_missing_table_maps_to_resource_not_found() {
    let config = DynamoDbConfig::default()
        .with_endpoint(LOCAL_ENDPOINT)
        .with_region("us-east-1");
    let store = DynamoDbItemStore::new(config).await;
    let executor = ItemExecutor::new(
        store,
        RetryConfig {
            attempts: 2,
            batch_retry_budget: 0,
            constant_delay_ms: 0,
            variable_delay_ms: 0,
        },
    );
    let err = executor
        .get_item(&GetItemRequest::new("shardline-missing", key("0xabc")))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ResourceNotFound { .. }));
}
