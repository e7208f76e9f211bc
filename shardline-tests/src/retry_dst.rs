//! Deterministic simulation tests for batch reconciliation.
//!
//! These tests drive `ItemExecutor` batch calls against a
//! `SimulatedItemStore` that withholds work, and check that the executor
//! either converges or reports exactly what it could not finish.

use shardline_core::RetryConfig;
use shardline_store::{
    item, BatchGetRequest, BatchWriteRequest, Item, ItemExecutor, ItemStoreFaultConfig,
    KeySchema, SimulatedItemStore, TableSchema, WriteRequest,
};

use crate::scenarios::seeds::REGRESSION_SEEDS;

const TABLE: &str = "events";

// =============================================================================
// Helper Functions
// =============================================================================

fn retry_config(budget: u32) -> RetryConfig {
    RetryConfig {
        attempts: 10,
        batch_retry_budget: budget,
        constant_delay_ms: 0,
        variable_delay_ms: 0,
    }
}

fn create_executor(
    seed: u64,
    budget: u32,
    faults: ItemStoreFaultConfig,
) -> (ItemExecutor<SimulatedItemStore>, SimulatedItemStore) {
    let store = SimulatedItemStore::with_faults(seed, faults);
    store.create_table(TableSchema::new(TABLE, KeySchema::hash("id")));
    (ItemExecutor::new(store.clone(), retry_config(budget)), store)
}

fn event(n: usize) -> Item {
    item([("id", format!("evt-{n}")), ("payload", format!("body-{n}"))])
}

fn event_key(n: usize) -> Item {
    item([("id", format!("evt-{n}"))])
}

fn write_batch(count: usize) -> BatchWriteRequest {
    BatchWriteRequest::new().with_writes(
        TABLE,
        (0..count).map(|n| WriteRequest::Put(event(n))).collect(),
    )
}

fn get_batch(count: usize) -> BatchGetRequest {
    BatchGetRequest::new().with_keys(TABLE, (0..count).map(event_key).collect())
}

// =============================================================================
// Forced Residue Tests
// =============================================================================

#[tokio::test]
async fn test_dst_retry_write_converges_within_budget() {
    for withheld in 0..5u32 {
        let (executor, store) = create_executor(
            42,
            5,
            ItemStoreFaultConfig::none().with_batch_unprocessed_calls(withheld),
        );

        let outcome = executor.batch_write(write_batch(20)).await.unwrap();

        assert!(outcome.is_complete(), "withheld {withheld} calls");
        assert_eq!(outcome.attempts, withheld + 1);
        assert_eq!(store.item_count(TABLE), 20);
    }
}

#[tokio::test]
async fn test_dst_retry_write_budget_exhausted() {
    let budget = 3;
    let (executor, store) = create_executor(
        42,
        budget,
        ItemStoreFaultConfig::none().with_batch_unprocessed_calls(budget + 2),
    );

    let outcome = executor.batch_write(write_batch(20)).await.unwrap();

    assert_eq!(outcome.attempts, budget + 1);
    assert_eq!(outcome.unprocessed_count(), 20);
    assert_eq!(store.batch_call_count(), u64::from(budget + 1));
    assert_eq!(store.item_count(TABLE), 0);
}

#[tokio::test]
async fn test_dst_retry_zero_budget_makes_one_call() {
    let (executor, store) = create_executor(
        7,
        0,
        ItemStoreFaultConfig::none().with_batch_unprocessed_calls(1),
    );

    let outcome = executor.batch_get(get_batch(5)).await.unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.unprocessed_count(), 5);
    assert_eq!(store.batch_call_count(), 1);
}

#[tokio::test]
async fn test_dst_retry_missing_table_and_throttle_requeue_everything() {
    let (executor, store) = create_executor(
        99,
        5,
        ItemStoreFaultConfig::none()
            .with_batch_missing_table_calls(1)
            .with_batch_throttle_calls(2),
    );

    let written = executor.batch_write(write_batch(10)).await.unwrap();
    assert!(written.is_complete());
    assert_eq!(written.attempts, 4);
    assert_eq!(store.item_count(TABLE), 10);
}

#[tokio::test]
async fn test_dst_retry_empty_batch_never_calls_backend() {
    let (executor, store) = create_executor(1, 5, ItemStoreFaultConfig::none());

    let outcome = executor.batch_get(BatchGetRequest::new()).await.unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.attempts, 0);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_dst_retry_oversized_batch_is_rejected_before_io() {
    let (executor, store) = create_executor(1, 5, ItemStoreFaultConfig::none());

    assert!(executor.batch_write(write_batch(26)).await.is_err());
    assert!(executor.batch_get(get_batch(101)).await.is_err());
    assert_eq!(store.call_count(), 0);
}

// =============================================================================
// Random Residue Tests
// =============================================================================

#[tokio::test]
async fn test_dst_retry_partial_residue_converges_multi_seed() {
    for &seed in REGRESSION_SEEDS {
        let (executor, store) = create_executor(
            seed,
            10,
            ItemStoreFaultConfig::none().with_unprocessed_rate(0.2),
        );

        let written = executor.batch_write(write_batch(25)).await.unwrap();
        assert!(written.is_complete(), "seed {seed}: write residue");
        assert_eq!(store.item_count(TABLE), 25, "seed {seed}");

        let read = executor.batch_get(get_batch(25)).await.unwrap();
        assert!(read.is_complete(), "seed {seed}: read residue");
        assert_eq!(read.items_for(TABLE).len(), 25, "seed {seed}");
    }
}

#[tokio::test]
async fn test_dst_retry_same_seed_same_attempts() {
    for &seed in REGRESSION_SEEDS {
        let run = || async move {
            let (executor, _) = create_executor(
                seed,
                10,
                ItemStoreFaultConfig::none().with_unprocessed_rate(0.5),
            );
            executor.batch_write(write_batch(25)).await.unwrap().attempts
        };
        assert_eq!(run().await, run().await, "seed {seed} diverged");
    }
}

#[tokio::test]
async fn test_dst_retry_read_returns_only_existing_items() {
    let (executor, store) = create_executor(
        0xCAFE_BABE,
        10,
        ItemStoreFaultConfig::none().with_unprocessed_rate(0.3),
    );
    executor.batch_write(write_batch(8)).await.unwrap();

    let read = executor.batch_get(get_batch(12)).await.unwrap();

    assert!(read.is_complete());
    assert_eq!(read.items_for(TABLE).len(), 8);
    assert_eq!(store.item_count(TABLE), 8);
}
