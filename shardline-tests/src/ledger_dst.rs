//! Deterministic simulation tests for the balance ledger.
//!
//! Each workload is a seeded sequence of credits, debit holds and
//! settlements against the full stack. A client-side model decides which
//! updates must be accepted; every committed record is checked against the
//! ledger invariants.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigInt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardline_core::ShardlineConfig;
use shardline_ledger::{BalanceKey, BalanceRecord, LedgerError, ShardSchema};
use shardline_store::ItemStoreFaultConfig;

use crate::harness::Harness;
use crate::properties::{check_balance_record, BalanceModel};
use crate::scenarios::seeds::REGRESSION_SEEDS;
use crate::scenarios::shards;
use crate::scenarios::workloads::{ASSET, OWNERS, STEPS};

// =============================================================================
// Helper Functions
// =============================================================================

/// Picks the deltas of one workload step.
fn next_step(rng: &mut StdRng, model: &BalanceModel) -> (BigInt, BigInt) {
    match rng.gen_range(0..3u8) {
        0 => (BigInt::from(rng.gen_range(1..50i64)), BigInt::from(0)),
        1 => (BigInt::from(0), BigInt::from(rng.gen_range(1..40i64))),
        _ => {
            let outstanding = i64::try_from(&model.unsettled).unwrap_or(0);
            if outstanding <= 0 {
                return (BigInt::from(rng.gen_range(1..50i64)), BigInt::from(0));
            }
            let settled = BigInt::from(rng.gen_range(1..=outstanding));
            (-settled.clone(), -settled)
        }
    }
}

/// Reads the committed record straight from the store.
async fn stored_record(harness: &Harness, owner: &str) -> Option<BalanceRecord> {
    let key = BalanceKey::new(owner, ASSET).unwrap();
    let shard = harness
        .directory
        .get_assignment(&[key.owner_address.clone()], &harness.entity_type())
        .await
        .unwrap()
        .remove(&key.owner_address)
        .flatten()?
        .shard_name;
    let table = harness.ledger.table_schema(&shard).name;
    let row_key = harness.ledger.entity().schema().item_key(&key);
    harness
        .store
        .get_raw_item(&table, &row_key)
        .map(|row| BalanceRecord::from_item(&row).unwrap())
}

/// Runs one seeded workload and returns the final model per owner.
async fn run_workload(harness: &Harness, seed: u64) -> HashMap<String, BalanceModel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut models: HashMap<String, BalanceModel> = HashMap::new();

    for step in 0..STEPS {
        let owner = OWNERS[rng.gen_range(0..OWNERS.len())];
        let model = models.entry(owner.to_lowercase()).or_default();
        let (delta_settled, delta_unsettled) = next_step(&mut rng, model);

        let result = harness
            .ledger
            .update(owner, ASSET, &delta_settled, &delta_unsettled)
            .await;

        if model.accepts(&delta_unsettled) {
            let record = result.unwrap_or_else(|err| {
                panic!("seed {seed} step {step}: accepted update failed: {err}")
            });
            model.apply(&delta_settled, &delta_unsettled);
            assert_eq!(record.settled_balance, model.settled, "seed {seed} step {step}");
            assert_eq!(record.unsettled_debits, model.unsettled, "seed {seed} step {step}");
            check_balance_record(&record, false)
                .unwrap_or_else(|v| panic!("seed {seed} step {step}: {v:?}"));
        } else {
            assert!(
                matches!(result, Err(LedgerError::ConditionalCheckFailed { .. })),
                "seed {seed} step {step}: overdraft not rejected: {result:?}"
            );
        }
    }
    models
}

// =============================================================================
// Workload Tests
// =============================================================================

#[tokio::test]
async fn test_dst_ledger_workload_matches_model() {
    for &seed in REGRESSION_SEEDS {
        let harness = Harness::new(seed);
        harness.add_enabled_shards(shards::THREE).await;

        let models = run_workload(&harness, seed).await;

        let owners: Vec<String> = models.keys().cloned().collect();
        for owner in &owners {
            let model = &models[owner];
            let Some(record) = stored_record(&harness, owner).await else {
                assert!(model.is_zero(), "seed {seed}: no record for {owner}");
                continue;
            };
            assert_eq!(record.settled_balance, model.settled, "seed {seed} {owner}");
            assert_eq!(record.unsettled_debits, model.unsettled, "seed {seed} {owner}");
            assert_eq!(record.available_balance(), model.available());
        }
    }
}

#[tokio::test]
async fn test_dst_ledger_workload_under_faults() {
    for &seed in REGRESSION_SEEDS {
        let harness = Harness::with_config(
            seed,
            ShardlineConfig::for_testing(),
            ItemStoreFaultConfig::flaky(),
        );
        let shard = harness.add_enabled_shards(shards::ONE).await.remove(0);

        let models = run_workload(&harness, seed).await;

        let owners: Vec<String> = models.keys().cloned().collect();
        let views = harness
            .ledger
            .get_balance(&shard, ASSET, &owners)
            .await
            .unwrap();
        for owner in &owners {
            let model = &models[owner];
            assert_eq!(
                views[owner].available_balance,
                model.available().to_string(),
                "seed {seed} {owner}"
            );
        }
    }
}

#[tokio::test]
async fn test_dst_ledger_same_seed_same_outcome() {
    let seed = 0xDEAD_BEEF;
    let first = Harness::new(seed);
    first.add_enabled_shards(shards::THREE).await;
    let second = Harness::new(seed);
    second.add_enabled_shards(shards::THREE).await;

    let a = run_workload(&first, seed).await;
    let b = run_workload(&second, seed).await;

    assert_eq!(a, b);
    for owner in a.keys() {
        let balances = |record: Option<BalanceRecord>| {
            record.map(|r| (r.settled_balance, r.unsettled_debits))
        };
        assert_eq!(
            balances(stored_record(&first, owner).await),
            balances(stored_record(&second, owner).await)
        );
    }
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dst_ledger_concurrent_debits_never_overdraw() {
    let harness = Arc::new(Harness::new(12345));
    harness.add_enabled_shards(shards::THREE).await;
    harness
        .ledger
        .update("0xABC", ASSET, &BigInt::from(100), &BigInt::from(0))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..25 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            harness
                .ledger
                .update("0xabc", ASSET, &BigInt::from(0), &BigInt::from(10))
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(record) => {
                accepted += 1;
                check_balance_record(&record, false).unwrap();
            }
            Err(LedgerError::ConditionalCheckFailed { .. }) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(accepted, 10);
    let record = stored_record(&harness, "0xabc").await.unwrap();
    assert_eq!(record.settled_balance, BigInt::from(100));
    assert_eq!(record.unsettled_debits, BigInt::from(100));
    assert_eq!(record.pessimistic_settled_balance, BigInt::from(0));
}
