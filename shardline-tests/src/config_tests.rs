//! Integration tests for configuration files driving the full stack.

use std::io::Write;

use num_bigint::BigInt;
use shardline_cache::cache_key;
use shardline_core::{ConfigError, ShardlineConfig};
use shardline_store::ItemStoreFaultConfig;

use crate::harness::Harness;
use crate::scenarios::shards;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_config_file_renames_tables_and_cache_prefix() {
    let file = write_config(
        r#"
        [retry]
        attempts = 4
        constant_delay_ms = 0
        variable_delay_ms = 0

        [cache]
        key_prefix = "staging"

        [tables]
        shard_registry = "staging_shards"
        shard_assignments = "staging_assignments"
        "#,
    );
    let config = ShardlineConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();

    let harness = Harness::with_config(3, config, ItemStoreFaultConfig::none());
    let shard = harness.add_enabled_shards(shards::ONE).await.remove(0);
    assert!(harness.store.has_table("staging_shards"));
    assert!(harness.store.has_table("staging_assignments"));
    assert_eq!(harness.store.item_count("staging_shards"), 1);

    harness
        .ledger
        .update("0xabc", "0xerc20", &BigInt::from(5), &BigInt::from(0))
        .await
        .unwrap();
    assert_eq!(harness.store.item_count("staging_assignments"), 1);

    harness.registry.get_shard_by_name(&shard).await.unwrap();
    let key = cache_key("staging", "shard", &[shard.as_str()]);
    harness.settle(&key).await;
    assert!(harness.cache.contains_key(&key));
}

#[test]
fn test_config_overrides_apply_after_file() {
    let file = write_config("[retry]\nattempts = 4\n");
    let config = ShardlineConfig::from_file(file.path())
        .unwrap()
        .with_overrides(|var| match var {
            "SHARDLINE_RETRY_ATTEMPTS" => Some("7".to_string()),
            "SHARDLINE_CACHE_PREFIX" => Some("blue".to_string()),
            _ => None,
        })
        .unwrap();

    assert_eq!(config.retry.attempts, 7);
    assert_eq!(config.cache.key_prefix, "blue");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_out_of_bounds_rejected() {
    let file = write_config("[ledger]\nconcurrency = 0\n");
    let config = ShardlineConfig::from_file(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid {
            field: "ledger.concurrency",
            ..
        })
    ));
}

#[test]
fn test_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = ShardlineConfig::from_file(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}
