//! Cache backend abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{CacheError, CacheResult};

/// Key-value cache backend.
///
/// Values are opaque strings; the cache-aside layer owns encoding.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Reads one key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Reads many keys; the result is positionally aligned with `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn multi_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>>;

    /// Writes one key with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Deletes keys. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn del(&self, keys: &[String]) -> CacheResult<()>;
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Configuration for fault injection in the in-memory cache.
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct CacheFaultConfig {
    /// If true, every call fails until cleared.
    pub unavailable: bool,
    /// If true, next get or multi-get will fail (one-shot).
    pub force_get_fail: bool,
    /// If true, next set will fail (one-shot).
    pub force_set_fail: bool,
    /// If true, next del will fail (one-shot).
    pub force_del_fail: bool,
}

impl CacheFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Fails every call until reconfigured.
    #[must_use]
    pub const fn with_unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Fails the next read.
    #[must_use]
    pub const fn with_force_get_fail(mut self) -> Self {
        self.force_get_fail = true;
        self
    }

    /// Fails the next write.
    #[must_use]
    pub const fn with_force_set_fail(mut self) -> Self {
        self.force_set_fail = true;
        self
    }

    /// Fails the next delete.
    #[must_use]
    pub const fn with_force_del_fail(mut self) -> Self {
        self.force_del_fail = true;
        self
    }
}

// -----------------------------------------------------------------------------
// InMemoryCacheBackend
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory TTL cache.
///
/// Expiry follows `tokio::time`, so tests running with a paused clock can
/// advance past a TTL deterministically.
///
/// # Cloning
///
/// Clones share the same entries, fault configuration and counters.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    /// Entries by key.
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    /// Fault injection configuration.
    fault_config: Arc<Mutex<CacheFaultConfig>>,
    /// Successful `set` calls.
    sets: Arc<AtomicU64>,
}

impl InMemoryCacheBackend {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache with fault injection enabled.
    #[must_use]
    pub fn with_faults(config: CacheFaultConfig) -> Self {
        Self {
            fault_config: Arc::new(Mutex::new(config)),
            ..Self::default()
        }
    }

    /// Returns a reference to the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> MutexGuard<'_, CacheFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Returns true if a live entry exists for the key.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get_raw(key).is_some()
    }

    /// Reads a live entry directly, bypassing fault injection.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.lock_entries()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Writes an entry directly, bypassing fault injection.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn set_raw(&self, key: &str, value: impl Into<String>, ttl: Duration) {
        self.lock_entries().insert(
            key.to_string(),
            Entry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of live entries.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock_entries()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Returns true if there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful `set` calls so far.
    #[must_use]
    pub fn set_count(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().expect("entries lock poisoned")
    }

    /// Consumes a one-shot flag or reports a persistent outage.
    fn check_fault(
        &self,
        operation: &'static str,
        flag: impl FnOnce(&mut CacheFaultConfig) -> &mut bool,
    ) -> CacheResult<()> {
        let mut config = self.fault_config();
        if config.unavailable {
            return Err(CacheError::Backend {
                operation,
                message: "simulated cache outage".to_string(),
            });
        }
        let forced = flag(&mut *config);
        if *forced {
            *forced = false;
            return Err(CacheError::Backend {
                operation,
                message: format!("simulated {operation} failure (forced)"),
            });
        }
        Ok(())
    }
}

impl Clone for InMemoryCacheBackend {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            fault_config: self.fault_config.clone(),
            sets: self.sets.clone(),
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_fault("get", |c| &mut c.force_get_fail)?;
        Ok(self.get_raw(key))
    }

    async fn multi_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        self.check_fault("multi_get", |c| &mut c.force_get_fail)?;
        Ok(keys.iter().map(|key| self.get_raw(key)).collect())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        assert!(!key.is_empty(), "cache key must not be empty");
        self.check_fault("set", |c| &mut c.force_set_fail)?;
        self.set_raw(key, value, ttl);
        self.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<()> {
        self.check_fault("del", |c| &mut c.force_del_fail)?;
        let mut entries = self.lock_entries();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = InMemoryCacheBackend::new();
        cache
            .set("sl:shard:a", "v".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("sl:shard:a").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get("sl:shard:a").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_multi_get_alignment() {
        let cache = InMemoryCacheBackend::new();
        cache.set_raw("b", "2", Duration::from_secs(60));
        let keys = vec!["a".to_string(), "b".to_string()];
        let values = cache.multi_get(&keys).await.unwrap();
        assert_eq!(values, vec![None, Some("2".to_string())]);
    }

    #[tokio::test]
    async fn test_forced_faults_are_one_shot() {
        let cache = InMemoryCacheBackend::with_faults(
            CacheFaultConfig::none()
                .with_force_get_fail()
                .with_force_del_fail(),
        );
        assert!(cache.get("a").await.is_err());
        assert!(cache.get("a").await.is_ok());
        assert!(cache.del(&["a".to_string()]).await.is_err());
        assert!(cache.del(&["a".to_string()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_outage() {
        let cache = InMemoryCacheBackend::new();
        cache.fault_config().unavailable = true;
        assert!(cache
            .set("a", "1".to_string(), Duration::from_secs(1))
            .await
            .is_err());
        cache.fault_config().unavailable = false;
        assert!(cache
            .set("a", "1".to_string(), Duration::from_secs(1))
            .await
            .is_ok());
        assert_eq!(cache.set_count(), 1);
    }

    #[tokio::test]
    async fn test_clone_shares_entries() {
        let cache = InMemoryCacheBackend::new();
        let other = cache.clone();
        cache.set_raw("k", "v", Duration::from_secs(60));
        assert!(other.contains_key("k"));
    }
}
