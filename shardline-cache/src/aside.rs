//! Cache-aside reads.
//!
//! A [`CacheAside`] implementor describes one read: which identifiers it
//! covers, the cache key of each, how long entries live, and how to load
//! identifiers the cache does not have. The provided [`CacheAside::fetch`]
//! and [`CacheAside::clear`] do the rest.
//!
//! Identifiers the source does not return are absent from the result and
//! are never cached, so a later write is visible without an invalidation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};

/// Builds a namespaced cache key: `prefix:class:part:part...`.
///
/// Each part has `\` and `:` escaped with a backslash, so distinct part
/// lists never produce the same key.
#[must_use]
pub fn cache_key(prefix: &str, class: &str, parts: &[&str]) -> String {
    let mut key = String::with_capacity(
        prefix.len() + class.len() + parts.iter().map(|p| p.len() + 1).sum::<usize>() + 1,
    );
    key.push_str(prefix);
    key.push(':');
    key.push_str(class);
    for part in parts {
        key.push(':');
        for c in part.chars() {
            if matches!(c, '\\' | ':') {
                key.push('\\');
            }
            key.push(c);
        }
    }
    key
}

/// A cache-aside read over a set of identifiers.
#[async_trait]
pub trait CacheAside: Send + Sync {
    /// Identifier of one cached value.
    type Id: Clone + Eq + Hash + Send + Sync + 'static;
    /// Cached value; stored as JSON.
    type Value: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Error of the source of truth.
    type Error: From<CacheError> + Send;
    /// Cache backend.
    type Backend: CacheBackend + 'static;

    /// The identifiers this read covers, each with its cache key.
    fn cache_key_map(&self) -> Vec<(Self::Id, String)>;

    /// Time-to-live of populated entries.
    fn expiry(&self) -> Duration;

    /// The cache backend.
    fn backend(&self) -> Arc<Self::Backend>;

    /// Loads identifiers the cache missed from the source of truth.
    ///
    /// Identifiers that do not exist are simply left out of the result.
    ///
    /// # Errors
    ///
    /// Returns the source error; nothing is cached in that case.
    async fn fetch_from_source(
        &self,
        missing: &[Self::Id],
    ) -> Result<HashMap<Self::Id, Self::Value>, Self::Error>;

    /// Reads every identifier, from cache where possible.
    ///
    /// Cache failures and undecodable entries degrade to misses. Values
    /// loaded from the source are written back by a detached task.
    ///
    /// # Errors
    ///
    /// Returns the source error if the source is consulted and fails.
    async fn fetch(&self) -> Result<HashMap<Self::Id, Self::Value>, Self::Error> {
        let key_map = self.cache_key_map();
        if key_map.is_empty() {
            return Ok(HashMap::new());
        }

        let backend = self.backend();
        let keys: Vec<String> = key_map.iter().map(|(_, key)| key.clone()).collect();
        let cached = match backend.multi_get(&keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!(error = %err, keys = keys.len(), "Cache read failed, reading source");
                Vec::new()
            }
        };

        let mut found = HashMap::with_capacity(key_map.len());
        let mut missing = Vec::new();
        let mut missing_keys = HashMap::new();
        let cached = cached.into_iter().chain(std::iter::repeat(None));
        for ((id, key), raw) in key_map.into_iter().zip(cached) {
            match raw.map(|raw| serde_json::from_str::<Self::Value>(&raw)) {
                Some(Ok(value)) => {
                    found.insert(id, value);
                }
                Some(Err(err)) => {
                    warn!(key = %key, error = %err, "Undecodable cache entry, treating as miss");
                    missing_keys.insert(id.clone(), key);
                    missing.push(id);
                }
                None => {
                    missing_keys.insert(id.clone(), key);
                    missing.push(id);
                }
            }
        }

        if missing.is_empty() {
            debug!(hits = found.len(), "Cache hit");
            return Ok(found);
        }
        debug!(hits = found.len(), misses = missing.len(), "Cache miss, reading source");

        let loaded = self.fetch_from_source(&missing).await?;

        let mut entries = Vec::with_capacity(loaded.len());
        for (id, value) in loaded {
            if let Some(key) = missing_keys.remove(&id) {
                match serde_json::to_string(&value) {
                    Ok(encoded) => entries.push((key, encoded)),
                    Err(err) => warn!(key = %key, error = %err, "Cannot encode value for cache"),
                }
            }
            found.insert(id, value);
        }

        if !entries.is_empty() {
            populate(backend, entries, self.expiry());
        }
        Ok(found)
    }

    /// Deletes every cache entry this read covers.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails.
    async fn clear(&self) -> CacheResult<()> {
        let keys: Vec<String> = self
            .cache_key_map()
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        self.backend().del(&keys).await
    }
}

/// Writes entries in a detached task; failures are logged, never surfaced.
fn populate<B: CacheBackend + 'static>(
    backend: Arc<B>,
    entries: Vec<(String, String)>,
    ttl: Duration,
) {
    tokio::spawn(async move {
        for (key, value) in entries {
            if let Err(err) = backend.set(&key, value, ttl).await {
                warn!(key = %key, error = %err, "Cache population failed");
            }
        }
    });
}
