//! In-memory simulated keyed-item store.
//!
//! Implements [`ItemStore`] with the same condition, update and pagination
//! semantics as the production backend, plus deterministic fault injection
//! for the failure modes the executor has to absorb: tables that briefly
//! report not-found, throttled batch calls, and batch elements left
//! unprocessed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use shardline_core::limits::{BATCH_GET_KEYS_MAX, BATCH_WRITE_ITEMS_MAX};

use crate::error::{StoreError, StoreResult};
use crate::expr::Condition;
use crate::item::{AttributeValue, Item};
use crate::request::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, DeleteItemRequest,
    GetItemRequest, Page, PutItemRequest, QueryRequest, ScanRequest, UpdateItemRequest,
    WriteRequest,
};
use crate::schema::{KeySchema, TableSchema};
use crate::storage::ItemStore;

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Configuration for fault injection in the simulated item store.
///
/// Counters (`*_calls`, `*_failures`) are consumed one per affected call;
/// rates are sampled from the store's seeded generator.
#[derive(Debug, Clone, Default)]
pub struct ItemStoreFaultConfig {
    /// Next N single-item, query or scan calls fail with `ResourceNotFound`.
    pub missing_table_failures: u32,
    /// Probability of a single-item, query or scan call failing with
    /// `ResourceNotFound`. Range: 0.0 - 1.0.
    pub missing_table_rate: f64,
    /// Next N batch calls fail with `ResourceNotFound`.
    pub batch_missing_table_calls: u32,
    /// Next N batch calls fail with `ThroughputExceeded`.
    pub batch_throttle_calls: u32,
    /// Next N batch calls succeed but leave every element unprocessed.
    pub batch_unprocessed_calls: u32,
    /// Probability of each batch element being left unprocessed.
    /// Range: 0.0 - 1.0.
    pub unprocessed_rate: f64,
    /// If true, the next call of any kind fails with a transport error
    /// (one-shot).
    pub force_transport_fail: bool,
}

impl ItemStoreFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a fault config that simulates a busy backend: occasional
    /// table-missing races and a steady trickle of unprocessed batch work.
    #[must_use]
    pub fn flaky() -> Self {
        Self {
            missing_table_rate: 0.05,
            unprocessed_rate: 0.2,
            ..Default::default()
        }
    }

    /// Fails the next `count` single-item calls with `ResourceNotFound`.
    #[must_use]
    pub const fn with_missing_table_failures(mut self, count: u32) -> Self {
        self.missing_table_failures = count;
        self
    }

    /// Sets the single-item `ResourceNotFound` rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_missing_table_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.missing_table_rate = rate;
        self
    }

    /// Fails the next `count` batch calls with `ResourceNotFound`.
    #[must_use]
    pub const fn with_batch_missing_table_calls(mut self, count: u32) -> Self {
        self.batch_missing_table_calls = count;
        self
    }

    /// Fails the next `count` batch calls with `ThroughputExceeded`.
    #[must_use]
    pub const fn with_batch_throttle_calls(mut self, count: u32) -> Self {
        self.batch_throttle_calls = count;
        self
    }

    /// Leaves every element of the next `count` batch calls unprocessed.
    #[must_use]
    pub const fn with_batch_unprocessed_calls(mut self, count: u32) -> Self {
        self.batch_unprocessed_calls = count;
        self
    }

    /// Sets the per-element unprocessed rate for batch calls.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_unprocessed_rate(mut self, rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
        self.unprocessed_rate = rate;
        self
    }

    /// Fails the next call with a transport error.
    #[must_use]
    pub const fn with_force_transport_fail(mut self) -> Self {
        self.force_transport_fail = true;
        self
    }
}

// -----------------------------------------------------------------------------
// Tables
// -----------------------------------------------------------------------------

type KeyTuple = Vec<AttributeValue>;

#[derive(Debug)]
struct SimTable {
    schema: TableSchema,
    /// Items ordered by primary key, which is also the pagination order.
    items: BTreeMap<KeyTuple, Item>,
}

impl SimTable {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            items: BTreeMap::new(),
        }
    }

    /// Primary key tuple of an item or key. Extra attributes are ignored.
    fn key_tuple(&self, item: &Item) -> StoreResult<KeyTuple> {
        self.schema
            .key
            .attributes()
            .map(|attr| {
                item.get(attr).cloned().ok_or_else(|| {
                    StoreError::validation(format!(
                        "missing key attribute '{attr}' for table '{}'",
                        self.schema.name
                    ))
                })
            })
            .collect()
    }

    /// Primary key tuple of a key that must carry exactly the key attributes.
    fn exact_key_tuple(&self, key: &Item) -> StoreResult<KeyTuple> {
        let expected = self.schema.key.attributes().count();
        if key.len() != expected {
            return Err(StoreError::validation(format!(
                "key for table '{}' must have exactly {expected} attribute(s)",
                self.schema.name
            )));
        }
        self.key_tuple(key)
    }

    fn is_key_attribute(&self, attribute: &str) -> bool {
        self.schema.key.attributes().any(|attr| attr == attribute)
    }
}

// -----------------------------------------------------------------------------
// SimulatedItemStore
// -----------------------------------------------------------------------------

/// In-memory simulated keyed-item store for deterministic testing.
///
/// # Determinism
///
/// All probabilistic fault injection uses a hash of the seed and an
/// operation counter, so a given seed replays the same faults in the same
/// order.
///
/// # Cloning
///
/// Clones share the same tables, fault configuration and counters (via
/// `Arc`), allowing a test to hand one handle to the code under test and
/// keep another for inspection.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct SimulatedItemStore {
    /// Tables by name.
    tables: Arc<Mutex<HashMap<String, SimTable>>>,
    /// Fault injection configuration.
    fault_config: Arc<Mutex<ItemStoreFaultConfig>>,
    /// RNG seed for deterministic fault injection.
    seed: u64,
    /// Operation counter for deterministic RNG.
    counter: Arc<AtomicU64>,
    /// Items mutated by successful writes.
    writes: Arc<AtomicU64>,
    /// Backend calls of any kind, failed ones included.
    calls: Arc<AtomicU64>,
    /// Batch calls, failed ones included.
    batch_calls: Arc<AtomicU64>,
}

impl SimulatedItemStore {
    /// Creates a new simulated store with the given seed and no tables.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, ItemStoreFaultConfig::default())
    }

    /// Creates a new simulated store with fault injection enabled.
    #[must_use]
    pub fn with_faults(seed: u64, config: ItemStoreFaultConfig) -> Self {
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(AtomicU64::new(0)),
            calls: Arc::new(AtomicU64::new(0)),
            batch_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a table. Creating an existing table replaces its layout but
    /// keeps its items.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn create_table(&self, schema: TableSchema) {
        let mut tables = self.lock_tables();
        match tables.get_mut(&schema.name) {
            Some(table) => table.schema = schema,
            None => {
                tables.insert(schema.name.clone(), SimTable::new(schema));
            }
        }
    }

    /// Drops a table and all of its items.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn drop_table(&self, name: &str) {
        self.lock_tables().remove(name);
    }

    /// Returns true if the table exists.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.lock_tables().contains_key(name)
    }

    /// Returns the primary key layout of a table.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn key_schema(&self, name: &str) -> Option<KeySchema> {
        self.lock_tables().get(name).map(|t| t.schema.key.clone())
    }

    /// Returns a reference to the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> MutexGuard<'_, ItemStoreFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Reads an item directly, bypassing fault injection.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn get_raw_item(&self, table: &str, key: &Item) -> Option<Item> {
        let tables = self.lock_tables();
        let table = tables.get(table)?;
        let tuple = table.key_tuple(key).ok()?;
        table.items.get(&tuple).cloned()
    }

    /// Writes an item directly, bypassing fault injection and counters.
    ///
    /// Returns false if the table does not exist or the item lacks its key.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn put_raw_item(&self, table: &str, item: Item) -> bool {
        let mut tables = self.lock_tables();
        let Some(table) = tables.get_mut(table) else {
            return false;
        };
        let Ok(tuple) = table.key_tuple(&item) else {
            return false;
        };
        table.items.insert(tuple, item);
        true
    }

    /// Returns the number of items in a table (0 if it does not exist).
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn item_count(&self, table: &str) -> usize {
        self.lock_tables().get(table).map_or(0, |t| t.items.len())
    }

    /// Items mutated by successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Backend calls so far, failed ones included.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Batch calls so far, failed ones included.
    #[must_use]
    pub fn batch_call_count(&self) -> u64 {
        self.batch_calls.load(Ordering::Relaxed)
    }

    fn lock_tables(&self) -> MutexGuard<'_, HashMap<String, SimTable>> {
        self.tables.lock().expect("tables lock poisoned")
    }

    fn table<'a>(tables: &'a HashMap<String, SimTable>, name: &str) -> StoreResult<&'a SimTable> {
        tables.get(name).ok_or_else(|| StoreError::ResourceNotFound {
            table: name.to_string(),
        })
    }

    fn table_mut<'a>(
        tables: &'a mut HashMap<String, SimTable>,
        name: &str,
    ) -> StoreResult<&'a mut SimTable> {
        tables
            .get_mut(name)
            .ok_or_else(|| StoreError::ResourceNotFound {
                table: name.to_string(),
            })
    }

    /// Deterministic RNG based on seed and counter.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x5851_f42d_4c95_7f2d);
        // Safety: precision loss is acceptable for probability calculation.
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    /// Fault gate for single-item, query and scan calls.
    fn check_call_faults(&self, operation: &'static str, table: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_transport_fail {
            config.force_transport_fail = false;
            drop(config);
            return Err(StoreError::Transport {
                operation,
                message: "simulated transport failure (forced)".to_string(),
            });
        }
        if config.missing_table_failures > 0 {
            config.missing_table_failures -= 1;
            drop(config);
            return Err(StoreError::ResourceNotFound {
                table: table.to_string(),
            });
        }
        let missing_table_rate = config.missing_table_rate;
        drop(config);

        if self.should_inject_fault(missing_table_rate) {
            return Err(StoreError::ResourceNotFound {
                table: table.to_string(),
            });
        }
        Ok(())
    }

    /// Fault gate for batch calls. Returns `(all_unprocessed, element_rate)`.
    fn check_batch_faults(&self, operation: &'static str, table: &str) -> StoreResult<(bool, f64)> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.batch_calls.fetch_add(1, Ordering::Relaxed);

        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_transport_fail {
            config.force_transport_fail = false;
            drop(config);
            return Err(StoreError::Transport {
                operation,
                message: "simulated transport failure (forced)".to_string(),
            });
        }
        if config.batch_missing_table_calls > 0 {
            config.batch_missing_table_calls -= 1;
            drop(config);
            return Err(StoreError::ResourceNotFound {
                table: table.to_string(),
            });
        }
        if config.batch_throttle_calls > 0 {
            config.batch_throttle_calls -= 1;
            drop(config);
            return Err(StoreError::ThroughputExceeded {
                table: table.to_string(),
            });
        }
        let all_unprocessed = if config.batch_unprocessed_calls > 0 {
            config.batch_unprocessed_calls -= 1;
            true
        } else {
            false
        };
        Ok((all_unprocessed, config.unprocessed_rate))
    }

    fn check_condition(
        table: &str,
        condition: Option<&Condition>,
        stored: Option<&Item>,
    ) -> StoreResult<()> {
        match condition {
            Some(condition) if !condition.evaluate(stored) => {
                Err(StoreError::ConditionalCheckFailed {
                    table: table.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn paginate<'a>(
        table: &SimTable,
        candidates: impl Iterator<Item = &'a Item>,
        filter: Option<&Condition>,
        limit: Option<u32>,
    ) -> StoreResult<Page> {
        let limit = match limit {
            Some(0) => return Err(StoreError::validation("limit must be positive")),
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
            None => usize::MAX,
        };

        let mut candidates = candidates.peekable();
        let mut page = Page::default();
        let mut evaluated = 0usize;
        while let Some(item) = candidates.next() {
            evaluated += 1;
            if filter.map_or(true, |f| f.evaluate(Some(item))) {
                page.items.push(item.clone());
            }
            if evaluated >= limit {
                if candidates.peek().is_some() {
                    page.last_evaluated_key = Some(table.schema.key.extract_key(item)?);
                }
                break;
            }
        }
        Ok(page)
    }
}

impl Clone for SimulatedItemStore {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
            fault_config: self.fault_config.clone(),
            seed: self.seed,
            counter: self.counter.clone(),
            writes: self.writes.clone(),
            calls: self.calls.clone(),
            batch_calls: self.batch_calls.clone(),
        }
    }
}

// Allow significant_drop_tightening since this is test-only simulation code.
#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl ItemStore for SimulatedItemStore {
    async fn get_item(&self, request: &GetItemRequest) -> StoreResult<Option<Item>> {
        self.check_call_faults("get_item", &request.table)?;

        let tables = self.lock_tables();
        let table = Self::table(&tables, &request.table)?;
        let tuple = table.exact_key_tuple(&request.key)?;
        Ok(table.items.get(&tuple).cloned())
    }

    async fn put_item(&self, request: &PutItemRequest) -> StoreResult<()> {
        self.check_call_faults("put_item", &request.table)?;

        let mut tables = self.lock_tables();
        let table = Self::table_mut(&mut tables, &request.table)?;
        let tuple = table.key_tuple(&request.item)?;
        Self::check_condition(
            &request.table,
            request.condition.as_ref(),
            table.items.get(&tuple),
        )?;
        table.items.insert(tuple, request.item.clone());
        drop(tables);

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn update_item(&self, request: &UpdateItemRequest) -> StoreResult<Item> {
        self.check_call_faults("update_item", &request.table)?;

        let mut tables = self.lock_tables();
        let table = Self::table_mut(&mut tables, &request.table)?;
        let tuple = table.exact_key_tuple(&request.key)?;
        if let Some(action) = request
            .actions
            .iter()
            .find(|action| table.is_key_attribute(action.attribute()))
        {
            return Err(StoreError::validation(format!(
                "cannot update key attribute '{}'",
                action.attribute()
            )));
        }

        let stored = table.items.get(&tuple);
        Self::check_condition(&request.table, request.condition.as_ref(), stored)?;

        let mut next = stored.cloned().unwrap_or_else(|| request.key.clone());
        for action in &request.actions {
            action.apply(&mut next)?;
        }
        table.items.insert(tuple, next.clone());
        drop(tables);

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(next)
    }

    async fn delete_item(&self, request: &DeleteItemRequest) -> StoreResult<()> {
        self.check_call_faults("delete_item", &request.table)?;

        let mut tables = self.lock_tables();
        let table = Self::table_mut(&mut tables, &request.table)?;
        let tuple = table.exact_key_tuple(&request.key)?;
        Self::check_condition(
            &request.table,
            request.condition.as_ref(),
            table.items.get(&tuple),
        )?;
        let removed = table.items.remove(&tuple).is_some();
        drop(tables);

        if removed {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> StoreResult<Page> {
        self.check_call_faults("query", &request.table)?;

        let tables = self.lock_tables();
        let table = Self::table(&tables, &request.table)?;
        let key_schema = match &request.index {
            None => &table.schema.key,
            Some(name) => {
                &table
                    .schema
                    .index(name)
                    .ok_or_else(|| {
                        StoreError::validation(format!(
                            "unknown index '{name}' on table '{}'",
                            request.table
                        ))
                    })?
                    .key
            }
        };

        if !request
            .key_equals
            .iter()
            .any(|(attr, _)| *attr == key_schema.partition_key)
        {
            return Err(StoreError::validation(format!(
                "query must constrain partition key '{}'",
                key_schema.partition_key
            )));
        }
        if let Some((attr, _)) = request
            .key_equals
            .iter()
            .find(|(attr, _)| !key_schema.attributes().any(|a| a == attr.as_str()))
        {
            return Err(StoreError::validation(format!(
                "'{attr}' is not a key attribute"
            )));
        }

        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|key| table.key_tuple(key))
            .transpose()?;
        let candidates = table
            .items
            .iter()
            .filter(|(tuple, _)| start.as_ref().map_or(true, |start| *tuple > start))
            .map(|(_, item)| item)
            .filter(|item| {
                key_schema.is_keyed(item)
                    && request
                        .key_equals
                        .iter()
                        .all(|(attr, value)| item.get(attr) == Some(value))
            });
        Self::paginate(table, candidates, request.filter.as_ref(), request.limit)
    }

    async fn scan(&self, request: &ScanRequest) -> StoreResult<Page> {
        self.check_call_faults("scan", &request.table)?;

        let tables = self.lock_tables();
        let table = Self::table(&tables, &request.table)?;
        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|key| table.key_tuple(key))
            .transpose()?;
        let candidates = table
            .items
            .iter()
            .filter(|(tuple, _)| start.as_ref().map_or(true, |start| *tuple > start))
            .map(|(_, item)| item);
        Self::paginate(table, candidates, request.filter.as_ref(), request.limit)
    }

    async fn batch_get_item(&self, request: &BatchGetRequest) -> StoreResult<BatchGetOutput> {
        let first_table = request.tables.keys().next().cloned().unwrap_or_default();
        let (all_unprocessed, rate) = self.check_batch_faults("batch_get_item", &first_table)?;

        let key_count = request.key_count();
        if key_count == 0 || key_count > BATCH_GET_KEYS_MAX {
            return Err(StoreError::validation(format!(
                "batch get must carry 1..={BATCH_GET_KEYS_MAX} keys, got {key_count}"
            )));
        }

        let tables = self.lock_tables();
        let mut output = BatchGetOutput::default();
        for (name, keys) in &request.tables {
            let table = Self::table(&tables, name)?;
            for key in keys {
                let tuple = table.exact_key_tuple(key)?;
                if all_unprocessed || self.should_inject_fault(rate) {
                    output
                        .unprocessed
                        .entry(name.clone())
                        .or_default()
                        .push(key.clone());
                    continue;
                }
                if let Some(item) = table.items.get(&tuple) {
                    output
                        .responses
                        .entry(name.clone())
                        .or_default()
                        .push(item.clone());
                }
            }
        }
        Ok(output)
    }

    async fn batch_write_item(&self, request: &BatchWriteRequest) -> StoreResult<BatchWriteOutput> {
        let first_table = request.tables.keys().next().cloned().unwrap_or_default();
        let (all_unprocessed, rate) =
            self.check_batch_faults("batch_write_item", &first_table)?;

        let write_count = request.write_count();
        if write_count == 0 || write_count > BATCH_WRITE_ITEMS_MAX {
            return Err(StoreError::validation(format!(
                "batch write must carry 1..={BATCH_WRITE_ITEMS_MAX} writes, got {write_count}"
            )));
        }

        let mut tables = self.lock_tables();
        // Validate every write before applying any of them.
        for (name, writes) in &request.tables {
            let table = Self::table(&tables, name)?;
            for write in writes {
                match write {
                    WriteRequest::Put(item) => table.key_tuple(item)?,
                    WriteRequest::Delete(key) => table.exact_key_tuple(key)?,
                };
            }
        }

        let mut output = BatchWriteOutput::default();
        let mut applied = 0u64;
        for (name, writes) in &request.tables {
            let table = Self::table_mut(&mut tables, name)?;
            for write in writes {
                if all_unprocessed || self.should_inject_fault(rate) {
                    output
                        .unprocessed
                        .entry(name.clone())
                        .or_default()
                        .push(write.clone());
                    continue;
                }
                match write {
                    WriteRequest::Put(item) => {
                        let tuple = table.key_tuple(item)?;
                        table.items.insert(tuple, item.clone());
                    }
                    WriteRequest::Delete(key) => {
                        let tuple = table.exact_key_tuple(key)?;
                        table.items.remove(&tuple);
                    }
                }
                applied += 1;
            }
        }
        drop(tables);

        self.writes.fetch_add(applied, Ordering::Relaxed);
        Ok(output)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
