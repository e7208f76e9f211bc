//! System limits and default tunables.
//!
//! Following `TigerStyle`: put limits on everything. The batch ceilings are
//! imposed by the keyed-item backend; the rest are defaults that the
//! configuration may override within these bounds.

/// Maximum number of keys in a single batch-get request.
pub const BATCH_GET_KEYS_MAX: usize = 100;

/// Maximum number of put/delete requests in a single batch-write request.
pub const BATCH_WRITE_ITEMS_MAX: usize = 25;

/// Default number of attempts for single-item operations.
pub const RETRY_ATTEMPTS_DEFAULT: u32 = 10;

/// Upper bound on configured attempts for single-item operations.
pub const RETRY_ATTEMPTS_MAX: u32 = 100;

/// Default number of re-issues of an unprocessed batch residue.
pub const BATCH_RETRY_BUDGET_DEFAULT: u32 = 10;

/// Default constant part of the linear backoff, in milliseconds.
pub const RETRY_CONSTANT_DELAY_MS_DEFAULT: u64 = 25;

/// Default per-attempt part of the linear backoff, in milliseconds.
pub const RETRY_VARIABLE_DELAY_MS_DEFAULT: u64 = 25;

/// Default number of owner keys per balance batch-get chunk.
pub const LEDGER_CHUNK_SIZE_DEFAULT: usize = 90;

/// Default number of balance chunks fetched concurrently.
pub const LEDGER_CONCURRENCY_DEFAULT: usize = 3;

/// Maximum number of balance chunks fetched concurrently.
pub const LEDGER_CONCURRENCY_MAX: usize = 32;

/// Default TTL for shard registry cache entries, in seconds (1 day).
pub const REGISTRY_CACHE_TTL_SECS_DEFAULT: u64 = 86_400;

/// Default TTL for directory cache entries, in seconds (1 day).
pub const DIRECTORY_CACHE_TTL_SECS_DEFAULT: u64 = 86_400;

/// Default TTL for balance cache entries, in seconds.
pub const BALANCE_CACHE_TTL_SECS_DEFAULT: u64 = 300;

/// Minimum length of a shard (table) name.
pub const SHARD_NAME_LEN_MIN: usize = 3;

/// Maximum length of a shard (table) name.
pub const SHARD_NAME_LEN_MAX: usize = 255;

/// Maximum length of an entity type label.
pub const ENTITY_TYPE_LEN_MAX: usize = 255;

/// Maximum number of pages followed by a paginated query or scan.
pub const PAGES_MAX: u32 = 10_000;
