//! Reusable test scenarios for Shardline simulation.

/// Standard shard layouts.
pub mod shards {
    /// Entity type used by the balance ledger.
    pub const BALANCE_ENTITY: &str = "userBalances";

    /// A single balance shard.
    pub const ONE: &[&str] = &["bal_shard_1"];

    /// Three balance shards, deliberately not in name order.
    pub const THREE: &[&str] = &["bal_shard_3", "bal_shard_1", "bal_shard_2"];
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];
}

/// Workload shapes.
pub mod workloads {
    /// Owners touched by a random ledger workload.
    pub const OWNERS: &[&str] = &["0xa1", "0xB2", "0xc3", "0xD4", "0xe5", "0xf6"];

    /// Asset every workload trades.
    pub const ASSET: &str = "0xerc20";

    /// Operations per seeded workload.
    pub const STEPS: usize = 200;
}
