//! Identifier hashing for first-assignment placement.
//!
//! Placement must agree across processes and releases, so the digest is a
//! fixed, seedless xxh3 over the raw identifier bytes.

use xxhash_rust::xxh3::xxh3_128;

/// Hashes an identifier to an unsigned 128-bit integer.
#[must_use]
pub fn big_int_hash(identifier: &str) -> u128 {
    xxh3_128(identifier.as_bytes())
}

/// Index of the shard an identifier lands on among `shard_count` shards.
///
/// # Panics
///
/// Panics if `shard_count` is zero.
#[must_use]
pub fn allocation_index(identifier: &str, shard_count: usize) -> usize {
    assert!(shard_count > 0, "shard_count must be positive");
    let index = big_int_hash(identifier) % shard_count as u128;
    // Less than shard_count, so it fits.
    usize::try_from(index).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(big_int_hash("0xabc"), big_int_hash("0xabc"));
        assert_ne!(big_int_hash("0xabc"), big_int_hash("0xabd"));
        assert_eq!(big_int_hash("0xabc"), xxh3_128(b"0xabc"));
    }

    #[test]
    fn test_index_in_range() {
        for count in 1..=17 {
            for n in 0..200 {
                let id = format!("0x{n:040x}");
                assert!(allocation_index(&id, count) < count);
            }
        }
        assert_eq!(allocation_index("anything", 1), 0);
    }

    #[test]
    fn test_spread() {
        let mut buckets = [0u32; 4];
        for n in 0..4000 {
            buckets[allocation_index(&format!("owner-{n}"), 4)] += 1;
        }
        assert!(buckets.iter().all(|&b| b > 800), "uneven spread: {buckets:?}");
    }

    #[test]
    #[should_panic(expected = "shard_count must be positive")]
    fn test_zero_shards_panics() {
        let _ = allocation_index("0xabc", 0);
    }
}
