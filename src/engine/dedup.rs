//! Dedup ledger for alert emission.
//!
//! Two membership sets (transaction hashes and pool ids) backed by moka caches.
//! Entries live for the session; the caches are capacity-capped so a long-running
//! process cannot grow them without limit.

use moka::future::Cache;

/// Membership sets preventing duplicate alerts for the same trade or pool.
#[derive(Clone)]
pub struct DedupLedger {
    seen_tx_hashes: Cache<String, ()>,
    seen_pools: Cache<String, ()>,
}

impl DedupLedger {
    /// Create a ledger with the given capacities.
    pub fn new(max_tx_hashes: u64, max_pools: u64) -> Self {
        Self {
            seen_tx_hashes: Cache::builder().max_capacity(max_tx_hashes).build(),
            seen_pools: Cache::builder().max_capacity(max_pools).build(),
        }
    }

    /// Record a transaction hash. Returns `true` only the first time it is seen.
    pub async fn first_sighting_of_tx(&self, tx_hash: &str) -> bool {
        self.seen_tx_hashes
            .entry(tx_hash.to_string())
            .or_insert(())
            .await
            .is_fresh()
    }

    /// Record a pool id. Returns `true` only the first time it is seen.
    pub async fn first_sighting_of_pool(&self, pool_id: &str) -> bool {
        self.seen_pools
            .entry(pool_id.to_string())
            .or_insert(())
            .await
            .is_fresh()
    }

    pub fn has_seen_tx(&self, tx_hash: &str) -> bool {
        self.seen_tx_hashes.contains_key(tx_hash)
    }

    pub fn has_seen_pool(&self, pool_id: &str) -> bool {
        self.seen_pools.contains_key(pool_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tx_seen_once() {
        let ledger = DedupLedger::new(100, 100);
        assert!(ledger.first_sighting_of_tx("0xhash").await);
        assert!(!ledger.first_sighting_of_tx("0xhash").await);
        assert!(ledger.has_seen_tx("0xhash"));
        assert!(!ledger.has_seen_tx("0xother"));
    }

    #[tokio::test]
    async fn test_pools_and_txs_are_separate_sets() {
        let ledger = DedupLedger::new(100, 100);
        assert!(ledger.first_sighting_of_tx("same-key").await);
        assert!(ledger.first_sighting_of_pool("same-key").await);
        assert!(!ledger.first_sighting_of_pool("same-key").await);
    }
}
