use std::collections::HashMap;
use std::time::Duration;

use protocol::types::Hash;

#[derive(Clone, Copy, Debug)]
pub struct CommittedEntry {
    pub height:       u64,
    pub committed_at: u64,
}

/// Transactions seen in committed blocks, retained for duplicate detection
/// until the retention window passes.
pub struct CommittedPool {
    map: HashMap<Hash, CommittedEntry>,
}

impl CommittedPool {
    pub fn new() -> Self {
        CommittedPool {
            map: HashMap::new(),
        }
    }

    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.map.contains_key(tx_hash)
    }

    pub fn get(&self, tx_hash: &Hash) -> Option<CommittedEntry> {
        self.map.get(tx_hash).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn insert_batch(&mut self, tx_hashes: &[Hash], height: u64, now: u64) {
        for tx_hash in tx_hashes {
            self.map.insert(*tx_hash, CommittedEntry {
                height,
                committed_at: now,
            });
        }
    }

    pub fn expire(&mut self, now: u64, retention: Duration) {
        let retention = retention.as_nanos() as u64;
        self.map
            .retain(|_, entry| entry.committed_at + retention >= now);
    }
}
