use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use protocol::types::{Hash, SignedTransaction};
use protocol::ProtocolResult;

use crate::PoolError;

struct PendingEntry {
    stx:         SignedTransaction,
    inserted_at: u64,
    size_bytes:  usize,
}

/// Not-yet-committed transactions in first-seen order.
pub struct PendingPool {
    pool_size: usize,
    map:       HashMap<Hash, PendingEntry>,
    queue:     VecDeque<Hash>,
}

impl PendingPool {
    pub fn new(pool_size: usize) -> Self {
        PendingPool {
            pool_size,
            map: HashMap::with_capacity(pool_size),
            queue: VecDeque::with_capacity(pool_size),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.map.contains_key(tx_hash)
    }

    pub fn check_reach_limit(&self) -> ProtocolResult<()> {
        if self.map.len() >= self.pool_size {
            return Err(PoolError::ReachLimit {
                pool_size: self.pool_size,
            }
            .into());
        }
        Ok(())
    }

    pub fn insert(&mut self, stx: SignedTransaction, now: u64) -> ProtocolResult<()> {
        let tx_hash = stx.tx_hash;
        if self.map.contains_key(&tx_hash) {
            return Err(PoolError::Dup { tx_hash }.into());
        }

        // codec length approximates the wire size for the batch byte cap
        let size_bytes = stx.raw.input_args.iter().map(|arg| arg.len()).sum::<usize>()
            + stx.raw.contract.len()
            + stx.raw.method.len()
            + stx.raw.signer.len()
            + stx.signature.len()
            + 64;

        self.map.insert(tx_hash, PendingEntry {
            stx,
            inserted_at: now,
            size_bytes,
        });
        self.queue.push_back(tx_hash);
        Ok(())
    }

    /// Up to `max_count` transactions in first-seen order, bounded by
    /// `max_total_bytes`, skipping any whose client protocol version exceeds
    /// the block's ceiling. Skipped transactions stay pending.
    pub fn select(
        &self,
        max_count: usize,
        max_total_bytes: usize,
        version_ceiling: u32,
    ) -> Vec<SignedTransaction> {
        let mut selected = Vec::new();
        let mut total_bytes = 0usize;

        for tx_hash in self.queue.iter() {
            if selected.len() >= max_count {
                break;
            }

            let entry = match self.map.get(tx_hash) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.stx.raw.protocol_version > version_ceiling {
                continue;
            }
            if total_bytes + entry.size_bytes > max_total_bytes && !selected.is_empty() {
                break;
            }

            total_bytes += entry.size_bytes;
            selected.push(entry.stx.clone());
        }

        selected
    }

    pub fn remove_batch(&mut self, tx_hashes: &[Hash]) {
        for tx_hash in tx_hashes {
            self.map.remove(tx_hash);
        }
        let map = &self.map;
        self.queue.retain(|tx_hash| map.contains_key(tx_hash));
    }

    pub fn expire(&mut self, now: u64, window: Duration) {
        let window = window.as_nanos() as u64;
        let expired = self
            .map
            .iter()
            .filter(|(_, entry)| entry.inserted_at + window < now)
            .map(|(tx_hash, _)| *tx_hash)
            .collect::<Vec<_>>();

        if !expired.is_empty() {
            self.remove_batch(&expired);
        }
    }
}
