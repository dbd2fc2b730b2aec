use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use common_sync::BlockTracker;
use protocol::traits::{Committer, Context, StateStorage};
use protocol::types::{BlockPair, ContractStateDiff};
use protocol::ProtocolResult;

use crate::sdk::StateReader;
use crate::ExecutorError;

#[derive(Clone, PartialEq, Eq, Hash)]
struct StateKey {
    contract: String,
    key:      Bytes,
}

/// (contract, key) → value, versioned per block height.
///
/// Every version within the retention window is kept in full; on commit,
/// versions that fell out of the window are retired, always preserving the
/// newest version at or below the cutoff so reads at the window edge still
/// resolve.
pub struct VersionedStateStorage {
    retention:        u64,
    grace_block_dist: u64,
    grace_timeout:    Duration,

    state:          RwLock<HashMap<StateKey, BTreeMap<u64, Bytes>>>,
    last_committed: AtomicU64,
    tracker:        BlockTracker,
}

impl VersionedStateStorage {
    pub fn new(retention: u64, grace_block_dist: u64, grace_timeout: Duration) -> Self {
        VersionedStateStorage {
            retention,
            grace_block_dist,
            grace_timeout,
            state: RwLock::new(HashMap::new()),
            last_committed: AtomicU64::new(0),
            tracker: BlockTracker::new(0),
        }
    }

    fn read_at(&self, contract: &str, key: &Bytes, height: u64) -> Option<Bytes> {
        let state = self.state.read();
        let versions = state.get(&StateKey {
            contract: contract.to_owned(),
            key:      key.clone(),
        })?;

        versions
            .range(..=height)
            .next_back()
            .map(|(_, value)| value.clone())
    }

    fn apply_diffs(&self, height: u64, diffs: Vec<ContractStateDiff>) {
        let cutoff = height.checked_sub(self.retention);
        let mut state = self.state.write();

        for diff in diffs {
            for record in diff.records {
                let versions = state
                    .entry(StateKey {
                        contract: diff.contract.clone(),
                        key:      record.key,
                    })
                    .or_insert_with(BTreeMap::new);
                versions.insert(height, record.value);

                if let Some(cutoff) = cutoff {
                    retire_versions(versions, cutoff);
                }
            }
        }
    }

    async fn wait_within_grace(&self, ctx: Context, height: u64) -> ProtocolResult<()> {
        let committed = self.last_committed.load(Ordering::SeqCst);
        if height <= committed {
            return Ok(());
        }

        if height - committed > self.grace_block_dist {
            return Err(ExecutorError::BeyondGraceDistance {
                height,
                committed,
                distance: self.grace_block_dist,
            }
            .into());
        }

        let _ = ctx;
        self.tracker
            .wait_for_height_within(height, self.grace_timeout)
            .await
            .map_err(|_| ExecutorError::QueryGraceTimeout { height }.into())
    }
}

/// Drop versions strictly below `cutoff`, keeping the newest one at or below
/// it.
fn retire_versions(versions: &mut BTreeMap<u64, Bytes>, cutoff: u64) {
    let keep = versions
        .range(..=cutoff)
        .next_back()
        .map(|(height, _)| *height);

    if let Some(keep) = keep {
        let retired = versions
            .range(..keep)
            .map(|(height, _)| *height)
            .collect::<Vec<_>>();
        for height in retired {
            versions.remove(&height);
        }
    }
}

#[async_trait]
impl StateStorage for VersionedStateStorage {
    async fn commit_state_diffs(
        &self,
        _ctx: Context,
        height: u64,
        diffs: Vec<ContractStateDiff>,
    ) -> ProtocolResult<u64> {
        let expected = self.last_committed.load(Ordering::SeqCst) + 1;
        if height != expected {
            return Err(ExecutorError::OutOfOrderCommit {
                expected,
                got: height,
            }
            .into());
        }

        self.apply_diffs(height, diffs);
        self.last_committed.store(height, Ordering::SeqCst);
        self.tracker.advance(height);

        Ok(height + 1)
    }

    async fn read_key(
        &self,
        ctx: Context,
        contract: &str,
        key: Bytes,
        height: u64,
    ) -> ProtocolResult<Option<Bytes>> {
        self.wait_within_grace(ctx, height).await?;
        Ok(self.read_at(contract, &key, height))
    }

    async fn read_key_latest(
        &self,
        _ctx: Context,
        contract: &str,
        key: Bytes,
    ) -> ProtocolResult<(Option<Bytes>, u64)> {
        let height = self.last_committed.load(Ordering::SeqCst);
        Ok((self.read_at(contract, &key, height), height))
    }

    async fn last_committed_height(&self, _ctx: Context) -> ProtocolResult<u64> {
        Ok(self.last_committed.load(Ordering::SeqCst))
    }
}

impl StateReader for VersionedStateStorage {
    fn read(&self, contract: &str, key: &Bytes, height: u64) -> Option<Bytes> {
        self.read_at(contract, key, height)
    }

    fn last_height(&self) -> u64 {
        self.last_committed.load(Ordering::SeqCst)
    }
}

/// Block storage drives this committer through internal sync; it applies the
/// block's state diffs and reports the next height it expects.
pub struct StateStorageCommitter {
    state: Arc<VersionedStateStorage>,
}

impl StateStorageCommitter {
    pub fn new(state: Arc<VersionedStateStorage>) -> Self {
        StateStorageCommitter { state }
    }
}

#[async_trait]
impl Committer for StateStorageCommitter {
    async fn commit(&self, ctx: Context, pair: BlockPair) -> ProtocolResult<u64> {
        self.state
            .commit_state_diffs(ctx, pair.height(), pair.results.state_diffs.clone())
            .await
    }
}
