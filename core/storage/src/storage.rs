use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_timer::Delay;
use log::{error, info, warn};
use parking_lot::RwLock;

use common_sync::{Backoff, BlockTracker};
use protocol::traits::{BlockPersistence, BlockStorage, Committer, Context};
use protocol::types::{BlockPair, Hash};
use protocol::ProtocolResult;

use crate::StorageError;

const COMMIT_BACKOFF_BASE: Duration = Duration::from_millis(50);
const COMMIT_BACKOFF_CEILING: Duration = Duration::from_secs(5);
const COMMIT_MAX_RETRIES: u32 = 6;

struct CommitterSlot {
    name:      String,
    committer: Arc<dyn Committer>,
    /// Next height this committer expects; doubles as the replay cursor and
    /// serializes replay per committer.
    cursor:    tokio::sync::Mutex<u64>,
    degraded:  AtomicBool,
}

/// The block storage service: the persistence log plus the commit-height
/// tracker and internal sync of registered committers.
pub struct ImplBlockStorage<P> {
    persistence: Arc<P>,
    tracker:     BlockTracker,
    committers:  RwLock<Vec<Arc<CommitterSlot>>>,
}

impl<P: BlockPersistence + 'static> ImplBlockStorage<P> {
    pub async fn new(persistence: Arc<P>) -> ProtocolResult<Self> {
        let top = persistence
            .get_last_block_height(Context::new())
            .await?;

        Ok(ImplBlockStorage {
            persistence,
            tracker: BlockTracker::new(top),
            committers: RwLock::new(Vec::new()),
        })
    }

    /// Wakes on every commit; the transaction pool and the sync loop share it.
    pub fn block_tracker(&self) -> BlockTracker {
        self.tracker.clone()
    }

    /// Committers replay the whole log from height 1 on registration.
    pub fn register_committer(&self, name: &str, committer: Arc<dyn Committer>) {
        self.committers.write().push(Arc::new(CommitterSlot {
            name: name.to_owned(),
            committer,
            cursor: tokio::sync::Mutex::new(1),
            degraded: AtomicBool::new(false),
        }));
    }

    /// Replays committed blocks into every lagging committer, in log order,
    /// one block at a time per committer. Transient failures retry with
    /// bounded backoff; a committer that exhausts the budget is marked
    /// degraded and skipped until restart.
    pub async fn sync_committers(&self, ctx: Context) -> ProtocolResult<()> {
        let slots = self.committers.read().clone();

        for slot in slots {
            if slot.degraded.load(Ordering::SeqCst) {
                continue;
            }
            if let Err(e) = self.replay_committer(ctx.clone(), &slot).await {
                error!("[storage]: committer {} degraded: {}", slot.name, e);
            }
        }

        Ok(())
    }

    async fn replay_committer(&self, ctx: Context, slot: &CommitterSlot) -> ProtocolResult<()> {
        let mut cursor = slot.cursor.lock().await;

        while *cursor <= self.tracker.current() {
            let height = *cursor;
            let pair = self
                .persistence
                .get_block_at(ctx.clone(), height)
                .await?
                .ok_or(StorageError::MissingBlock { height })?;

            let mut backoff =
                Backoff::bounded(COMMIT_BACKOFF_BASE, COMMIT_BACKOFF_CEILING, COMMIT_MAX_RETRIES);

            loop {
                match slot.committer.commit(ctx.clone(), pair.clone()).await {
                    Ok(next_expected) => {
                        *cursor = next_expected;
                        break;
                    }
                    Err(e) => match backoff.next_delay() {
                        Some(delay) => {
                            warn!(
                                "[storage]: committer {} failed at height {}, retrying: {}",
                                slot.name, height, e
                            );
                            Delay::new(delay).await;
                        }
                        None => {
                            slot.degraded.store(true, Ordering::SeqCst);
                            return Err(StorageError::CommitterDegraded {
                                name: slot.name.clone(),
                                height,
                            }
                            .into());
                        }
                    },
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<P: BlockPersistence + 'static> BlockStorage for ImplBlockStorage<P> {
    async fn write_next_block(&self, ctx: Context, pair: BlockPair) -> ProtocolResult<()> {
        let height = pair.height();
        self.persistence
            .write_next_block(ctx.clone(), pair)
            .await?;

        info!("[storage]: block {} appended", height);
        self.tracker.advance(height);

        self.sync_committers(ctx).await
    }

    async fn get_last_block(&self, ctx: Context) -> ProtocolResult<Option<BlockPair>> {
        self.persistence.get_last_block(ctx).await
    }

    async fn get_last_block_height(&self, ctx: Context) -> ProtocolResult<u64> {
        self.persistence.get_last_block_height(ctx).await
    }

    async fn get_block_at(&self, ctx: Context, height: u64) -> ProtocolResult<Option<BlockPair>> {
        self.persistence.get_block_at(ctx, height).await
    }

    async fn get_block_by_tx(
        &self,
        ctx: Context,
        tx_hash: Hash,
        min_timestamp: u64,
        max_timestamp: u64,
    ) -> ProtocolResult<Option<(BlockPair, usize)>> {
        self.persistence
            .get_block_by_tx(ctx, tx_hash, min_timestamp, max_timestamp)
            .await
    }
}
