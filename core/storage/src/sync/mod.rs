pub mod message;

use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::{self, Either};
use futures::pin_mut;
use futures::StreamExt;
use futures_timer::Delay;
use log::{info, warn};

use common_sync::{BlockTracker, CancelContext};
use protocol::traits::{BlockStorage, Context, Gossip, Priority};
use protocol::types::{Address, BlockPair, Hash};
use protocol::ProtocolResult;

use crate::sync::message::{
    BlockAvailabilityRequest, BlockAvailabilityResponse, BlockChunkRequest, BlockChunkResponse,
    END_GOSSIP_AVAILABILITY_REQUEST, END_GOSSIP_CHUNK_REQUEST,
};
use crate::StorageError;

const AVAILABILITY_COLLECT_WINDOW: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub no_commit_interval: Duration,
    pub commit_timeout:     Duration,
    pub batch_size:         u64,
}

/// External block sync.
///
/// Idle until no block commits within `no_commit_interval`, then broadcasts
/// an availability request, picks a source among the peers ahead of us, and
/// pulls height ranges until caught up. Any timeout or bad chunk falls back
/// to idle.
pub struct BlockSync<S, G> {
    storage:      Arc<S>,
    gossip:       Arc<G>,
    tracker:      BlockTracker,
    node_address: Address,
    config:       SyncConfig,

    availability_rx: UnboundedReceiver<BlockAvailabilityResponse>,
    chunk_rx:        UnboundedReceiver<BlockChunkResponse>,
}

impl<S, G> BlockSync<S, G>
where
    S: BlockStorage + 'static,
    G: Gossip + 'static,
{
    /// The returned senders feed the two response handlers.
    pub fn new(
        storage: Arc<S>,
        gossip: Arc<G>,
        tracker: BlockTracker,
        node_address: Address,
        config: SyncConfig,
    ) -> (
        Self,
        UnboundedSender<BlockAvailabilityResponse>,
        UnboundedSender<BlockChunkResponse>,
    ) {
        let (availability_tx, availability_rx) = unbounded();
        let (chunk_tx, chunk_rx) = unbounded();

        let sync = BlockSync {
            storage,
            gossip,
            tracker,
            node_address,
            config,
            availability_rx,
            chunk_rx,
        };

        (sync, availability_tx, chunk_tx)
    }

    pub async fn run(mut self, ctx: Context) {
        while !ctx.is_cancelled() {
            // Idle: a commit within the interval restarts the state
            if self.idle_until_stalled(ctx.clone()).await {
                continue;
            }
            if ctx.is_cancelled() {
                break;
            }

            // CollectingAvailabilityResponses
            let responses = self.collect_availability(ctx.clone()).await;
            let source = match choose_source(&responses) {
                Some(source) => source.clone(),
                None => continue,
            };

            info!(
                "[block-sync]: source {:?} has top {}, local top {}",
                source.sender,
                source.top,
                self.tracker.current()
            );

            // WaitingForChunks
            if let Err(e) = self.fetch_until_caught_up(ctx.clone(), &source).await {
                warn!("[block-sync]: sync round aborted: {}", e);
            }
        }
    }

    /// True when a commit arrived before the no-commit interval elapsed.
    async fn idle_until_stalled(&self, ctx: Context) -> bool {
        let next = self.tracker.current() + 1;

        let committed = self
            .tracker
            .wait_for_height_within(next, self.config.no_commit_interval);
        pin_mut!(committed);

        let cancelled = common_sync::context_cancelled(&ctx);
        pin_mut!(cancelled);

        match future::select(committed, cancelled).await {
            Either::Left((result, _)) => result.is_ok(),
            Either::Right(_) => true,
        }
    }

    async fn collect_availability(&mut self, ctx: Context) -> Vec<BlockAvailabilityResponse> {
        drain(&mut self.availability_rx);

        let local_top = self.tracker.current();
        let request = BlockAvailabilityRequest {
            sender: self.node_address,
            top:    local_top,
        };

        if let Err(e) = self
            .gossip
            .broadcast(
                ctx,
                END_GOSSIP_AVAILABILITY_REQUEST,
                request,
                Priority::Normal,
            )
            .await
        {
            warn!("[block-sync]: availability broadcast failed: {}", e);
            return vec![];
        }

        let mut responses = Vec::new();
        let deadline = Delay::new(AVAILABILITY_COLLECT_WINDOW);
        pin_mut!(deadline);

        loop {
            match future::select(self.availability_rx.next(), deadline.as_mut()).await {
                Either::Left((Some(resp), _)) => {
                    if resp.top > local_top {
                        responses.push(resp);
                    }
                }
                Either::Left((None, _)) => break,
                Either::Right(_) => break,
            }
        }

        responses
    }

    async fn fetch_until_caught_up(
        &mut self,
        ctx: Context,
        source: &BlockAvailabilityResponse,
    ) -> ProtocolResult<()> {
        while self.tracker.current() < source.top && !ctx.is_cancelled() {
            let local_top = self.tracker.current();
            let to = std::cmp::min(local_top + self.config.batch_size, source.top);

            drain(&mut self.chunk_rx);
            self.gossip
                .multicast(
                    ctx.clone(),
                    END_GOSSIP_CHUNK_REQUEST,
                    vec![source.sender.as_bytes()],
                    BlockChunkRequest {
                        sender: self.node_address,
                        from:   local_top + 1,
                        to,
                    },
                    Priority::High,
                )
                .await?;

            let chunk = {
                let deadline = Delay::new(self.config.commit_timeout);
                pin_mut!(deadline);

                match future::select(self.chunk_rx.next(), deadline).await {
                    Either::Left((Some(chunk), _)) => chunk,
                    Either::Left((None, _)) | Either::Right(_) => {
                        return Err(StorageError::BadChunk("timed out".to_owned()).into());
                    }
                }
            };

            if chunk.sender != source.sender {
                return Err(StorageError::BadChunk("unexpected sender".to_owned()).into());
            }

            let prev = self.storage.get_last_block(ctx.clone()).await?;
            validate_chunk(local_top + 1, prev.as_ref(), &chunk.blocks)?;

            for pair in chunk.blocks {
                self.storage.write_next_block(ctx.clone(), pair).await?;
            }
        }

        Ok(())
    }
}

fn drain<T>(rx: &mut UnboundedReceiver<T>) {
    while let Ok(Some(_)) = rx.try_next() {}
}

/// Among peers offering the same top, pick by lowest address hash so every
/// replica syncs from the same source.
pub(crate) fn choose_source(
    responses: &[BlockAvailabilityResponse],
) -> Option<&BlockAvailabilityResponse> {
    responses.iter().max_by(|a, b| {
        a.top.cmp(&b.top).then_with(|| {
            Hash::digest(b.sender.as_bytes()).cmp(&Hash::digest(a.sender.as_bytes()))
        })
    })
}

/// A chunk must start at exactly the next local height, be consecutive, and
/// chain both hash pointers onto the previous pair.
pub(crate) fn validate_chunk(
    expected_first: u64,
    prev: Option<&BlockPair>,
    blocks: &[BlockPair],
) -> ProtocolResult<()> {
    let first = match blocks.first() {
        Some(pair) => pair,
        None => return Err(StorageError::BadChunk("empty".to_owned()).into()),
    };

    if first.height() != expected_first {
        return Err(StorageError::ChunkGap {
            expected: expected_first,
            got:      first.height(),
        }
        .into());
    }

    let mut prev_tx_hash = match prev {
        Some(pair) => Some((pair.transactions_block_hash()?, pair.results_block_hash()?)),
        None => None,
    };
    let mut expected_height = expected_first;

    for pair in blocks {
        if pair.height() != expected_height {
            return Err(StorageError::BadChunk("heights not consecutive".to_owned()).into());
        }
        if pair.results.header.height != pair.transactions.header.height {
            return Err(StorageError::BadChunk("tx and rx heights differ".to_owned()).into());
        }

        if let Some((tx_hash, rx_hash)) = prev_tx_hash {
            if pair.transactions.header.prev_block_hash != tx_hash
                || pair.results.header.prev_block_hash != rx_hash
            {
                return Err(StorageError::BadChunk("broken hash chain".to_owned()).into());
            }
        }

        prev_tx_hash = Some((pair.transactions_block_hash()?, pair.results_block_hash()?));
        expected_height += 1;
    }

    Ok(())
}
