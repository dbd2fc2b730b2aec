pub mod adapter;
mod committed;
mod context;
mod pending;
#[cfg(test)]
mod tests;

pub use adapter::message::{ForwardedTransactions, ForwardedTxsHandler, END_GOSSIP_FORWARDED_TXS};
pub use adapter::DefaultTxPoolAdapter;
pub use context::TxContext;

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use derive_more::Display;
use futures::future::{self, Either};
use futures::pin_mut;
use futures_timer::Delay;
use log::info;
use parking_lot::RwLock;

use common_sync::{context_cancelled, BlockTracker, CancelContext};
use protocol::traits::{
    Committer, Context, OrderingInput, OrderingOutput, TxPool, TxPoolAdapter,
};
use protocol::types::{
    Address, BlockPair, Hash, SignedTransaction, TransactionStatus,
};
use protocol::{ProtocolError, ProtocolErrorKind, ProtocolResult};

use crate::committed::CommittedPool;
use crate::pending::PendingPool;

#[derive(Clone, Debug)]
pub struct TxPoolConfig {
    pub pool_size:                     usize,
    pub virtual_chain_id:              u32,
    pub protocol_version_min:          u32,
    pub protocol_version_max:          u32,
    pub tx_expiration_window:          Duration,
    pub committed_retention:           Duration,
    pub minimum_transactions_in_block: usize,
    pub empty_block_delay:             Duration,
    /// Internal ceiling on waiting for a future block height.
    pub future_height_deadline:        Duration,
}

/// In-memory pool of pending and recently committed transactions.
///
/// Both sets sit behind reader-writer locks; the per-block commit holds each
/// writer lock once.
pub struct ImplTxPool<Adapter> {
    config:  TxPoolConfig,
    adapter: Arc<Adapter>,

    pending:   RwLock<PendingPool>,
    committed: RwLock<CommittedPool>,

    /// Last committed block height, shared with block storage.
    tracker: BlockTracker,
    /// Counts pending insertions to wake proposers waiting for transactions.
    arrivals: BlockTracker,
    /// Next height the committer expects. Starts at 1 so internal sync
    /// replays the whole log, rebuilding the committed set after a restart.
    next_expected: AtomicU64,
}

impl<Adapter: TxPoolAdapter + 'static> ImplTxPool<Adapter> {
    pub fn new(config: TxPoolConfig, adapter: Adapter, tracker: BlockTracker) -> Self {
        let pool_size = config.pool_size;

        ImplTxPool {
            config,
            adapter: Arc::new(adapter),
            pending: RwLock::new(PendingPool::new(pool_size)),
            committed: RwLock::new(CommittedPool::new()),
            tracker,
            arrivals: BlockTracker::new(0),
            next_expected: AtomicU64::new(1),
        }
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn pending_len(&self) -> usize {
        self.pending.read().len()
    }

    /// Commit integration, driven by block storage in log order: included
    /// hashes move from pending to committed, committed entries past the
    /// retention window are evicted. Returns the next expected height.
    pub fn on_block_committed(&self, pair: &BlockPair) -> ProtocolResult<u64> {
        let height = pair.height();
        let expected = self.next_expected.load(Ordering::SeqCst);
        if height != expected {
            return Err(PoolError::OutOfOrderCommit {
                expected,
                got: height,
            }
            .into());
        }

        let tx_hashes = pair
            .transactions
            .signed_transactions
            .iter()
            .map(|stx| stx.tx_hash)
            .collect::<Vec<_>>();
        let now = now_nanos();

        {
            let mut pending = self.pending.write();
            pending.remove_batch(&tx_hashes);
            pending.expire(now, self.config.tx_expiration_window);
        }
        {
            let mut committed = self.committed.write();
            committed.insert_batch(&tx_hashes, height, now);
            committed.expire(now, self.config.committed_retention);
        }

        info!(
            "[txpool]: block {} committed, {} txs moved to committed set",
            height,
            tx_hashes.len()
        );

        self.next_expected.store(height + 1, Ordering::SeqCst);
        self.tracker.advance(height);
        Ok(height + 1)
    }

    fn static_validate(&self, stx: &SignedTransaction) -> ProtocolResult<()> {
        let version = stx.raw.protocol_version;
        if version < self.config.protocol_version_min
            || version > self.config.protocol_version_max
        {
            return Err(PoolError::UnsupportedVersion {
                tx_hash: stx.tx_hash,
                version,
            }
            .into());
        }

        if stx.raw.virtual_chain_id != self.config.virtual_chain_id {
            return Err(PoolError::WrongChain {
                tx_hash: stx.tx_hash,
            }
            .into());
        }

        let now = now_nanos();
        let window = self.config.tx_expiration_window.as_nanos() as u64;
        if stx.raw.timestamp + window < now || stx.raw.timestamp > now + window {
            return Err(PoolError::TimestampWindow {
                tx_hash:   stx.tx_hash,
                timestamp: stx.raw.timestamp,
            }
            .into());
        }

        self.adapter
            .verify_transaction_signature(stx)
            .map_err(|_| PoolError::CheckSig {
                tx_hash: stx.tx_hash,
            })?;

        Ok(())
    }

    async fn insert_tx(&self, ctx: Context, stx: SignedTransaction) -> ProtocolResult<()> {
        self.static_validate(&stx)?;

        if self.committed.read().contains(&stx.tx_hash) {
            return Err(PoolError::CommittedTx {
                tx_hash: stx.tx_hash,
            }
            .into());
        }

        {
            let mut pending = self.pending.write();
            pending.check_reach_limit()?;
            pending.insert(stx.clone(), now_nanos())?;
        }
        self.arrivals.increment();

        if !ctx.is_network_origin_txs() {
            self.adapter.forward_transactions(ctx, vec![stx]).await?;
        }

        Ok(())
    }

    /// Blocks while the requested height is more than one ahead of the last
    /// committed block.
    async fn wait_for_height_in_line(&self, ctx: &Context, height: u64) -> ProtocolResult<bool> {
        if height <= self.tracker.current() + 1 {
            return Ok(true);
        }

        let caught_up = self.tracker.wait_for_height(height - 1);
        pin_mut!(caught_up);
        let deadline = Delay::new(self.config.future_height_deadline);
        pin_mut!(deadline);
        let cancelled = context_cancelled(ctx);
        pin_mut!(cancelled);

        match future::select(future::select(caught_up, deadline), cancelled).await {
            Either::Left((Either::Left(_), _)) => Ok(true),
            Either::Left((Either::Right(_), _)) => {
                Err(PoolError::DeadlineExceeded { height }.into())
            }
            // cancellation yields an empty, non-error proposal
            Either::Right(_) => Ok(false),
        }
    }

    /// Waits out the empty-block delay for more transactions to arrive.
    async fn wait_for_minimum(&self, ctx: &Context) {
        if self.config.empty_block_delay == Duration::from_millis(0)
            || self.pending_len() >= self.config.minimum_transactions_in_block
        {
            return;
        }

        let deadline = Delay::new(self.config.empty_block_delay);
        pin_mut!(deadline);

        loop {
            if self.pending_len() >= self.config.minimum_transactions_in_block {
                return;
            }

            let arrived = self.arrivals.wait_for_height(self.arrivals.current() + 1);
            pin_mut!(arrived);
            let cancelled = context_cancelled(ctx);
            pin_mut!(cancelled);

            match future::select(future::select(arrived, deadline.as_mut()), cancelled).await {
                Either::Left((Either::Left(_), _)) => continue,
                Either::Left((Either::Right(_), _)) | Either::Right(_) => return,
            }
        }
    }
}

#[async_trait]
impl<Adapter: TxPoolAdapter + 'static> TxPool for ImplTxPool<Adapter> {
    async fn add_new_transaction(
        &self,
        ctx: Context,
        stx: SignedTransaction,
    ) -> ProtocolResult<()> {
        self.insert_tx(ctx, stx).await
    }

    async fn handle_forwarded_transactions(
        &self,
        ctx: Context,
        sender: Address,
        stxs: Vec<SignedTransaction>,
    ) -> ProtocolResult<()> {
        let ctx = ctx.mark_network_origin_txs();
        info!(
            "[txpool]: {} forwarded txs from {:?}",
            stxs.len(),
            sender
        );

        for stx in stxs {
            // duplicates from concurrent forwarding are normal
            if let Err(e) = self.insert_tx(ctx.clone(), stx).await {
                log::debug!("[txpool]: forwarded tx dropped: {}", e);
            }
        }
        Ok(())
    }

    async fn get_transactions_for_ordering(
        &self,
        ctx: Context,
        input: OrderingInput,
    ) -> ProtocolResult<OrderingOutput> {
        let proposed_block_timestamp =
            std::cmp::max(now_nanos(), input.prev_block_timestamp + 1);

        if !self.wait_for_height_in_line(&ctx, input.current_block_height).await?
            || ctx.is_cancelled()
        {
            return Ok(OrderingOutput {
                transactions: vec![],
                proposed_block_timestamp,
            });
        }

        self.wait_for_minimum(&ctx).await;

        let transactions = self.pending.read().select(
            input.max_transactions,
            input.max_total_bytes,
            input.block_protocol_version,
        );

        Ok(OrderingOutput {
            transactions,
            proposed_block_timestamp: std::cmp::max(now_nanos(), input.prev_block_timestamp + 1),
        })
    }

    async fn validate_transactions_for_ordering(
        &self,
        _ctx: Context,
        _block_height: u64,
        stxs: &[SignedTransaction],
    ) -> ProtocolResult<()> {
        let mut seen = std::collections::HashSet::with_capacity(stxs.len());

        for stx in stxs {
            if !seen.insert(stx.tx_hash) {
                return Err(PoolError::DupInOrdering {
                    tx_hash: stx.tx_hash,
                }
                .into());
            }

            self.static_validate(stx)?;

            if self.committed.read().contains(&stx.tx_hash) {
                return Err(PoolError::CommittedTx {
                    tx_hash: stx.tx_hash,
                }
                .into());
            }
        }

        Ok(())
    }

    async fn get_transaction_status(
        &self,
        _ctx: Context,
        tx_hash: Hash,
    ) -> ProtocolResult<TransactionStatus> {
        if self.committed.read().contains(&tx_hash) {
            return Ok(TransactionStatus::Committed);
        }
        if self.pending.read().contains(&tx_hash) {
            return Ok(TransactionStatus::Pending);
        }

        Err(PoolError::NotFound { tx_hash }.into())
    }
}

/// Block storage drives this committer through internal sync.
pub struct TxPoolCommitter<Adapter> {
    pool: Arc<ImplTxPool<Adapter>>,
}

impl<Adapter: TxPoolAdapter + 'static> TxPoolCommitter<Adapter> {
    pub fn new(pool: Arc<ImplTxPool<Adapter>>) -> Self {
        TxPoolCommitter { pool }
    }
}

#[async_trait]
impl<Adapter: TxPoolAdapter + 'static> Committer for TxPoolCommitter<Adapter> {
    async fn commit(&self, _ctx: Context, pair: BlockPair) -> ProtocolResult<u64> {
        self.pool.on_block_committed(&pair)
    }
}

pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

#[derive(Debug, Display)]
pub enum PoolError {
    #[display(fmt = "tx {:?} declares unsupported protocol version {}", tx_hash, version)]
    UnsupportedVersion { tx_hash: Hash, version: u32 },

    #[display(fmt = "tx {:?} does not match our virtual chain", tx_hash)]
    WrongChain { tx_hash: Hash },

    #[display(fmt = "tx {:?} timestamp {} outside the admission window", tx_hash, timestamp)]
    TimestampWindow { tx_hash: Hash, timestamp: u64 },

    #[display(fmt = "tx {:?} signature verification failed", tx_hash)]
    CheckSig { tx_hash: Hash },

    #[display(fmt = "tx {:?} already pending", tx_hash)]
    Dup { tx_hash: Hash },

    #[display(fmt = "tx {:?} already committed", tx_hash)]
    CommittedTx { tx_hash: Hash },

    #[display(fmt = "pending pool reached its limit {}", pool_size)]
    ReachLimit { pool_size: usize },

    #[display(fmt = "deadline exceeded waiting for block height {}", height)]
    DeadlineExceeded { height: u64 },

    #[display(fmt = "commit out of order, expected {}, got {}", expected, got)]
    OutOfOrderCommit { expected: u64, got: u64 },

    #[display(fmt = "tx {:?} unknown to this node", tx_hash)]
    NotFound { tx_hash: Hash },

    #[display(fmt = "forwarded batch from {:?} has a bad signature", sender)]
    BatchSignature { sender: Address },

    #[display(fmt = "ordering contains tx {:?} twice", tx_hash)]
    DupInOrdering { tx_hash: Hash },
}

impl PoolError {
    /// The stable public-facing code this failure maps to.
    pub fn status(&self) -> TransactionStatus {
        match self {
            PoolError::UnsupportedVersion { .. } => TransactionStatus::RejectedUnsupportedVersion,
            PoolError::TimestampWindow { .. } => {
                TransactionStatus::RejectedTimestampWindowExceeded
            }
            PoolError::CheckSig { .. } => TransactionStatus::RejectedSignatureMismatch,
            PoolError::CommittedTx { .. } => TransactionStatus::DuplicateAlreadyCommitted,
            PoolError::Dup { .. } => TransactionStatus::Pending,
            _ => TransactionStatus::InternalError,
        }
    }
}

impl Error for PoolError {}

impl From<PoolError> for ProtocolError {
    fn from(error: PoolError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::TxPool, Box::new(error))
    }
}
