use async_trait::async_trait;

use crate::traits::Context;
use crate::types::{BlockPair, Hash};
use crate::ProtocolResult;

/// Page cursor for `scan_blocks`. Receives the height of the first block in
/// the page and the page itself, returns whether more pages are wanted.
pub type ScanCursor<'a> = &'a mut (dyn FnMut(u64, &[BlockPair]) -> bool + Send);

/// The append-only physical log of committed block pairs.
///
/// The on-disk log is the system of record; the in-memory height index is a
/// rebuildable projection of it.
#[async_trait]
pub trait BlockPersistence: Send + Sync {
    /// Appends exactly when `pair.height() == top + 1`, under the writing-tip
    /// lock that guarantees at most one appender.
    async fn write_next_block(&self, ctx: Context, pair: BlockPair) -> ProtocolResult<()>;

    async fn get_last_block(&self, ctx: Context) -> ProtocolResult<Option<BlockPair>>;

    async fn get_last_block_height(&self, ctx: Context) -> ProtocolResult<u64>;

    async fn get_block_at(&self, ctx: Context, height: u64) -> ProtocolResult<Option<BlockPair>>;

    /// Streams consecutive blocks starting at `from` in pages of `page_size`.
    /// Terminates when the cursor returns false or the current top is reached.
    async fn scan_blocks(
        &self,
        ctx: Context,
        from: u64,
        page_size: usize,
        cursor: ScanCursor<'_>,
    ) -> ProtocolResult<()>;

    /// Timestamp-bucket accelerated lookup. Returns the containing block and
    /// the receipt index within it.
    async fn get_block_by_tx(
        &self,
        ctx: Context,
        tx_hash: Hash,
        min_timestamp: u64,
        max_timestamp: u64,
    ) -> ProtocolResult<Option<(BlockPair, usize)>>;
}

/// The block storage service: the persistence log plus committer fan-out and
/// cross-node synchronization.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    async fn write_next_block(&self, ctx: Context, pair: BlockPair) -> ProtocolResult<()>;

    async fn get_last_block(&self, ctx: Context) -> ProtocolResult<Option<BlockPair>>;

    async fn get_last_block_height(&self, ctx: Context) -> ProtocolResult<u64>;

    async fn get_block_at(&self, ctx: Context, height: u64) -> ProtocolResult<Option<BlockPair>>;

    async fn get_block_by_tx(
        &self,
        ctx: Context,
        tx_hash: Hash,
        min_timestamp: u64,
        max_timestamp: u64,
    ) -> ProtocolResult<Option<(BlockPair, usize)>>;
}

/// An in-node consumer of committed blocks, replayed in log order.
///
/// `commit` returns the next height the committer expects; block storage uses
/// it as the replay cursor. Calling out of order is a programming error.
#[async_trait]
pub trait Committer: Send + Sync {
    async fn commit(&self, ctx: Context, pair: BlockPair) -> ProtocolResult<u64>;
}
