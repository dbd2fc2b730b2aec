use async_trait::async_trait;
use parking_lot::RwLock;

use protocol::traits::{BlockPersistence, Context, ScanCursor};
use protocol::types::{BlockPair, Hash};
use protocol::ProtocolResult;

use crate::StorageError;

/// Vec-backed persistence for tests and ephemeral nodes.
pub struct MemoryBlockPersistence {
    blocks: RwLock<Vec<BlockPair>>,
}

impl MemoryBlockPersistence {
    pub fn new() -> Self {
        MemoryBlockPersistence {
            blocks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryBlockPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockPersistence for MemoryBlockPersistence {
    async fn write_next_block(&self, _ctx: Context, pair: BlockPair) -> ProtocolResult<()> {
        let mut blocks = self.blocks.write();

        let top = blocks.len() as u64;
        if pair.height() != top + 1 {
            return Err(StorageError::OutOfOrder {
                height: pair.height(),
                top,
            }
            .into());
        }

        blocks.push(pair);
        Ok(())
    }

    async fn get_last_block(&self, _ctx: Context) -> ProtocolResult<Option<BlockPair>> {
        Ok(self.blocks.read().last().cloned())
    }

    async fn get_last_block_height(&self, _ctx: Context) -> ProtocolResult<u64> {
        Ok(self.blocks.read().len() as u64)
    }

    async fn get_block_at(&self, _ctx: Context, height: u64) -> ProtocolResult<Option<BlockPair>> {
        if height == 0 {
            return Ok(None);
        }
        Ok(self.blocks.read().get(height as usize - 1).cloned())
    }

    async fn scan_blocks(
        &self,
        _ctx: Context,
        from: u64,
        page_size: usize,
        cursor: ScanCursor<'_>,
    ) -> ProtocolResult<()> {
        if from == 0 {
            return Err(StorageError::MissingOffset { height: from }.into());
        }

        let blocks = self.blocks.read().clone();
        let mut next = from as usize - 1;

        while next < blocks.len() {
            let page = &blocks[next..std::cmp::min(next + page_size, blocks.len())];
            if !cursor(page[0].height(), page) {
                break;
            }
            next += page.len();
        }

        Ok(())
    }

    async fn get_block_by_tx(
        &self,
        _ctx: Context,
        tx_hash: Hash,
        min_timestamp: u64,
        max_timestamp: u64,
    ) -> ProtocolResult<Option<(BlockPair, usize)>> {
        let blocks = self.blocks.read();

        for pair in blocks.iter() {
            if pair.timestamp() > max_timestamp {
                break;
            }
            if pair.timestamp() < min_timestamp {
                continue;
            }

            for (position, receipt) in pair.results.receipts.iter().enumerate() {
                if receipt.tx_hash == tx_hash {
                    return Ok(Some((pair.clone(), position)));
                }
            }
        }

        Ok(None)
    }
}
