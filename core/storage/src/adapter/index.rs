use std::collections::HashMap;

use protocol::types::BlockPair;
use protocol::ProtocolResult;

use crate::StorageError;

const MINUTE_TO_NANO: u64 = 60 * 1_000_000_000;

pub fn ts_bucket_key(nanos: u64) -> u64 {
    nanos / MINUTE_TO_NANO
}

/// In-memory projection of the block log, rebuilt by a full scan on startup.
///
/// `height_offset` always contains an entry for `top + 1` pointing at the
/// end-of-file offset where the next block will be written.
pub struct BlockHeightIndex {
    height_offset:            HashMap<u64, u64>,
    first_block_in_ts_bucket: HashMap<u64, u64>,
    top_block:                Option<BlockPair>,
    top_height:               u64,
}

impl BlockHeightIndex {
    pub fn new(first_block_offset: u64) -> Self {
        let mut height_offset = HashMap::new();
        height_offset.insert(1, first_block_offset);

        BlockHeightIndex {
            height_offset,
            first_block_in_ts_bucket: HashMap::new(),
            top_block: None,
            top_height: 0,
        }
    }

    pub fn top_height(&self) -> u64 {
        self.top_height
    }

    pub fn top_block(&self) -> Option<BlockPair> {
        self.top_block.clone()
    }

    pub fn offset_for(&self, height: u64) -> ProtocolResult<u64> {
        self.height_offset
            .get(&height)
            .copied()
            .ok_or_else(|| StorageError::MissingOffset { height }.into())
    }

    /// The exclusive append position at the end of the log.
    pub fn writing_tip_offset(&self) -> ProtocolResult<u64> {
        self.offset_for(self.top_height + 1)
    }

    /// Earliest block carrying at least one transaction within the bucket
    /// range covering `[range_start, range_end]`.
    pub fn earliest_tx_block_in_ts_range(&self, range_start: u64, range_end: u64) -> Option<u64> {
        let from_bucket = ts_bucket_key(range_start);
        let to_bucket = ts_bucket_key(range_end);

        for bucket in from_bucket..=to_bucket {
            if let Some(height) = self.first_block_in_ts_bucket.get(&bucket) {
                return Some(*height);
            }
        }
        None
    }

    pub fn append_block(
        &mut self,
        prev_tip_offset: u64,
        new_tip_offset: u64,
        pair: &BlockPair,
    ) -> ProtocolResult<()> {
        let current_tip = self.offset_for(self.top_height + 1)?;
        if current_tip != prev_tip_offset {
            return Err(StorageError::IndexMismatch {
                expected: current_tip,
                found:    prev_tip_offset,
            }
            .into());
        }

        let height = pair.height();
        self.top_block = Some(pair.clone());
        self.top_height = height;
        self.height_offset.insert(height + 1, new_tip_offset);

        if pair.results.header.num_receipts > 0 {
            self.first_block_in_ts_bucket
                .entry(ts_bucket_key(pair.timestamp()))
                .or_insert(height);
        }

        Ok(())
    }
}
