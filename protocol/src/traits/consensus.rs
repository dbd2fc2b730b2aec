use async_trait::async_trait;
use bytes::Bytes;

use crate::traits::Context;
use crate::types::{Address, BlockPair};
use crate::ProtocolResult;

/// Gossip-driven entry points of the benchmark consensus service.
#[async_trait]
pub trait Consensus: Send + Sync {
    /// A `Commit(pair)` broadcast by the leader arrived.
    async fn handle_commit(&self, ctx: Context, pair: BlockPair) -> ProtocolResult<()>;

    /// A `Committed` acknowledgement addressed to this node arrived.
    async fn handle_committed(
        &self,
        ctx: Context,
        last_committed_height: u64,
        sender: Address,
        signature: Bytes,
    ) -> ProtocolResult<()>;
}

#[derive(Clone, Debug)]
pub struct ProposalInput {
    pub current_block_height: u64,
    /// The last committed pair, absent only before the first block.
    pub prev_block:           Option<BlockPair>,
}

#[derive(Clone, Debug)]
pub struct ValidationInput {
    pub current_block_height: u64,
    pub prev_block:           Option<BlockPair>,
    pub pair:                 BlockPair,
}

/// Builds proposals and validates incoming ones on behalf of the consensus
/// algorithm.
#[async_trait]
pub trait ConsensusContext: Send + Sync {
    async fn request_new_block_proposal(
        &self,
        ctx: Context,
        input: ProposalInput,
    ) -> ProtocolResult<BlockPair>;

    async fn validate_block_pair(&self, ctx: Context, input: ValidationInput)
        -> ProtocolResult<()>;
}
