use async_trait::async_trait;
use bytes::Bytes;

use crate::traits::Context;
use crate::types::{Address, Hash, SignedTransaction, TransactionStatus};
use crate::ProtocolResult;

#[derive(Clone, Debug)]
pub struct OrderingInput {
    pub block_protocol_version: u32,
    pub current_block_height:   u64,
    /// Timestamp of the previous block in nanoseconds; the proposed block
    /// timestamp must be strictly greater.
    pub prev_block_timestamp:   u64,
    pub max_transactions:       usize,
    pub max_total_bytes:        usize,
}

#[derive(Clone, Debug)]
pub struct OrderingOutput {
    pub transactions:             Vec<SignedTransaction>,
    pub proposed_block_timestamp: u64,
}

#[async_trait]
pub trait TxPool: Send + Sync {
    /// Admission entry for transactions submitted by a local client.
    async fn add_new_transaction(&self, ctx: Context, stx: SignedTransaction)
        -> ProtocolResult<()>;

    /// Admission entry for a signed batch forwarded by a peer. The batch
    /// sender signature must have been verified by the caller.
    async fn handle_forwarded_transactions(
        &self,
        ctx: Context,
        sender: Address,
        stxs: Vec<SignedTransaction>,
    ) -> ProtocolResult<()>;

    /// Proposal service. Blocks while `current_block_height` is ahead of the
    /// committed chain, waits out the empty-block delay when under the
    /// configured minimum, and returns up to `max_transactions` in first-seen
    /// order. A cancelled context yields an empty, non-error output.
    async fn get_transactions_for_ordering(
        &self,
        ctx: Context,
        input: OrderingInput,
    ) -> ProtocolResult<OrderingOutput>;

    /// Re-validates a proposed ordering on behalf of a block validator.
    async fn validate_transactions_for_ordering(
        &self,
        ctx: Context,
        block_height: u64,
        stxs: &[SignedTransaction],
    ) -> ProtocolResult<()>;

    async fn get_transaction_status(
        &self,
        ctx: Context,
        tx_hash: Hash,
    ) -> ProtocolResult<TransactionStatus>;
}

/// Supplies the pool's outward-facing needs: gossip forwarding and signature
/// checks.
#[async_trait]
pub trait TxPoolAdapter: Send + Sync {
    /// Queues transactions for the batched, signed forward to peers.
    async fn forward_transactions(
        &self,
        ctx: Context,
        stxs: Vec<SignedTransaction>,
    ) -> ProtocolResult<()>;

    /// Verifies a forwarded batch envelope before any of its transactions
    /// are admitted.
    fn verify_batch_signature(
        &self,
        sender: Address,
        signer_pubkey: Bytes,
        payload: Bytes,
        signature: Bytes,
    ) -> ProtocolResult<()>;

    fn verify_transaction_signature(&self, stx: &SignedTransaction) -> ProtocolResult<()>;
}
