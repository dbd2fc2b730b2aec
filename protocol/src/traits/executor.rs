use async_trait::async_trait;
use bytes::Bytes;

use crate::traits::Context;
use crate::types::{
    ContractStateDiff, ExecutionResult, Receipt, SignedTransaction, TransactionStatus,
};
use crate::ProtocolResult;

/// The runtime a contract was built for. Contracts are trusted and
/// pre-bundled; there is no sandboxed bytecode here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessorType {
    Native,
}

#[derive(Clone, Debug)]
pub struct ExecutionInput {
    pub block_height:    u64,
    pub block_timestamp: u64,
    pub transactions:    Vec<SignedTransaction>,
}

#[derive(Clone, Debug)]
pub struct ExecutionOutput {
    pub receipts:    Vec<Receipt>,
    pub state_diffs: Vec<ContractStateDiff>,
}

#[derive(Clone, Debug)]
pub struct PreOrderInput {
    pub block_height:    u64,
    pub block_timestamp: u64,
    pub transactions:    Vec<SignedTransaction>,
}

#[derive(Clone, Debug)]
pub struct PreOrderOutput {
    /// One status per input transaction, in order.
    pub statuses: Vec<TransactionStatus>,
}

#[derive(Clone, Debug)]
pub struct QueryInput {
    pub contract:   String,
    pub method:     String,
    pub input_args: Vec<Bytes>,
}

#[derive(Clone, Debug)]
pub struct QueryOutput {
    pub execution_result: ExecutionResult,
    pub output_args:      Vec<Bytes>,
    /// The committed height the query was answered against.
    pub reference_height: u64,
}

#[async_trait]
pub trait VirtualMachine: Send + Sync {
    /// Deterministically executes a committed block's transaction set.
    async fn process_transaction_set(
        &self,
        ctx: Context,
        input: ExecutionInput,
    ) -> ProtocolResult<ExecutionOutput>;

    /// Block-scoped and per-transaction checks run before ordering.
    async fn pre_order_check(
        &self,
        ctx: Context,
        input: PreOrderInput,
    ) -> ProtocolResult<PreOrderOutput>;

    /// Read-only call against the latest committed state.
    async fn process_query(&self, ctx: Context, input: QueryInput) -> ProtocolResult<QueryOutput>;
}

/// The versioned contract state store.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Atomically applies a block's diffs at `height`. Returns the next
    /// expected height.
    async fn commit_state_diffs(
        &self,
        ctx: Context,
        height: u64,
        diffs: Vec<ContractStateDiff>,
    ) -> ProtocolResult<u64>;

    /// Latest value written at a height ≤ `height` that has not been retired.
    async fn read_key(
        &self,
        ctx: Context,
        contract: &str,
        key: Bytes,
        height: u64,
    ) -> ProtocolResult<Option<Bytes>>;

    /// Read "as of now": latest committed value plus the reference height it
    /// was answered against.
    async fn read_key_latest(
        &self,
        ctx: Context,
        contract: &str,
        key: Bytes,
    ) -> ProtocolResult<(Option<Bytes>, u64)>;

    async fn last_committed_height(&self, ctx: Context) -> ProtocolResult<u64>;
}
