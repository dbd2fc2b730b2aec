use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use protocol::traits::{Consensus, Context, MessageHandler};
use protocol::types::{Address, BlockPair};
use protocol::ProtocolResult;

pub const END_GOSSIP_BENCHMARK_COMMIT: &str = "/gossip/consensus/benchmark/commit";
pub const END_GOSSIP_BENCHMARK_COMMITTED: &str = "/gossip/consensus/benchmark/committed";

/// The leader's `Commit(pair)` broadcast. Re-broadcasts carry the identical
/// pair.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommitMessage {
    pub pair: BlockPair,
}

/// A replica's acknowledgement, addressed to the sender of the Commit.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommittedMessage {
    pub last_committed_height: u64,
    pub sender:                Address,
    pub signature:             Bytes,
}

/// Canonical bytes an acknowledgement signs.
pub fn committed_status_payload(last_committed_height: u64) -> Bytes {
    Bytes::copy_from_slice(&last_committed_height.to_be_bytes())
}

pub struct CommitHandler<N> {
    service: Arc<N>,
}

impl<N: Consensus + 'static> CommitHandler<N> {
    pub fn new(service: Arc<N>) -> Self {
        CommitHandler { service }
    }
}

#[async_trait]
impl<N: Consensus + 'static> MessageHandler for CommitHandler<N> {
    type Message = CommitMessage;

    async fn process(&self, ctx: Context, msg: Self::Message) -> ProtocolResult<()> {
        self.service.handle_commit(ctx, msg.pair).await
    }
}

pub struct CommittedHandler<N> {
    service: Arc<N>,
}

impl<N: Consensus + 'static> CommittedHandler<N> {
    pub fn new(service: Arc<N>) -> Self {
        CommittedHandler { service }
    }
}

#[async_trait]
impl<N: Consensus + 'static> MessageHandler for CommittedHandler<N> {
    type Message = CommittedMessage;

    async fn process(&self, ctx: Context, msg: Self::Message) -> ProtocolResult<()> {
        self.service
            .handle_committed(ctx, msg.last_committed_height, msg.sender, msg.signature)
            .await
    }
}
