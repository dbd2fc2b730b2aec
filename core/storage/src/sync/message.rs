use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use log::warn;
use serde::{Deserialize, Serialize};

use protocol::traits::{BlockStorage, Context, Gossip, MessageHandler, Priority};
use protocol::types::{Address, BlockPair};
use protocol::ProtocolResult;

pub const END_GOSSIP_AVAILABILITY_REQUEST: &str = "/gossip/block_sync/availability_request";
pub const END_GOSSIP_AVAILABILITY_RESPONSE: &str = "/gossip/block_sync/availability_response";
pub const END_GOSSIP_CHUNK_REQUEST: &str = "/gossip/block_sync/chunk_request";
pub const END_GOSSIP_CHUNK_RESPONSE: &str = "/gossip/block_sync/chunk_response";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockAvailabilityRequest {
    pub sender: Address,
    pub top:    u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockAvailabilityResponse {
    pub sender: Address,
    pub top:    u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockChunkRequest {
    pub sender: Address,
    pub from:   u64,
    pub to:     u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockChunkResponse {
    pub sender: Address,
    pub blocks: Vec<BlockPair>,
}

/// Serves availability requests with this node's top height.
pub struct AvailabilityRequestHandler<S, G> {
    storage:      Arc<S>,
    gossip:       Arc<G>,
    node_address: Address,
}

impl<S, G> AvailabilityRequestHandler<S, G>
where
    S: BlockStorage + 'static,
    G: Gossip + 'static,
{
    pub fn new(storage: Arc<S>, gossip: Arc<G>, node_address: Address) -> Self {
        AvailabilityRequestHandler {
            storage,
            gossip,
            node_address,
        }
    }
}

#[async_trait]
impl<S, G> MessageHandler for AvailabilityRequestHandler<S, G>
where
    S: BlockStorage + 'static,
    G: Gossip + 'static,
{
    type Message = BlockAvailabilityRequest;

    async fn process(&self, ctx: Context, msg: Self::Message) -> ProtocolResult<()> {
        let top = self.storage.get_last_block_height(ctx.clone()).await?;
        if top <= msg.top {
            // nothing the requester does not already have
            return Ok(());
        }

        let resp = BlockAvailabilityResponse {
            sender: self.node_address,
            top,
        };
        self.gossip
            .multicast(
                ctx,
                END_GOSSIP_AVAILABILITY_RESPONSE,
                vec![msg.sender.as_bytes()],
                resp,
                Priority::Normal,
            )
            .await
    }
}

/// Forwards availability responses into the sync state machine.
pub struct AvailabilityResponseHandler {
    tx: UnboundedSender<BlockAvailabilityResponse>,
}

impl AvailabilityResponseHandler {
    pub fn new(tx: UnboundedSender<BlockAvailabilityResponse>) -> Self {
        AvailabilityResponseHandler { tx }
    }
}

#[async_trait]
impl MessageHandler for AvailabilityResponseHandler {
    type Message = BlockAvailabilityResponse;

    async fn process(&self, _ctx: Context, msg: Self::Message) -> ProtocolResult<()> {
        if self.tx.unbounded_send(msg).is_err() {
            warn!("[block-sync]: availability response dropped, sync loop gone");
        }
        Ok(())
    }
}

/// Serves chunk requests by reading consecutive blocks off the log.
pub struct ChunkRequestHandler<S, G> {
    storage:      Arc<S>,
    gossip:       Arc<G>,
    node_address: Address,
}

impl<S, G> ChunkRequestHandler<S, G>
where
    S: BlockStorage + 'static,
    G: Gossip + 'static,
{
    pub fn new(storage: Arc<S>, gossip: Arc<G>, node_address: Address) -> Self {
        ChunkRequestHandler {
            storage,
            gossip,
            node_address,
        }
    }
}

#[async_trait]
impl<S, G> MessageHandler for ChunkRequestHandler<S, G>
where
    S: BlockStorage + 'static,
    G: Gossip + 'static,
{
    type Message = BlockChunkRequest;

    async fn process(&self, ctx: Context, msg: Self::Message) -> ProtocolResult<()> {
        let mut blocks = Vec::new();
        for height in msg.from..=msg.to {
            match self.storage.get_block_at(ctx.clone(), height).await? {
                Some(pair) => blocks.push(pair),
                None => break,
            }
        }

        let resp = BlockChunkResponse {
            sender: self.node_address,
            blocks,
        };
        self.gossip
            .multicast(
                ctx,
                END_GOSSIP_CHUNK_RESPONSE,
                vec![msg.sender.as_bytes()],
                resp,
                Priority::High,
            )
            .await
    }
}

/// Forwards chunk responses into the sync state machine.
pub struct ChunkResponseHandler {
    tx: UnboundedSender<BlockChunkResponse>,
}

impl ChunkResponseHandler {
    pub fn new(tx: UnboundedSender<BlockChunkResponse>) -> Self {
        ChunkResponseHandler { tx }
    }
}

#[async_trait]
impl MessageHandler for ChunkResponseHandler {
    type Message = BlockChunkResponse;

    async fn process(&self, _ctx: Context, msg: Self::Message) -> ProtocolResult<()> {
        if self.tx.unbounded_send(msg).is_err() {
            warn!("[block-sync]: chunk response dropped, sync loop gone");
        }
        Ok(())
    }
}
