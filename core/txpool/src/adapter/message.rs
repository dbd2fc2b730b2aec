use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use protocol::traits::{Context, MessageHandler, TxPool, TxPoolAdapter};
use protocol::types::{Address, SignedTransaction};
use protocol::ProtocolResult;

use crate::adapter::batch_payload;
use crate::ImplTxPool;

pub const END_GOSSIP_FORWARDED_TXS: &str = "/gossip/txpool/forwarded_txs";

/// A signed batch of transactions relayed by a peer's pool.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ForwardedTransactions {
    pub sender:        Address,
    pub signer_pubkey: Bytes,
    pub signature:     Bytes,
    pub batch:         Vec<SignedTransaction>,
}

pub struct ForwardedTxsHandler<Adapter> {
    pool: Arc<ImplTxPool<Adapter>>,
}

impl<Adapter: TxPoolAdapter + 'static> ForwardedTxsHandler<Adapter> {
    pub fn new(pool: Arc<ImplTxPool<Adapter>>) -> Self {
        ForwardedTxsHandler { pool }
    }
}

#[async_trait]
impl<Adapter: TxPoolAdapter + 'static> MessageHandler for ForwardedTxsHandler<Adapter> {
    type Message = ForwardedTransactions;

    async fn process(&self, ctx: Context, msg: Self::Message) -> ProtocolResult<()> {
        // the batch envelope is verified before any transaction is admitted
        self.pool.adapter().verify_batch_signature(
            msg.sender,
            msg.signer_pubkey,
            batch_payload(&msg.batch),
            msg.signature,
        )?;

        self.pool
            .handle_forwarded_transactions(ctx, msg.sender, msg.batch)
            .await
    }
}
