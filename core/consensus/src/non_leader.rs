use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc::UnboundedSender;
use log::{debug, info, warn};

use common_crypto::{Crypto, Signature};
use protocol::traits::{
    BlockStorage, Consensus, ConsensusContext, Context, Gossip, Priority, ValidationInput,
};
use protocol::types::{Address, BlockPair, Hash};
use protocol::ProtocolResult;

use crate::leader::{BenchmarkLeader, LeaderCommand};
use crate::message::{
    committed_status_payload, CommittedMessage, END_GOSSIP_BENCHMARK_COMMITTED,
};
use crate::{ConsensusConfig, ConsensusError};

/// The benchmark consensus service of one node.
///
/// Every replica handles `Commit` broadcasts here; on the fixed leader the
/// paired `BenchmarkLeader` task drives rounds and this service feeds it the
/// acknowledgements.
pub struct BenchmarkConsensus<CC, S, G, C> {
    config:  ConsensusConfig,
    context: Arc<CC>,
    storage: Arc<S>,
    gossip:  Arc<G>,

    leader_pubkey: Bytes,
    /// Single lock over the last-committed reference.
    last_committed: tokio::sync::Mutex<Option<BlockPair>>,
    leader_cmds:    Option<UnboundedSender<LeaderCommand>>,

    pin_c: PhantomData<C>,
}

impl<CC, S, G, C> BenchmarkConsensus<CC, S, G, C>
where
    CC: ConsensusContext + 'static,
    S: BlockStorage + 'static,
    G: Gossip + 'static,
    C: Crypto + Send + Sync + 'static,
{
    /// On the configured leader the second return value carries the round
    /// loop to spawn.
    pub async fn new(
        config: ConsensusConfig,
        context: Arc<CC>,
        storage: Arc<S>,
        gossip: Arc<G>,
    ) -> ProtocolResult<(Arc<Self>, Option<BenchmarkLeader<CC, S, G, C>>)> {
        let leader_pubkey = config
            .federation_pubkeys()
            .get(&config.leader_address)
            .cloned()
            .ok_or(ConsensusError::NotFederationMember(config.leader_address))?;

        let last_committed = storage.get_last_block(Context::new()).await?;

        let (leader, leader_cmds) = if config.is_leader() {
            let (leader, cmd_tx) = BenchmarkLeader::new(
                config.clone(),
                Arc::clone(&context),
                Arc::clone(&storage),
                Arc::clone(&gossip),
            );
            (Some(leader), Some(cmd_tx))
        } else {
            (None, None)
        };

        let service = Arc::new(BenchmarkConsensus {
            config,
            context,
            storage,
            gossip,
            leader_pubkey,
            last_committed: tokio::sync::Mutex::new(last_committed),
            leader_cmds,
            pin_c: PhantomData,
        });

        Ok((service, leader))
    }

    pub async fn last_committed_height(&self) -> u64 {
        self.last_committed
            .lock()
            .await
            .as_ref()
            .map(BlockPair::height)
            .unwrap_or(0)
    }

    fn validate_proof(&self, pair: &BlockPair) -> ProtocolResult<()> {
        let proof = &pair.results.proof;
        if proof.sender != self.config.leader_address {
            return Err(ConsensusError::InvalidProof(format!(
                "signed by {:?}, not the epoch leader",
                proof.sender
            ))
            .into());
        }

        let payload = Hash::digest(pair.proof_payload()?);
        C::verify_signature(
            payload.as_bytes().as_ref(),
            proof.signature.as_ref(),
            self.leader_pubkey.as_ref(),
        )
        .map_err(|_| ConsensusError::InvalidProof("signature mismatch".to_owned()).into())
    }

    async fn reply_committed(
        &self,
        ctx: Context,
        last_committed_height: u64,
        recipient: Address,
    ) -> ProtocolResult<()> {
        let payload = Hash::digest(committed_status_payload(last_committed_height));
        let signature = C::sign_message(&payload.as_bytes(), &self.config.node_privkey)
            .map_err(|e| ConsensusError::Other(format!("ack signing failed: {:?}", e)))?
            .to_bytes()
            .to_vec();
        let signature = Bytes::from(signature);

        let msg = CommittedMessage {
            last_committed_height,
            sender: self.config.node_address,
            signature,
        };

        info!(
            "[consensus]: replying committed with last committed height {}",
            last_committed_height
        );
        self.gossip
            .multicast(
                ctx,
                END_GOSSIP_BENCHMARK_COMMITTED,
                vec![recipient.as_bytes()],
                msg,
                Priority::High,
            )
            .await
    }
}

#[async_trait]
impl<CC, S, G, C> Consensus for BenchmarkConsensus<CC, S, G, C>
where
    CC: ConsensusContext + 'static,
    S: BlockStorage + 'static,
    G: Gossip + 'static,
    C: Crypto + Send + Sync + 'static,
{
    async fn handle_commit(&self, ctx: Context, pair: BlockPair) -> ProtocolResult<()> {
        if self.config.is_leader() {
            // own broadcast looped back by the transport
            return Ok(());
        }

        let mut last = self.last_committed.lock().await;
        let last_height = last.as_ref().map(BlockPair::height).unwrap_or(0);
        let height = pair.height();

        if pair.transactions.header.height != pair.results.header.height {
            warn!(
                "[consensus]: commit dropped, tx height {} differs from rx height {}",
                pair.transactions.header.height, pair.results.header.height
            );
            return Ok(());
        }

        if let Err(e) = self.validate_proof(&pair) {
            warn!("[consensus]: commit dropped: {}", e);
            return Ok(());
        }

        if height > last_height + 1 {
            debug!(
                "[consensus]: future commit at height {} dropped, last committed {}",
                height, last_height
            );
            return Ok(());
        }

        if height == last_height + 1 {
            let validation = self
                .context
                .validate_block_pair(ctx.clone(), ValidationInput {
                    current_block_height: height,
                    prev_block:           last.clone(),
                    pair:                 pair.clone(),
                })
                .await;
            if let Err(e) = validation {
                warn!("[consensus]: commit at height {} rejected: {}", height, e);
                return Ok(());
            }

            // a failed append sends no reply, the leader will retry
            self.storage.write_next_block(ctx.clone(), pair.clone()).await?;
            *last = Some(pair.clone());
        }

        let reply_height = last.as_ref().map(BlockPair::height).unwrap_or(0);
        self.reply_committed(ctx, reply_height, pair.results.proof.sender)
            .await
    }

    async fn handle_committed(
        &self,
        _ctx: Context,
        last_committed_height: u64,
        sender: Address,
        signature: Bytes,
    ) -> ProtocolResult<()> {
        match &self.leader_cmds {
            Some(cmds) => {
                let _ = cmds.unbounded_send(LeaderCommand::Ack {
                    sender,
                    last_committed_height,
                    signature,
                });
                Ok(())
            }
            // a non-leader has nothing to do with stray acknowledgements
            None => Ok(()),
        }
    }
}
