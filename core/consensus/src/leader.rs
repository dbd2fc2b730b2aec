use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::{self, Either};
use futures::pin_mut;
use futures::StreamExt;
use futures_timer::Delay;
use log::{error, info, warn};

use common_crypto::{Crypto, Signature};
use common_sync::{context_cancelled, CancelContext};
use protocol::traits::{
    BlockStorage, ConsensusContext, Context, Gossip, Priority, ProposalInput,
};
use protocol::types::{Address, BlockPair, BlockProof, Hash};
use protocol::ProtocolResult;

use crate::message::{committed_status_payload, CommitMessage, END_GOSSIP_BENCHMARK_COMMIT};
use crate::{quorum_size, ConsensusConfig, ConsensusError};

/// Input to the leader's owning task. All round bookkeeping lives inside the
/// task; there are no shared counters.
#[derive(Debug)]
pub enum LeaderCommand {
    Ack {
        sender:                Address,
        last_committed_height: u64,
        signature:             Bytes,
    },
}

/// The benchmark-consensus leader: proposes, broadcasts `Commit`, counts
/// acknowledgements and commits one height at a time.
pub struct BenchmarkLeader<CC, S, G, C> {
    config:  ConsensusConfig,
    context: Arc<CC>,
    storage: Arc<S>,
    gossip:  Arc<G>,

    federation_pubkeys: HashMap<Address, Bytes>,
    cmd_rx:             UnboundedReceiver<LeaderCommand>,

    pin_c: PhantomData<C>,
}

impl<CC, S, G, C> BenchmarkLeader<CC, S, G, C>
where
    CC: ConsensusContext + 'static,
    S: BlockStorage + 'static,
    G: Gossip + 'static,
    C: Crypto + Send + Sync + 'static,
{
    pub fn new(
        config: ConsensusConfig,
        context: Arc<CC>,
        storage: Arc<S>,
        gossip: Arc<G>,
    ) -> (Self, UnboundedSender<LeaderCommand>) {
        let (cmd_tx, cmd_rx) = unbounded();
        let federation_pubkeys = config.federation_pubkeys();

        let leader = BenchmarkLeader {
            config,
            context,
            storage,
            gossip,
            federation_pubkeys,
            cmd_rx,
            pin_c: PhantomData,
        };

        (leader, cmd_tx)
    }

    /// The consensus round loop. Runs until the context is cancelled.
    pub async fn run(mut self, ctx: Context) {
        let mut last_committed = match self.storage.get_last_block(ctx.clone()).await {
            Ok(last) => last,
            Err(e) => {
                error!("[consensus]: leader cannot read last block: {}", e);
                return;
            }
        };

        while !ctx.is_cancelled() {
            let pair = match self.next_proposal(ctx.clone(), &last_committed).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("[consensus]: proposal failed, retrying: {}", e);
                    Delay::new(self.config.retry_interval).await;
                    continue;
                }
            };

            match self.drive_round(ctx.clone(), pair).await {
                Ok(Some(committed)) => last_committed = Some(committed),
                Ok(None) => return, // cancelled
                Err(e) => {
                    warn!("[consensus]: round failed, retrying: {}", e);
                    Delay::new(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Genesis bring-up broadcasts an empty pair at height 0; afterwards the
    /// consensus context assembles the next candidate.
    async fn next_proposal(
        &self,
        ctx: Context,
        last_committed: &Option<BlockPair>,
    ) -> ProtocolResult<BlockPair> {
        let pair = match last_committed {
            None => genesis_pair(&self.config),
            Some(prev) => {
                // the height-0 pair opens the network but is not part of the
                // chain, block 1 points at nothing
                let prev_block = if prev.height() == 0 {
                    None
                } else {
                    Some(prev.clone())
                };

                self.context
                    .request_new_block_proposal(ctx, ProposalInput {
                        current_block_height: prev.height() + 1,
                        prev_block,
                    })
                    .await?
            }
        };

        self.sign_proposal(pair)
    }

    fn sign_proposal(&self, mut pair: BlockPair) -> ProtocolResult<BlockPair> {
        let payload = pair.proof_payload()?;
        let signature = C::sign_message(
            &Hash::digest(payload).as_bytes(),
            &self.config.node_privkey,
        )
        .map_err(|e| ConsensusError::Other(format!("proof signing failed: {:?}", e)))?
        .to_bytes()
        .to_vec();
        let signature = Bytes::from(signature);

        pair.results.proof = BlockProof {
            sender: self.config.node_address,
            signature,
        };
        Ok(pair)
    }

    /// Broadcasts the identical `Commit` until a quorum of distinct, valid
    /// acknowledgements at this height arrives, then commits locally.
    /// `Ok(None)` reports cancellation.
    async fn drive_round(
        &mut self,
        ctx: Context,
        pair: BlockPair,
    ) -> ProtocolResult<Option<BlockPair>> {
        let height = pair.height();
        let quorum = quorum_size(self.config.federation.len());
        let mut acks: HashSet<Address> = HashSet::new();

        self.broadcast_commit(ctx.clone(), &pair).await?;
        info!("[consensus]: leader broadcast commit for height {}", height);

        loop {
            let retry = Delay::new(self.config.retry_interval);
            pin_mut!(retry);
            let cancelled = context_cancelled(&ctx);
            pin_mut!(cancelled);

            match future::select(future::select(self.cmd_rx.next(), retry), cancelled).await {
                Either::Left((Either::Left((Some(cmd), _)), _)) => {
                    let LeaderCommand::Ack {
                        sender,
                        last_committed_height,
                        signature,
                    } = cmd;

                    if let Err(e) =
                        self.validate_ack(height, sender, last_committed_height, &signature)
                    {
                        warn!("[consensus]: {}", e);
                        continue;
                    }

                    acks.insert(sender);
                    if acks.len() >= quorum {
                        break;
                    }
                }
                Either::Left((Either::Left((None, _)), _)) => {
                    return Err(ConsensusError::Other("command channel closed".to_owned()).into());
                }
                Either::Left((Either::Right(_), _)) => {
                    // retry interval elapsed without quorum
                    self.broadcast_commit(ctx.clone(), &pair).await?;
                    info!(
                        "[consensus]: leader re-broadcast commit for height {}, acks {}/{}",
                        height,
                        acks.len(),
                        quorum
                    );
                }
                Either::Right(_) => return Ok(None),
            }
        }

        // the genesis pair is never persisted, real heights start at 1
        if height > 0 {
            self.storage.write_next_block(ctx, pair.clone()).await?;
        }

        info!("[consensus]: leader committed height {}", height);
        Ok(Some(pair))
    }

    async fn broadcast_commit(&self, ctx: Context, pair: &BlockPair) -> ProtocolResult<()> {
        self.gossip
            .broadcast(
                ctx,
                END_GOSSIP_BENCHMARK_COMMIT,
                CommitMessage { pair: pair.clone() },
                Priority::High,
            )
            .await
    }

    /// An acknowledgement counts only if its signature verifies against the
    /// sender's federation key and it acknowledges the height under
    /// negotiation.
    fn validate_ack(
        &self,
        height: u64,
        sender: Address,
        last_committed_height: u64,
        signature: &Bytes,
    ) -> ProtocolResult<()> {
        let pubkey = self
            .federation_pubkeys
            .get(&sender)
            .ok_or(ConsensusError::NotFederationMember(sender))?;

        let payload = Hash::digest(committed_status_payload(last_committed_height));
        C::verify_signature(payload.as_bytes().as_ref(), signature.as_ref(), pubkey.as_ref())
            .map_err(|_| ConsensusError::InvalidAck {
                sender,
                reason: "signature mismatch".to_owned(),
            })?;

        if last_committed_height != height {
            return Err(ConsensusError::InvalidAck {
                sender,
                reason: format!(
                    "acknowledges {}, height under negotiation is {}",
                    last_committed_height, height
                ),
            }
            .into());
        }

        Ok(())
    }
}

/// The deterministic height-0 pair the leader opens the network with. It is
/// acknowledged but never persisted.
pub(crate) fn genesis_pair(config: &ConsensusConfig) -> BlockPair {
    use protocol::types::{
        ResultsBlock, ResultsBlockHeader, TransactionsBlock, TransactionsBlockHeader,
    };

    let transactions = TransactionsBlock {
        header:              TransactionsBlockHeader {
            protocol_version:  0,
            virtual_chain_id:  0,
            height:            0,
            timestamp:         0,
            reference_time:    0,
            prev_block_hash:   Hash::from_empty(),
            block_proposer:    config.leader_address,
            transactions_root: Hash::from_empty(),
            metadata_hash:     Hash::from_empty(),
        },
        signed_transactions: vec![],
    };

    BlockPair {
        results: ResultsBlock {
            header:      ResultsBlockHeader {
                height:                  0,
                timestamp:               0,
                prev_block_hash:         Hash::from_empty(),
                transactions_block_hash: Hash::from_empty(),
                state_diff_root:         Hash::from_empty(),
                receipts_root:           Hash::from_empty(),
                num_receipts:            0,
            },
            receipts:    vec![],
            state_diffs: vec![],
            proof:       BlockProof {
                sender:    config.leader_address,
                signature: Bytes::new(),
            },
        },
        transactions,
    }
}
