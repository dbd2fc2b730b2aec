use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use futures_timer::Delay;
use log::info;

use common_merkle::Merkle;
use protocol::fixed_codec::FixedCodec;
use protocol::traits::{
    ConsensusContext, Context, ExecutionInput, OrderingInput, PreOrderInput, ProposalInput,
    TxPool, ValidationInput, VirtualMachine,
};
use protocol::types::{
    Address, BlockPair, BlockProof, ContractStateDiff, Hash, RawTransaction, Receipt, ResultsBlock,
    ResultsBlockHeader, SignedTransaction, TransactionStatus, TransactionsBlock,
    TransactionsBlockHeader, TRIGGER_CONTRACT, TRIGGER_METHOD,
};
use protocol::ProtocolResult;

use crate::validate::{
    block_validators, metadata_hash, transactions_merkle_root, BlockValidationContext,
};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub virtual_chain_id:           u32,
    pub protocol_version_min:       u32,
    pub protocol_version_max:       u32,
    pub leader_address:             Address,
    pub node_address:               Address,
    pub triggers_enabled:           bool,
    pub allowed_timestamp_jitter:   Duration,
    pub max_transactions_per_block: usize,
    pub max_block_size_bytes:       usize,
    pub below_minimal_block_delay:  Duration,
}

/// Assembles candidate block pairs for the leader and validates every field
/// of incoming ones for the replicas.
pub struct ConsensusEngine<P, V> {
    config: EngineConfig,
    txpool: Arc<P>,
    vm:     Arc<V>,
}

impl<P, V> ConsensusEngine<P, V>
where
    P: TxPool + 'static,
    V: VirtualMachine + 'static,
{
    pub fn new(config: EngineConfig, txpool: Arc<P>, vm: Arc<V>) -> Self {
        ConsensusEngine { config, txpool, vm }
    }

    fn trigger_transaction(&self, block_timestamp: u64) -> ProtocolResult<SignedTransaction> {
        let raw = RawTransaction {
            protocol_version: self.config.protocol_version_max,
            virtual_chain_id: self.config.virtual_chain_id,
            timestamp:        block_timestamp,
            signer:           Bytes::new(),
            contract:         TRIGGER_CONTRACT.to_owned(),
            method:           TRIGGER_METHOD.to_owned(),
            input_args:       vec![],
        };

        Ok(SignedTransaction {
            tx_hash: Hash::digest(raw.encode_fixed()?),
            raw,
            signature: Bytes::new(),
        })
    }

    /// Keeps block production above the configured minimal spacing.
    async fn wait_minimal_block_delay(&self, prev: Option<&BlockPair>) {
        let prev_ts = match prev {
            Some(pair) => pair.timestamp(),
            None => return,
        };

        let min_delay = self.config.below_minimal_block_delay.as_nanos() as u64;
        let elapsed = now_nanos().saturating_sub(prev_ts);
        if elapsed < min_delay {
            Delay::new(Duration::from_nanos(min_delay - elapsed)).await;
        }
    }
}

#[async_trait]
impl<P, V> ConsensusContext for ConsensusEngine<P, V>
where
    P: TxPool + 'static,
    V: VirtualMachine + 'static,
{
    async fn request_new_block_proposal(
        &self,
        ctx: Context,
        input: ProposalInput,
    ) -> ProtocolResult<BlockPair> {
        let height = input.current_block_height;
        let prev_ts = input.prev_block.as_ref().map(BlockPair::timestamp).unwrap_or(0);

        self.wait_minimal_block_delay(input.prev_block.as_ref()).await;

        let ordering = self
            .txpool
            .get_transactions_for_ordering(ctx.clone(), OrderingInput {
                block_protocol_version: self.config.protocol_version_max,
                current_block_height:   height,
                prev_block_timestamp:   prev_ts,
                max_transactions:       self.config.max_transactions_per_block,
                max_total_bytes:        self.config.max_block_size_bytes,
            })
            .await?;
        let block_timestamp = ordering.proposed_block_timestamp;

        let pre_order = self
            .vm
            .pre_order_check(ctx.clone(), PreOrderInput {
                block_height:    height,
                block_timestamp,
                transactions:    ordering.transactions.clone(),
            })
            .await?;

        let mut transactions = ordering
            .transactions
            .into_iter()
            .zip(pre_order.statuses)
            .filter_map(|(stx, status)| {
                if status == TransactionStatus::Pending {
                    Some(stx)
                } else {
                    info!(
                        "[consensus]: tx {:?} dropped from proposal: {}",
                        stx.tx_hash, status
                    );
                    None
                }
            })
            .collect::<Vec<_>>();

        if self.config.triggers_enabled {
            transactions.push(self.trigger_transaction(block_timestamp)?);
        }

        let execution = self
            .vm
            .process_transaction_set(ctx, ExecutionInput {
                block_height: height,
                block_timestamp,
                transactions: transactions.clone(),
            })
            .await?;

        let (prev_tx_hash, prev_rx_hash, prev_reference) = match input.prev_block.as_ref() {
            Some(prev) => (
                prev.transactions_block_hash()?,
                prev.results_block_hash()?,
                prev.transactions.header.reference_time,
            ),
            None => (Hash::from_empty(), Hash::from_empty(), 0),
        };

        let mut transactions_block = TransactionsBlock {
            header: TransactionsBlockHeader {
                protocol_version: self.config.protocol_version_max,
                virtual_chain_id: self.config.virtual_chain_id,
                height,
                timestamp: block_timestamp,
                reference_time: std::cmp::max(prev_reference, now_secs()),
                prev_block_hash: prev_tx_hash,
                block_proposer: self.config.node_address,
                transactions_root: Hash::from_empty(),
                metadata_hash: metadata_hash(),
            },
            signed_transactions: transactions,
        };
        transactions_block.header.transactions_root =
            transactions_merkle_root(&transactions_block);

        let results_block = ResultsBlock {
            header:      ResultsBlockHeader {
                height,
                timestamp: block_timestamp,
                prev_block_hash: prev_rx_hash,
                transactions_block_hash: Hash::digest(
                    transactions_block.header.encode_fixed()?,
                ),
                state_diff_root: state_diffs_root(&execution.state_diffs)?,
                receipts_root: receipts_root(&execution.receipts)?,
                num_receipts: execution.receipts.len() as u32,
            },
            receipts:    execution.receipts,
            state_diffs: execution.state_diffs,
            proof:       BlockProof {
                sender:    self.config.node_address,
                signature: Bytes::new(),
            },
        };

        Ok(BlockPair {
            transactions: transactions_block,
            results:      results_block,
        })
    }

    async fn validate_block_pair(
        &self,
        ctx: Context,
        input: ValidationInput,
    ) -> ProtocolResult<()> {
        let vctx = BlockValidationContext {
            config:    &self.config,
            height:    input.current_block_height,
            prev:      input.prev_block.as_ref(),
            pair:      &input.pair,
            now_nanos: now_nanos(),
            now_secs:  now_secs(),
        };

        for validator in block_validators() {
            validator(&vctx)?;
        }

        // ordering re-validation runs last, with the trigger stripped
        let txs = &input.pair.transactions.signed_transactions;
        let ordered = if self.config.triggers_enabled {
            &txs[..txs.len() - 1]
        } else {
            &txs[..]
        };

        self.txpool
            .validate_transactions_for_ordering(ctx, input.current_block_height, ordered)
            .await
    }
}

pub(crate) fn receipts_root(receipts: &[Receipt]) -> ProtocolResult<Hash> {
    let mut hashes = Vec::with_capacity(receipts.len());
    for receipt in receipts {
        hashes.push(Hash::digest(receipt.encode_fixed()?));
    }
    Ok(Merkle::from_hashes(hashes)
        .get_root_hash()
        .unwrap_or_else(Hash::from_empty))
}

pub(crate) fn state_diffs_root(diffs: &[ContractStateDiff]) -> ProtocolResult<Hash> {
    let mut hashes = Vec::with_capacity(diffs.len());
    for diff in diffs {
        hashes.push(Hash::digest(diff.encode_fixed()?));
    }
    Ok(Merkle::from_hashes(hashes)
        .get_root_hash()
        .unwrap_or_else(Hash::from_empty))
}

pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
