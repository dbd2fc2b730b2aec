mod non_leader;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::OsRng;

use common_crypto::{
    Crypto, PrivateKey, PublicKey, Secp256k1, Secp256k1PrivateKey, Signature, ToPublicKey,
};
use protocol::traits::{
    Context, ExecutionInput, ExecutionOutput, Gossip, MessageCodec, OrderingInput, OrderingOutput,
    PreOrderInput, PreOrderOutput, Priority, QueryInput, QueryOutput, TxPool, VirtualMachine,
};
use protocol::types::{
    Address, Hash, RawTransaction, Receipt, SignedTransaction, TransactionStatus,
};
use protocol::ProtocolResult;

use crate::engine::{now_nanos, EngineConfig};
use crate::message::committed_status_payload;
use crate::{ConsensusConfig, ConsensusError, FederationNode};

pub const FEDERATION_SIZE: usize = 4;
pub const RETRY_INTERVAL: Duration = Duration::from_millis(50);

pub struct TestMember {
    pub privkey: Secp256k1PrivateKey,
    pub pubkey:  Bytes,
    pub address: Address,
}

impl TestMember {
    pub fn generate() -> Self {
        let privkey = Secp256k1PrivateKey::generate(&mut OsRng);
        let pubkey = Bytes::from(privkey.pub_key().to_bytes().to_vec());
        let address = Address::from_pubkey_bytes(pubkey.clone());

        TestMember {
            privkey,
            pubkey,
            address,
        }
    }

    pub fn sign_ack(&self, last_committed_height: u64) -> Bytes {
        let payload = Hash::digest(committed_status_payload(last_committed_height));
        Bytes::from(
            Secp256k1::sign_message(&payload.as_bytes(), &self.privkey.to_bytes())
                .unwrap()
                .to_bytes()
                .to_vec(),
        )
    }
}

/// Member 0 is the fixed leader.
pub fn mock_federation() -> Vec<TestMember> {
    (0..FEDERATION_SIZE).map(|_| TestMember::generate()).collect()
}

pub fn consensus_config(federation: &[TestMember], node: usize) -> ConsensusConfig {
    ConsensusConfig {
        node_address:   federation[node].address,
        node_pubkey:    federation[node].pubkey.clone(),
        node_privkey:   Bytes::from(federation[node].privkey.to_bytes().to_vec()),
        federation:     federation
            .iter()
            .map(|member| FederationNode {
                address: member.address,
                pubkey:  member.pubkey.clone(),
            })
            .collect(),
        leader_address: federation[0].address,
        retry_interval: RETRY_INTERVAL,
    }
}

pub fn engine_config(federation: &[TestMember], node: usize, triggers: bool) -> EngineConfig {
    EngineConfig {
        virtual_chain_id:           42,
        protocol_version_min:       1,
        protocol_version_max:       2,
        leader_address:             federation[0].address,
        node_address:               federation[node].address,
        triggers_enabled:           triggers,
        allowed_timestamp_jitter:   Duration::from_secs(60),
        max_transactions_per_block: 100,
        max_block_size_bytes:       1024 * 1024,
        below_minimal_block_delay:  Duration::from_millis(0),
    }
}

#[derive(Debug, Clone)]
pub struct SentGossip {
    pub end:     String,
    pub peers:   Option<Vec<Bytes>>,
    pub payload: Bytes,
}

#[derive(Default)]
pub struct MockGossip {
    pub sent: Mutex<Vec<SentGossip>>,
}

impl MockGossip {
    pub fn count_on(&self, end: &str) -> usize {
        self.sent.lock().iter().filter(|msg| msg.end == end).count()
    }

    pub async fn decode_last_on<M: MessageCodec>(&self, end: &str) -> Option<M> {
        let payload = self
            .sent
            .lock()
            .iter()
            .rev()
            .find(|msg| msg.end == end)
            .map(|msg| msg.payload.clone())?;

        M::decode(payload).await.ok()
    }
}

#[async_trait]
impl Gossip for MockGossip {
    async fn broadcast<M>(
        &self,
        _cx: Context,
        end: &str,
        mut msg: M,
        _p: Priority,
    ) -> ProtocolResult<()>
    where
        M: MessageCodec,
    {
        let payload = msg.encode().await?;
        self.sent.lock().push(SentGossip {
            end:     end.to_owned(),
            peers:   None,
            payload,
        });
        Ok(())
    }

    async fn multicast<'a, M, P>(
        &self,
        _cx: Context,
        end: &str,
        peer_ids: P,
        mut msg: M,
        _p: Priority,
    ) -> ProtocolResult<()>
    where
        M: MessageCodec,
        P: AsRef<[Bytes]> + Send + 'a,
    {
        let payload = msg.encode().await?;
        self.sent.lock().push(SentGossip {
            end:     end.to_owned(),
            peers:   Some(peer_ids.as_ref().to_vec()),
            payload,
        });
        Ok(())
    }
}

/// Hands out a configured batch once, then empty batches.
pub struct MockTxPool {
    pub batch:               Mutex<Vec<SignedTransaction>>,
    pub ordering_validated:  AtomicUsize,
    pub reject_ordering:     AtomicBool,
}

impl MockTxPool {
    pub fn with_batch(batch: Vec<SignedTransaction>) -> Self {
        MockTxPool {
            batch:              Mutex::new(batch),
            ordering_validated: AtomicUsize::new(0),
            reject_ordering:    AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TxPool for MockTxPool {
    async fn add_new_transaction(
        &self,
        _ctx: Context,
        _stx: SignedTransaction,
    ) -> ProtocolResult<()> {
        Ok(())
    }

    async fn handle_forwarded_transactions(
        &self,
        _ctx: Context,
        _sender: Address,
        _stxs: Vec<SignedTransaction>,
    ) -> ProtocolResult<()> {
        Ok(())
    }

    async fn get_transactions_for_ordering(
        &self,
        _ctx: Context,
        input: OrderingInput,
    ) -> ProtocolResult<OrderingOutput> {
        Ok(OrderingOutput {
            transactions:             self.batch.lock().drain(..).collect(),
            proposed_block_timestamp: std::cmp::max(
                now_nanos(),
                input.prev_block_timestamp + 1,
            ),
        })
    }

    async fn validate_transactions_for_ordering(
        &self,
        _ctx: Context,
        _block_height: u64,
        _stxs: &[SignedTransaction],
    ) -> ProtocolResult<()> {
        self.ordering_validated.fetch_add(1, Ordering::SeqCst);
        if self.reject_ordering.load(Ordering::SeqCst) {
            return Err(ConsensusError::Other("ordering rejected".to_owned()).into());
        }
        Ok(())
    }

    async fn get_transaction_status(
        &self,
        _ctx: Context,
        _tx_hash: Hash,
    ) -> ProtocolResult<TransactionStatus> {
        Ok(TransactionStatus::Pending)
    }
}

/// Echoes a success receipt per transaction, no state diffs.
#[derive(Default)]
pub struct MockVm;

#[async_trait]
impl VirtualMachine for MockVm {
    async fn process_transaction_set(
        &self,
        _ctx: Context,
        input: ExecutionInput,
    ) -> ProtocolResult<ExecutionOutput> {
        let receipts = input
            .transactions
            .iter()
            .map(|stx| Receipt {
                tx_hash:          stx.tx_hash,
                execution_result: protocol::types::ExecutionResult::Success,
                output_args:      vec![],
                events:           vec![],
            })
            .collect();

        Ok(ExecutionOutput {
            receipts,
            state_diffs: vec![],
        })
    }

    async fn pre_order_check(
        &self,
        _ctx: Context,
        input: PreOrderInput,
    ) -> ProtocolResult<PreOrderOutput> {
        Ok(PreOrderOutput {
            statuses: vec![TransactionStatus::Pending; input.transactions.len()],
        })
    }

    async fn process_query(
        &self,
        _ctx: Context,
        _input: QueryInput,
    ) -> ProtocolResult<QueryOutput> {
        Ok(QueryOutput {
            execution_result: protocol::types::ExecutionResult::Success,
            output_args:      vec![],
            reference_height: 0,
        })
    }
}

pub fn mock_client_tx() -> SignedTransaction {
    use protocol::fixed_codec::FixedCodec;

    let raw = RawTransaction {
        protocol_version: 1,
        virtual_chain_id: 42,
        timestamp:        now_nanos(),
        signer:           Bytes::from(vec![9u8; 33]),
        contract:         "BenchmarkToken".to_owned(),
        method:           "transfer".to_owned(),
        input_args:       vec![],
    };

    SignedTransaction {
        tx_hash: Hash::digest(raw.encode_fixed().unwrap()),
        raw,
        signature: Bytes::from(vec![1u8; 64]),
    }
}

#[test]
fn test_quorum_size() {
    assert_eq!(crate::quorum_size(1), 1);
    assert_eq!(crate::quorum_size(4), 3);
    assert_eq!(crate::quorum_size(5), 3);
    assert_eq!(crate::quorum_size(7), 5);
    assert_eq!(crate::quorum_size(10), 7);
}
