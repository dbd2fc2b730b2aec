use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::executor::block_on;
use futures::join;
use futures_timer::Delay;
use parking_lot::Mutex;
use rand::random;

use common_sync::{shutdown_pair, BlockTracker, CancelContext};
use protocol::fixed_codec::FixedCodec;
use protocol::traits::{Context, OrderingInput, TxPool, TxPoolAdapter};
use protocol::types::{
    Address, BlockPair, BlockProof, Hash, RawTransaction, ResultsBlock, ResultsBlockHeader,
    SignedTransaction, TransactionStatus, TransactionsBlock, TransactionsBlockHeader,
};
use protocol::ProtocolResult;

use crate::adapter::batch_payload;
use crate::{
    now_nanos, ForwardedTransactions, ForwardedTxsHandler, ImplTxPool, PoolError, TxPoolConfig,
};

#[derive(Default)]
struct MockAdapter {
    forwarded:        Mutex<Vec<SignedTransaction>>,
    reject_tx_sig:    bool,
    reject_batch_sig: bool,
}

#[async_trait]
impl TxPoolAdapter for MockAdapter {
    async fn forward_transactions(
        &self,
        _ctx: Context,
        stxs: Vec<SignedTransaction>,
    ) -> ProtocolResult<()> {
        self.forwarded.lock().extend(stxs);
        Ok(())
    }

    fn verify_batch_signature(
        &self,
        sender: Address,
        _signer_pubkey: Bytes,
        _payload: Bytes,
        _signature: Bytes,
    ) -> ProtocolResult<()> {
        if self.reject_batch_sig {
            return Err(PoolError::BatchSignature { sender }.into());
        }
        Ok(())
    }

    fn verify_transaction_signature(&self, stx: &SignedTransaction) -> ProtocolResult<()> {
        if self.reject_tx_sig {
            return Err(PoolError::CheckSig {
                tx_hash: stx.tx_hash,
            }
            .into());
        }
        Ok(())
    }
}

fn test_config() -> TxPoolConfig {
    TxPoolConfig {
        pool_size:                     100,
        virtual_chain_id:              42,
        protocol_version_min:          1,
        protocol_version_max:          2,
        tx_expiration_window:          Duration::from_secs(1800),
        committed_retention:           Duration::from_secs(1800),
        minimum_transactions_in_block: 1,
        empty_block_delay:             Duration::from_millis(0),
        future_height_deadline:        Duration::from_millis(200),
    }
}

fn new_pool(config: TxPoolConfig) -> Arc<ImplTxPool<MockAdapter>> {
    Arc::new(ImplTxPool::new(
        config,
        MockAdapter::default(),
        BlockTracker::new(0),
    ))
}

fn mock_tx_with_version(protocol_version: u32) -> SignedTransaction {
    let raw = RawTransaction {
        protocol_version,
        virtual_chain_id: 42,
        timestamp: now_nanos(),
        signer: Bytes::from((0..33).map(|_| random::<u8>()).collect::<Vec<_>>()),
        contract: "BenchmarkToken".to_owned(),
        method: "transfer".to_owned(),
        input_args: vec![],
    };

    SignedTransaction {
        tx_hash: Hash::digest(raw.encode_fixed().unwrap()),
        raw,
        signature: Bytes::from(vec![7u8; 64]),
    }
}

fn mock_tx() -> SignedTransaction {
    mock_tx_with_version(1)
}

fn mock_committed_pair(height: u64, stxs: Vec<SignedTransaction>) -> BlockPair {
    let transactions = TransactionsBlock {
        header:              TransactionsBlockHeader {
            protocol_version:  1,
            virtual_chain_id:  42,
            height,
            timestamp:         height * 1_000,
            reference_time:    height,
            prev_block_hash:   Hash::from_empty(),
            block_proposer:    Address::from_empty(),
            transactions_root: Hash::from_empty(),
            metadata_hash:     Hash::from_empty(),
        },
        signed_transactions: stxs,
    };

    BlockPair {
        results: ResultsBlock {
            header:      ResultsBlockHeader {
                height,
                timestamp: height * 1_000,
                prev_block_hash: Hash::from_empty(),
                transactions_block_hash: Hash::from_empty(),
                state_diff_root: Hash::from_empty(),
                receipts_root: Hash::from_empty(),
                num_receipts: transactions.signed_transactions.len() as u32,
            },
            receipts:    vec![],
            state_diffs: vec![],
            proof:       BlockProof {
                sender:    Address::from_empty(),
                signature: Bytes::new(),
            },
        },
        transactions,
    }
}

fn ordering_input(height: u64, max: usize) -> OrderingInput {
    OrderingInput {
        block_protocol_version: 2,
        current_block_height:   height,
        prev_block_timestamp:   0,
        max_transactions:       max,
        max_total_bytes:        1024 * 1024,
    }
}

#[test]
fn test_first_block_close_fast() {
    let pool = new_pool(test_config());

    let out = block_on(pool.get_transactions_for_ordering(Context::new(), ordering_input(1, 1)))
        .unwrap();

    assert!(out.transactions.is_empty());
    assert_ne!(out.proposed_block_timestamp, 0);
}

#[test]
fn test_future_height_times_out_when_nothing_commits() {
    let pool = new_pool(test_config());

    let result =
        block_on(pool.get_transactions_for_ordering(Context::new(), ordering_input(3, 1)));

    assert!(result.is_err());
}

#[test]
fn test_future_height_resolves_when_blocks_commit() {
    let mut config = test_config();
    config.future_height_deadline = Duration::from_secs(5);
    let pool = new_pool(config);

    block_on(async {
        let ordering = async {
            pool.get_transactions_for_ordering(Context::new(), ordering_input(3, 1))
                .await
        };
        let commits = async {
            Delay::new(Duration::from_millis(20)).await;
            pool.on_block_committed(&mock_committed_pair(1, vec![])).unwrap();
            pool.on_block_committed(&mock_committed_pair(2, vec![])).unwrap();
        };

        let (out, _) = join!(ordering, commits);
        assert!(out.is_ok());
    });
}

#[test]
fn test_cancelled_wait_returns_empty_without_error() {
    let pool = new_pool(test_config());

    let (handle, token) = shutdown_pair();
    handle.shutdown();
    let ctx = Context::new().with_shutdown(token);

    let out = block_on(pool.get_transactions_for_ordering(ctx, ordering_input(2, 1))).unwrap();
    assert!(out.transactions.is_empty());
}

#[test]
fn test_waits_for_transactions_when_under_minimum() {
    let mut config = test_config();
    config.empty_block_delay = Duration::from_secs(10);
    let pool = new_pool(config);

    block_on(async {
        let ordering = async {
            pool.get_transactions_for_ordering(Context::new(), ordering_input(1, 10))
                .await
        };
        let arrival = async {
            Delay::new(Duration::from_millis(20)).await;
            pool.add_new_transaction(Context::new(), mock_tx()).await.unwrap();
        };

        let (out, _) = join!(ordering, arrival);
        let out = out.unwrap();
        assert_eq!(out.transactions.len(), 1);
        assert_ne!(out.proposed_block_timestamp, 0);
    });
}

#[test]
fn test_cancelled_empty_block_wait_returns_empty() {
    let mut config = test_config();
    config.empty_block_delay = Duration::from_secs(10);
    let pool = new_pool(config);
    pool.on_block_committed(&mock_committed_pair(1, vec![])).unwrap();

    let (handle, token) = shutdown_pair();
    handle.shutdown();
    let ctx = Context::new().with_shutdown(token);

    let out = block_on(pool.get_transactions_for_ordering(ctx, ordering_input(2, 1))).unwrap();
    assert!(out.transactions.is_empty());
}

#[test]
fn test_selection_is_first_seen_order_and_filters_version_ceiling() {
    let pool = new_pool(test_config());

    let first = mock_tx();
    let too_new = mock_tx_with_version(2);
    let second = mock_tx();

    block_on(async {
        pool.add_new_transaction(Context::new(), first.clone()).await.unwrap();
        pool.add_new_transaction(Context::new(), too_new.clone()).await.unwrap();
        pool.add_new_transaction(Context::new(), second.clone()).await.unwrap();
    });

    let mut input = ordering_input(1, 10);
    input.block_protocol_version = 1;
    let out = block_on(pool.get_transactions_for_ordering(Context::new(), input)).unwrap();

    let hashes = out.transactions.iter().map(|stx| stx.tx_hash).collect::<Vec<_>>();
    assert_eq!(hashes, vec![first.tx_hash, second.tx_hash]);

    // the filtered transaction stays pending for a newer block
    assert_eq!(pool.pending_len(), 3);
}

#[test]
fn test_admission_rejections() {
    let pool = new_pool(test_config());

    // unsupported version
    let stx = mock_tx_with_version(9);
    let err = block_on(pool.add_new_transaction(Context::new(), stx)).unwrap_err();
    assert!(err.to_string().contains("UnsupportedVersion"));

    // wrong virtual chain
    let mut stx = mock_tx();
    stx.raw.virtual_chain_id = 7;
    assert!(block_on(pool.add_new_transaction(Context::new(), stx)).is_err());

    // timestamp outside the admission window
    let mut stx = mock_tx();
    stx.raw.timestamp = 1;
    assert!(block_on(pool.add_new_transaction(Context::new(), stx)).is_err());

    // duplicate pending
    let stx = mock_tx();
    block_on(pool.add_new_transaction(Context::new(), stx.clone())).unwrap();
    assert!(block_on(pool.add_new_transaction(Context::new(), stx)).is_err());
}

#[test]
fn test_rejected_signature_maps_to_status() {
    let pool = Arc::new(ImplTxPool::new(
        test_config(),
        MockAdapter {
            reject_tx_sig: true,
            ..MockAdapter::default()
        },
        BlockTracker::new(0),
    ));

    let err = block_on(pool.add_new_transaction(Context::new(), mock_tx())).unwrap_err();
    assert!(err.to_string().contains("CheckSig"));
}

#[test]
fn test_duplicate_of_committed_tx_is_reported() {
    let pool = new_pool(test_config());
    let stx = mock_tx();

    block_on(pool.add_new_transaction(Context::new(), stx.clone())).unwrap();
    pool.on_block_committed(&mock_committed_pair(1, vec![stx.clone()])).unwrap();

    assert_eq!(pool.pending_len(), 0);
    assert_eq!(
        block_on(pool.get_transaction_status(Context::new(), stx.tx_hash)).unwrap(),
        TransactionStatus::Committed
    );

    // client resubmits the same transaction
    let err = block_on(pool.add_new_transaction(Context::new(), stx)).unwrap_err();
    assert!(err.to_string().contains("CommittedTx"));
}

#[test]
fn test_commit_out_of_order_is_a_programming_error() {
    let pool = new_pool(test_config());

    assert!(pool.on_block_committed(&mock_committed_pair(3, vec![])).is_err());
    pool.on_block_committed(&mock_committed_pair(1, vec![])).unwrap();
    assert!(pool.on_block_committed(&mock_committed_pair(1, vec![])).is_err());
}

#[test]
fn test_client_txs_are_forwarded_network_txs_are_not() {
    let pool = new_pool(test_config());
    let stx = mock_tx();

    block_on(pool.add_new_transaction(Context::new(), stx.clone())).unwrap();
    assert_eq!(pool.adapter().forwarded.lock().len(), 1);

    let batch = vec![mock_tx(), mock_tx()];
    block_on(pool.handle_forwarded_transactions(
        Context::new(),
        Address::from_empty(),
        batch,
    ))
    .unwrap();

    // forwarded transactions were admitted but not forwarded again
    assert_eq!(pool.pending_len(), 3);
    assert_eq!(pool.adapter().forwarded.lock().len(), 1);
}

#[test]
fn test_forwarded_batch_signature_gate() {
    let good_pool = new_pool(test_config());
    let bad_pool = Arc::new(ImplTxPool::new(
        test_config(),
        MockAdapter {
            reject_batch_sig: true,
            ..MockAdapter::default()
        },
        BlockTracker::new(0),
    ));

    let batch = vec![mock_tx()];
    let msg = ForwardedTransactions {
        sender:        Address::from_empty(),
        signer_pubkey: Bytes::new(),
        signature:     Bytes::new(),
        batch:         batch.clone(),
    };

    use protocol::traits::MessageHandler;

    let handler = ForwardedTxsHandler::new(Arc::clone(&good_pool));
    block_on(handler.process(Context::new(), msg.clone())).unwrap();
    assert_eq!(good_pool.pending_len(), 1);

    let handler = ForwardedTxsHandler::new(Arc::clone(&bad_pool));
    assert!(block_on(handler.process(Context::new(), msg)).is_err());
    assert_eq!(bad_pool.pending_len(), 0);

    let _ = batch_payload(&batch);
}

#[test]
fn test_validate_ordering_rejects_duplicates_and_committed() {
    let pool = new_pool(test_config());

    let stx = mock_tx();
    assert!(block_on(pool.validate_transactions_for_ordering(
        Context::new(),
        1,
        &[stx.clone(), stx.clone()]
    ))
    .is_err());

    pool.on_block_committed(&mock_committed_pair(1, vec![stx.clone()])).unwrap();
    assert!(block_on(pool.validate_transactions_for_ordering(Context::new(), 2, &[stx])).is_err());

    assert!(block_on(pool.validate_transactions_for_ordering(
        Context::new(),
        2,
        &[mock_tx(), mock_tx()]
    ))
    .is_ok());
}
