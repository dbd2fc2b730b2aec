use bytes::Bytes;
use rand::random;

use crate::fixed_codec::FixedCodec;
use crate::types::{
    Address, BlockPair, BlockProof, ContractStateDiff, Event, ExecutionResult, Hash,
    RawTransaction, Receipt, ResultsBlock, ResultsBlockHeader, SignedTransaction, StateRecord,
    TransactionsBlock, TransactionsBlockHeader,
};

fn rand_bytes(len: usize) -> Bytes {
    Bytes::from((0..len).map(|_| random::<u8>()).collect::<Vec<_>>())
}

fn mock_hash() -> Hash {
    Hash::digest(rand_bytes(10))
}

fn mock_signed_tx() -> SignedTransaction {
    let raw = RawTransaction {
        protocol_version: 1,
        virtual_chain_id: 42,
        timestamp:        1_000_000,
        signer:           rand_bytes(33),
        contract:         "BenchmarkToken".to_owned(),
        method:           "transfer".to_owned(),
        input_args:       vec![rand_bytes(20), rand_bytes(8)],
    };

    SignedTransaction {
        tx_hash: Hash::digest(raw.encode_fixed().unwrap()),
        raw,
        signature: rand_bytes(64),
    }
}

fn mock_receipt(tx_hash: Hash) -> Receipt {
    Receipt {
        tx_hash,
        execution_result: ExecutionResult::Success,
        output_args: vec![rand_bytes(8)],
        events: vec![Event {
            contract: "BenchmarkToken".to_owned(),
            name:     "Transferred".to_owned(),
            data:     rand_bytes(16),
        }],
    }
}

fn mock_block_pair(height: u64) -> BlockPair {
    let stx = mock_signed_tx();
    let receipt = mock_receipt(stx.tx_hash);

    let tx_header = TransactionsBlockHeader {
        protocol_version:  1,
        virtual_chain_id:  42,
        height,
        timestamp:         height * 1_000_000_000,
        reference_time:    height,
        prev_block_hash:   mock_hash(),
        block_proposer:    Address::from_pubkey_bytes(rand_bytes(33)),
        transactions_root: mock_hash(),
        metadata_hash:     mock_hash(),
    };

    let transactions = TransactionsBlock {
        header:              tx_header,
        signed_transactions: vec![stx],
    };

    let rx_header = ResultsBlockHeader {
        height,
        timestamp: height * 1_000_000_000,
        prev_block_hash: mock_hash(),
        transactions_block_hash: Hash::digest(transactions.header.encode_fixed().unwrap()),
        state_diff_root: mock_hash(),
        receipts_root: mock_hash(),
        num_receipts: 1,
    };

    BlockPair {
        transactions,
        results: ResultsBlock {
            header:      rx_header,
            receipts:    vec![receipt],
            state_diffs: vec![ContractStateDiff {
                contract: "BenchmarkToken".to_owned(),
                records:  vec![StateRecord {
                    key:   rand_bytes(20),
                    value: rand_bytes(8),
                }],
            }],
            proof:       BlockProof {
                sender:    Address::from_pubkey_bytes(rand_bytes(33)),
                signature: rand_bytes(64),
            },
        },
    }
}

#[test]
fn test_signed_tx_fixed_codec() {
    let stx = mock_signed_tx();
    let decoded = SignedTransaction::decode_fixed(stx.encode_fixed().unwrap()).unwrap();
    assert_eq!(stx, decoded);
}

#[test]
fn test_block_pair_fixed_codec() {
    let pair = mock_block_pair(7);
    let decoded = BlockPair::decode_fixed(pair.encode_fixed().unwrap()).unwrap();
    assert_eq!(pair, decoded);
}

#[test]
fn test_empty_block_pair_fixed_codec() {
    let mut pair = mock_block_pair(1);
    pair.transactions.signed_transactions.clear();
    pair.results.receipts.clear();
    pair.results.state_diffs.clear();
    pair.results.header.num_receipts = 0;

    let decoded = BlockPair::decode_fixed(pair.encode_fixed().unwrap()).unwrap();
    assert_eq!(pair, decoded);
}

#[test]
fn test_header_hash_is_stable() {
    let pair = mock_block_pair(3);
    assert_eq!(
        pair.transactions_block_hash().unwrap(),
        pair.transactions_block_hash().unwrap()
    );
    assert_ne!(
        pair.transactions_block_hash().unwrap(),
        pair.results_block_hash().unwrap()
    );
}
