
use std::path::PathBuf;

use bytes::Bytes;
use rand::random;

use protocol::fixed_codec::FixedCodec;
use protocol::types::{
    Address, BlockPair, BlockProof, Hash, RawTransaction, Receipt, ResultsBlock,
    ResultsBlockHeader, SignedTransaction, TransactionsBlock, TransactionsBlockHeader,
};

macro_rules! exec {
    ($func: expr) => {
        futures::executor::block_on(async { $func.await.unwrap() })
    };
}

pub(crate) use exec;

const NANOS_PER_MINUTE: u64 = 60 * 1_000_000_000;

pub fn tmp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("calyx-storage-test-{}", random::<u64>()))
}

pub fn rand_bytes(len: usize) -> Bytes {
    Bytes::from((0..len).map(|_| random::<u8>()).collect::<Vec<_>>())
}

pub fn mock_signed_tx() -> SignedTransaction {
    let raw = RawTransaction {
        protocol_version: 1,
        virtual_chain_id: 42,
        timestamp:        random::<u32>() as u64,
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

/// A valid pair at `height` chained onto `prev`, one minute per height so
/// every block lands in its own timestamp bucket.
pub fn mock_block_pair(height: u64, prev: Option<&BlockPair>, tx_count: usize) -> BlockPair {
    let timestamp = height * NANOS_PER_MINUTE + 1;
    let (prev_tx_hash, prev_rx_hash) = match prev {
        Some(pair) => (
            pair.transactions_block_hash().unwrap(),
            pair.results_block_hash().unwrap(),
        ),
        None => (Hash::from_empty(), Hash::from_empty()),
    };

    let signed_transactions = (0..tx_count).map(|_| mock_signed_tx()).collect::<Vec<_>>();
    let receipts = signed_transactions
        .iter()
        .map(|stx| Receipt {
            tx_hash:          stx.tx_hash,
            execution_result: protocol::types::ExecutionResult::Success,
            output_args:      vec![],
            events:           vec![],
        })
        .collect::<Vec<_>>();

    let transactions = TransactionsBlock {
        header: TransactionsBlockHeader {
            protocol_version: 1,
            virtual_chain_id: 42,
            height,
            timestamp,
            reference_time: height,
            prev_block_hash: prev_tx_hash,
            block_proposer: Address::from_pubkey_bytes(rand_bytes(33)),
            transactions_root: Hash::from_empty(),
            metadata_hash: Hash::from_empty(),
        },
        signed_transactions,
    };

    let results = ResultsBlock {
        header:      ResultsBlockHeader {
            height,
            timestamp,
            prev_block_hash: prev_rx_hash,
            transactions_block_hash: Hash::digest(transactions.header.encode_fixed().unwrap()),
            state_diff_root: Hash::from_empty(),
            receipts_root: Hash::from_empty(),
            num_receipts: receipts.len() as u32,
        },
        receipts,
        state_diffs: vec![],
        proof:       BlockProof {
            sender:    Address::from_pubkey_bytes(rand_bytes(33)),
            signature: rand_bytes(64),
        },
    };

    BlockPair {
        transactions,
        results,
    }
}

pub fn mock_chain(len: u64, tx_count: usize) -> Vec<BlockPair> {
    let mut chain: Vec<BlockPair> = Vec::with_capacity(len as usize);
    for height in 1..=len {
        let pair = mock_block_pair(height, chain.last(), tx_count);
        chain.push(pair);
    }
    chain
}
