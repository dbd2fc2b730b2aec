use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::fixed_codec::FixedCodec;
use crate::types::primitive::{Address, Hash, MerkleRoot};
use crate::types::receipt::{ContractStateDiff, Receipt};
use crate::types::transaction::SignedTransaction;
use crate::ProtocolResult;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TransactionsBlockHeader {
    pub protocol_version:  u32,
    pub virtual_chain_id:  u32,
    pub height:            u64,
    /// Block creation time in nanoseconds, strictly monotonic in height.
    pub timestamp:         u64,
    /// External anchor time in seconds, monotonic but not strictly.
    pub reference_time:    u64,
    pub prev_block_hash:   Hash,
    pub block_proposer:    Address,
    pub transactions_root: MerkleRoot,
    pub metadata_hash:     Hash,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TransactionsBlock {
    pub header:              TransactionsBlockHeader,
    pub signed_transactions: Vec<SignedTransaction>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResultsBlockHeader {
    pub height:                  u64,
    pub timestamp:               u64,
    pub prev_block_hash:         Hash,
    /// Hash of the paired transactions block header.
    pub transactions_block_hash: Hash,
    pub state_diff_root:         MerkleRoot,
    pub receipts_root:           MerkleRoot,
    pub num_receipts:            u32,
}

/// Consensus-algorithm-specific signature envelope over both block headers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockProof {
    pub sender:    Address,
    pub signature: Bytes,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResultsBlock {
    pub header:      ResultsBlockHeader,
    pub receipts:    Vec<Receipt>,
    pub state_diffs: Vec<ContractStateDiff>,
    pub proof:       BlockProof,
}

/// The atomic unit committed by consensus: a transactions block and its
/// paired results block at the same height.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockPair {
    pub transactions: TransactionsBlock,
    pub results:      ResultsBlock,
}

impl BlockPair {
    pub fn height(&self) -> u64 {
        self.transactions.header.height
    }

    pub fn timestamp(&self) -> u64 {
        self.transactions.header.timestamp
    }

    pub fn transactions_block_hash(&self) -> ProtocolResult<Hash> {
        Ok(Hash::digest(self.transactions.header.encode_fixed()?))
    }

    pub fn results_block_hash(&self) -> ProtocolResult<Hash> {
        Ok(Hash::digest(self.results.header.encode_fixed()?))
    }

    /// The canonical bytes a block proof signs: both header hashes.
    pub fn proof_payload(&self) -> ProtocolResult<Bytes> {
        let tx_hash = self.transactions_block_hash()?;
        let rx_hash = self.results_block_hash()?;

        let mut payload = Vec::with_capacity(64);
        payload.extend_from_slice(&tx_hash.as_bytes());
        payload.extend_from_slice(&rx_hash.as_bytes());
        Ok(Bytes::from(payload))
    }
}
