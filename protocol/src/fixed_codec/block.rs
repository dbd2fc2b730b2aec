use bytes::{Bytes, BytesMut};
use rlp::{Decodable, DecoderError, Encodable, Prototype, Rlp, RlpStream};

use crate::fixed_codec::{FixedCodec, FixedCodecError};
use crate::types::block::{
    BlockPair, BlockProof, ResultsBlock, ResultsBlockHeader, TransactionsBlock,
    TransactionsBlockHeader,
};
use crate::types::primitive::{Address, Hash};
use crate::types::receipt::{ContractStateDiff, Receipt};
use crate::types::transaction::SignedTransaction;
use crate::{impl_default_fixed_codec_for, ProtocolResult};

impl_default_fixed_codec_for!(block, [
    TransactionsBlockHeader,
    TransactionsBlock,
    ResultsBlockHeader,
    ResultsBlock,
    BlockProof,
    BlockPair
]);

impl Encodable for TransactionsBlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(9)
            .append(&self.protocol_version)
            .append(&self.virtual_chain_id)
            .append(&self.height)
            .append(&self.timestamp)
            .append(&self.reference_time)
            .append(&self.prev_block_hash)
            .append(&self.block_proposer)
            .append(&self.transactions_root)
            .append(&self.metadata_hash);
    }
}

impl Decodable for TransactionsBlockHeader {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(9) => {
                let protocol_version: u32 = r.val_at(0)?;
                let virtual_chain_id: u32 = r.val_at(1)?;
                let height: u64 = r.val_at(2)?;
                let timestamp: u64 = r.val_at(3)?;
                let reference_time: u64 = r.val_at(4)?;
                let prev_block_hash: Hash = r.val_at(5)?;
                let block_proposer: Address = r.val_at(6)?;
                let transactions_root: Hash = r.val_at(7)?;
                let metadata_hash: Hash = r.val_at(8)?;

                Ok(TransactionsBlockHeader {
                    protocol_version,
                    virtual_chain_id,
                    height,
                    timestamp,
                    reference_time,
                    prev_block_hash,
                    block_proposer,
                    transactions_root,
                    metadata_hash,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for TransactionsBlock {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2)
            .append(&self.header)
            .append_list(&self.signed_transactions);
    }
}

impl Decodable for TransactionsBlock {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(2) => {
                let header: TransactionsBlockHeader = r.val_at(0)?;
                let signed_transactions: Vec<SignedTransaction> = r.list_at(1)?;

                Ok(TransactionsBlock {
                    header,
                    signed_transactions,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for ResultsBlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7)
            .append(&self.height)
            .append(&self.timestamp)
            .append(&self.prev_block_hash)
            .append(&self.transactions_block_hash)
            .append(&self.state_diff_root)
            .append(&self.receipts_root)
            .append(&self.num_receipts);
    }
}

impl Decodable for ResultsBlockHeader {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(7) => {
                let height: u64 = r.val_at(0)?;
                let timestamp: u64 = r.val_at(1)?;
                let prev_block_hash: Hash = r.val_at(2)?;
                let transactions_block_hash: Hash = r.val_at(3)?;
                let state_diff_root: Hash = r.val_at(4)?;
                let receipts_root: Hash = r.val_at(5)?;
                let num_receipts: u32 = r.val_at(6)?;

                Ok(ResultsBlockHeader {
                    height,
                    timestamp,
                    prev_block_hash,
                    transactions_block_hash,
                    state_diff_root,
                    receipts_root,
                    num_receipts,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for BlockProof {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2)
            .append(&self.sender)
            .append(&self.signature.to_vec());
    }
}

impl Decodable for BlockProof {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(2) => {
                let sender: Address = r.val_at(0)?;
                let signature = BytesMut::from(r.at(1)?.data()?).freeze();

                Ok(BlockProof { sender, signature })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for ResultsBlock {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4)
            .append(&self.header)
            .append_list(&self.receipts)
            .append_list(&self.state_diffs)
            .append(&self.proof);
    }
}

impl Decodable for ResultsBlock {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(4) => {
                let header: ResultsBlockHeader = r.val_at(0)?;
                let receipts: Vec<Receipt> = r.list_at(1)?;
                let state_diffs: Vec<ContractStateDiff> = r.list_at(2)?;
                let proof: BlockProof = r.val_at(3)?;

                Ok(ResultsBlock {
                    header,
                    receipts,
                    state_diffs,
                    proof,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for BlockPair {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2)
            .append(&self.transactions)
            .append(&self.results);
    }
}

impl Decodable for BlockPair {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(2) => {
                let transactions: TransactionsBlock = r.val_at(0)?;
                let results: ResultsBlock = r.val_at(1)?;

                Ok(BlockPair {
                    transactions,
                    results,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}
