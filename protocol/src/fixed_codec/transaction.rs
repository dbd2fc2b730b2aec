use bytes::{Bytes, BytesMut};
use rlp::{Decodable, DecoderError, Encodable, Prototype, Rlp, RlpStream};

use crate::fixed_codec::{FixedCodec, FixedCodecError};
use crate::types::primitive::Hash;
use crate::types::transaction::{RawTransaction, SignedTransaction};
use crate::{impl_default_fixed_codec_for, ProtocolResult};

impl_default_fixed_codec_for!(transaction, [RawTransaction, SignedTransaction]);

impl Encodable for RawTransaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7)
            .append(&self.protocol_version)
            .append(&self.virtual_chain_id)
            .append(&self.timestamp)
            .append(&self.signer.to_vec())
            .append(&self.contract)
            .append(&self.method)
            .append_list::<Vec<u8>, Vec<u8>>(
                &self
                    .input_args
                    .iter()
                    .map(|arg| arg.to_vec())
                    .collect::<Vec<_>>(),
            );
    }
}

impl Decodable for RawTransaction {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(7) => {
                let protocol_version: u32 = r.val_at(0)?;
                let virtual_chain_id: u32 = r.val_at(1)?;
                let timestamp: u64 = r.val_at(2)?;
                let signer = BytesMut::from(r.at(3)?.data()?).freeze();
                let contract: String = r.val_at(4)?;
                let method: String = r.val_at(5)?;
                let input_args: Vec<Vec<u8>> = r.list_at(6)?;

                Ok(RawTransaction {
                    protocol_version,
                    virtual_chain_id,
                    timestamp,
                    signer,
                    contract,
                    method,
                    input_args: input_args.into_iter().map(Bytes::from).collect(),
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for SignedTransaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3)
            .append(&self.raw)
            .append(&self.tx_hash)
            .append(&self.signature.to_vec());
    }
}

impl Decodable for SignedTransaction {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(3) => {
                let raw: RawTransaction = r.val_at(0)?;
                let tx_hash: Hash = r.val_at(1)?;
                let signature = BytesMut::from(r.at(2)?.data()?).freeze();

                Ok(SignedTransaction {
                    raw,
                    tx_hash,
                    signature,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}
