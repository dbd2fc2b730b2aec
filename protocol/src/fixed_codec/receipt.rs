use bytes::{Bytes, BytesMut};
use rlp::{Decodable, DecoderError, Encodable, Prototype, Rlp, RlpStream};

use crate::fixed_codec::{FixedCodec, FixedCodecError};
use crate::types::primitive::Hash;
use crate::types::receipt::{ContractStateDiff, Event, ExecutionResult, Receipt, StateRecord};
use crate::{impl_default_fixed_codec_for, ProtocolResult};

impl_default_fixed_codec_for!(receipt, [Receipt, Event, StateRecord, ContractStateDiff]);

fn execution_result_to_u8(result: ExecutionResult) -> u8 {
    match result {
        ExecutionResult::Success => 0,
        ExecutionResult::ErrorSmartContract => 1,
        ExecutionResult::ErrorInput => 2,
        ExecutionResult::ErrorUnexpected => 3,
    }
}

fn execution_result_from_u8(value: u8) -> Result<ExecutionResult, DecoderError> {
    match value {
        0 => Ok(ExecutionResult::Success),
        1 => Ok(ExecutionResult::ErrorSmartContract),
        2 => Ok(ExecutionResult::ErrorInput),
        3 => Ok(ExecutionResult::ErrorUnexpected),
        _ => Err(DecoderError::Custom("wrong u8 of execution result")),
    }
}

impl Encodable for Event {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3)
            .append(&self.contract)
            .append(&self.name)
            .append(&self.data.to_vec());
    }
}

impl Decodable for Event {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(3) => {
                let contract: String = r.val_at(0)?;
                let name: String = r.val_at(1)?;
                let data = BytesMut::from(r.at(2)?.data()?).freeze();

                Ok(Event {
                    contract,
                    name,
                    data,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for Receipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4)
            .append(&self.tx_hash)
            .append(&execution_result_to_u8(self.execution_result))
            .append_list::<Vec<u8>, Vec<u8>>(
                &self
                    .output_args
                    .iter()
                    .map(|arg| arg.to_vec())
                    .collect::<Vec<_>>(),
            )
            .append_list(&self.events);
    }
}

impl Decodable for Receipt {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(4) => {
                let tx_hash: Hash = r.val_at(0)?;
                let execution_result = execution_result_from_u8(r.val_at(1)?)?;
                let output_args: Vec<Vec<u8>> = r.list_at(2)?;
                let events: Vec<Event> = r.list_at(3)?;

                Ok(Receipt {
                    tx_hash,
                    execution_result,
                    output_args: output_args.into_iter().map(Bytes::from).collect(),
                    events,
                })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for StateRecord {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2)
            .append(&self.key.to_vec())
            .append(&self.value.to_vec());
    }
}

impl Decodable for StateRecord {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(2) => {
                let key = BytesMut::from(r.at(0)?.data()?).freeze();
                let value = BytesMut::from(r.at(1)?.data()?).freeze();

                Ok(StateRecord { key, value })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}

impl Encodable for ContractStateDiff {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2)
            .append(&self.contract)
            .append_list(&self.records);
    }
}

impl Decodable for ContractStateDiff {
    fn decode(r: &Rlp) -> Result<Self, DecoderError> {
        match r.prototype()? {
            Prototype::List(2) => {
                let contract: String = r.val_at(0)?;
                let records: Vec<StateRecord> = r.list_at(1)?;

                Ok(ContractStateDiff { contract, records })
            }
            _ => Err(DecoderError::RlpInconsistentLengthAndData),
        }
    }
}
