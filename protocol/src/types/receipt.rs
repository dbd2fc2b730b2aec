use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::primitive::Hash;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionResult {
    Success,
    ErrorSmartContract,
    ErrorInput,
    ErrorUnexpected,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub contract: String,
    pub name:     String,
    pub data:     Bytes,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash:          Hash,
    pub execution_result: ExecutionResult,
    pub output_args:      Vec<Bytes>,
    pub events:           Vec<Event>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StateRecord {
    pub key:   Bytes,
    pub value: Bytes,
}

/// All writes a block's execution performed under one contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContractStateDiff {
    pub contract: String,
    pub records:  Vec<StateRecord>,
}
