pub mod block;
pub mod primitive;
pub mod receipt;
pub mod transaction;

use std::error::Error;

use derive_more::{Display, From};

use crate::{ProtocolError, ProtocolErrorKind};

pub use block::{
    BlockPair, BlockProof, ResultsBlock, ResultsBlockHeader, TransactionsBlock,
    TransactionsBlockHeader,
};
pub use primitive::{Address, Hash, MerkleRoot};
pub use receipt::{ContractStateDiff, Event, ExecutionResult, Receipt, StateRecord};
pub use transaction::{
    RawTransaction, SignedTransaction, TransactionStatus, TRIGGER_CONTRACT, TRIGGER_METHOD,
};

#[derive(Debug, Display, From)]
pub enum TypesError {
    #[display(fmt = "expect length {}, get {}", expect, real)]
    LengthMismatch { expect: usize, real: usize },

    #[display(fmt = "{:?}", error)]
    FromHex { error: hex::FromHexError },
}

impl Error for TypesError {}

impl From<TypesError> for ProtocolError {
    fn from(error: TypesError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Types, Box::new(error))
    }
}
