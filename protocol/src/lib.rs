pub mod fixed_codec;
pub mod traits;
pub mod types;

use std::error::Error;

use derive_more::{Constructor, Display};

pub use bytes::{Bytes, BytesMut};

#[derive(Debug, Clone)]
pub enum ProtocolErrorKind {
    // traits
    Consensus,
    Executor,
    Network,
    StateStorage,
    Storage,
    TxPool,

    // codec
    FixedCodec,

    // types
    Types,
}

#[derive(Debug, Constructor, Display)]
#[display(fmt = "[ProtocolError] Kind: {:?} Error: {:?}", kind, error)]
pub struct ProtocolError {
    kind:  ProtocolErrorKind,
    error: Box<dyn Error + Send>,
}

impl ProtocolError {
    pub fn kind(&self) -> &ProtocolErrorKind {
        &self.kind
    }
}

impl Error for ProtocolError {}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
