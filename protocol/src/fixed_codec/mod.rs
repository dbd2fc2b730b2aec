#[macro_use]
mod r#macro;
pub mod block;
pub mod primitive;
pub mod receipt;
#[cfg(test)]
mod tests;
pub mod transaction;

use std::error::Error;

use bytes::Bytes;
use derive_more::{Display, From};

use crate::{ProtocolError, ProtocolErrorKind, ProtocolResult};

/// Consistent serialization trait using rlp-algorithm. Everything persisted
/// to the block log or covered by a signature goes through this codec.
pub trait FixedCodec: Sized {
    fn encode_fixed(&self) -> ProtocolResult<Bytes>;

    fn decode_fixed(bytes: Bytes) -> ProtocolResult<Self>;
}

#[derive(Debug, Display, From)]
pub enum FixedCodecError {
    Decoder(rlp::DecoderError),

    StringUTF8(std::string::FromUtf8Error),

    #[display(fmt = "wrong u8 discriminant")]
    DecodeDiscriminant,
}

impl Error for FixedCodecError {}

impl From<FixedCodecError> for ProtocolError {
    fn from(err: FixedCodecError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::FixedCodec, Box::new(err))
    }
}
