use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::types::primitive::Hash;

/// Contract and method of the synthetic trigger transaction closing a block
/// when triggers are enabled.
pub const TRIGGER_CONTRACT: &str = "Triggers";
pub const TRIGGER_METHOD: &str = "trigger";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RawTransaction {
    pub protocol_version: u32,
    pub virtual_chain_id: u32,
    /// Client-side creation time in nanoseconds.
    pub timestamp:        u64,
    /// Raw public key of the signer. Empty for trigger transactions.
    pub signer:           Bytes,
    pub contract:         String,
    pub method:           String,
    pub input_args:       Vec<Bytes>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw:       RawTransaction,
    pub tx_hash:   Hash,
    pub signature: Bytes,
}

impl SignedTransaction {
    pub fn is_trigger(&self) -> bool {
        self.raw.contract == TRIGGER_CONTRACT && self.raw.method == TRIGGER_METHOD
    }
}

/// Stable public-facing codes for the transaction lifecycle.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum TransactionStatus {
    #[display(fmt = "committed")]
    Committed,
    #[display(fmt = "pending")]
    Pending,
    #[display(fmt = "rejected: global pre order")]
    RejectedGlobalPreOrder,
    #[display(fmt = "duplicate: already committed")]
    DuplicateAlreadyCommitted,
    #[display(fmt = "rejected: signature mismatch")]
    RejectedSignatureMismatch,
    #[display(fmt = "rejected: unsupported version")]
    RejectedUnsupportedVersion,
    #[display(fmt = "rejected: timestamp window exceeded")]
    RejectedTimestampWindowExceeded,
    #[display(fmt = "internal error")]
    InternalError,
}
