mod engine;
mod leader;
mod message;
mod non_leader;
#[cfg(test)]
mod tests;
mod validate;

pub use engine::{ConsensusEngine, EngineConfig};
pub use leader::{BenchmarkLeader, LeaderCommand};
pub use message::{
    committed_status_payload, CommitHandler, CommitMessage, CommittedHandler, CommittedMessage,
    END_GOSSIP_BENCHMARK_COMMIT, END_GOSSIP_BENCHMARK_COMMITTED,
};
pub use non_leader::BenchmarkConsensus;

use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use derive_more::Display;

use protocol::types::{Address, Hash};
use protocol::{Bytes, ProtocolError, ProtocolErrorKind};

/// A federation member known to every participant.
#[derive(Clone, Debug)]
pub struct FederationNode {
    pub address: Address,
    pub pubkey:  Bytes,
}

#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    pub node_address:   Address,
    pub node_pubkey:    Bytes,
    pub node_privkey:   Bytes,
    pub federation:     Vec<FederationNode>,
    pub leader_address: Address,
    pub retry_interval: Duration,
}

impl ConsensusConfig {
    pub fn is_leader(&self) -> bool {
        self.node_address == self.leader_address
    }

    pub fn federation_pubkeys(&self) -> HashMap<Address, Bytes> {
        self.federation
            .iter()
            .map(|node| (node.address, node.pubkey.clone()))
            .collect()
    }
}

/// `⌈(2f + 1)⌉` with `f = ⌊(N − 1) / 3⌋` for federation size `N`.
pub fn quorum_size(federation_size: usize) -> usize {
    let f = (federation_size.saturating_sub(1)) / 3;
    2 * f + 1
}

#[derive(Debug, Display)]
pub enum ConsensusError {
    #[display(fmt = "block protocol version {} outside [{}, {}]", actual, min, max)]
    MismatchedProtocolVersion { min: u32, max: u32, actual: u32 },

    #[display(fmt = "block declares virtual chain {}, ours is {}", actual, expected)]
    MismatchedVirtualChain { expected: u32, actual: u32 },

    #[display(fmt = "block height {}, expected {}", actual, expected)]
    MismatchedHeight { expected: u64, actual: u64 },

    #[display(fmt = "previous hash pointer does not reference the stored prior block")]
    MismatchedPrevHash,

    #[display(fmt = "block proposer {:?} is not the epoch leader", actual)]
    MismatchedProposer { actual: Address },

    #[display(fmt = "invalid block timestamp: {}", _0)]
    InvalidTimestamp(String),

    #[display(fmt = "invalid reference time: {}", _0)]
    InvalidReferenceTime(String),

    #[display(fmt = "transactions merkle root does not match")]
    MismatchedTransactionsRoot,

    #[display(fmt = "metadata hash does not match")]
    MismatchedMetadataHash,

    #[display(fmt = "receipts do not match the transaction sequence")]
    MismatchedReceipts,

    #[display(fmt = "triggers enabled but the trigger transaction is missing")]
    TriggerMissing,

    #[display(fmt = "trigger transaction is malformed")]
    TriggerInvalid,

    #[display(fmt = "trigger transaction found before the last position")]
    TriggerNotLast,

    #[display(fmt = "triggers disabled but a trigger transaction is present")]
    TriggerDisabled,

    #[display(fmt = "block proof rejected: {}", _0)]
    InvalidProof(String),

    #[display(fmt = "ack from {:?} rejected: {}", sender, reason)]
    InvalidAck { sender: Address, reason: String },

    #[display(fmt = "{:?} is not a federation member", _0)]
    NotFederationMember(Address),

    #[display(fmt = "crypto failure on {:?}", _0)]
    Crypto(Hash),

    #[display(fmt = "{}", _0)]
    Other(String),
}

impl Error for ConsensusError {}

impl From<ConsensusError> for ProtocolError {
    fn from(err: ConsensusError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Consensus, Box::new(err))
    }
}
