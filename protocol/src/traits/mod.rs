mod consensus;
mod executor;
mod network;
mod storage;
mod txpool;

pub use creep::{Cloneable, Context};

pub use consensus::{Consensus, ConsensusContext, ProposalInput, ValidationInput};
pub use executor::{
    ExecutionInput, ExecutionOutput, PreOrderInput, PreOrderOutput, ProcessorType, QueryInput,
    QueryOutput, StateStorage, VirtualMachine,
};
pub use network::{Gossip, MessageCodec, MessageHandler, Priority};
pub use storage::{BlockPersistence, BlockStorage, Committer, ScanCursor};
pub use txpool::{OrderingInput, OrderingOutput, TxPool, TxPoolAdapter};
