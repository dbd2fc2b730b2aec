pub mod contracts;
mod sdk;
mod state;
#[cfg(test)]
mod tests;
mod vm;

pub use sdk::{CallEnv, ContractResponse, PermissionScope, Processor, SdkHandler, StateReader};
pub use state::{StateStorageCommitter, VersionedStateStorage};
pub use vm::{ImplVirtualMachine, NativeProcessor};

use std::error::Error;

use derive_more::Display;

use protocol::{ProtocolError, ProtocolErrorKind};

#[derive(Debug, Display)]
pub enum ExecutorError {
    #[display(fmt = "state commit out of order, expected {}, got {}", expected, got)]
    OutOfOrderCommit { expected: u64, got: u64 },

    #[display(fmt = "height {} not committed within the query grace timeout", height)]
    QueryGraceTimeout { height: u64 },

    #[display(
        fmt = "height {} is {} ahead of committed {}, beyond the grace distance",
        height,
        distance,
        committed
    )]
    BeyondGraceDistance {
        height:    u64,
        committed: u64,
        distance:  u64,
    },

    #[display(fmt = "no processor registered for contract {}", _0)]
    UnknownContract(String),

    #[display(fmt = "sdk call denied in read-only scope: {}", _0)]
    PermissionDenied(String),
}

impl Error for ExecutorError {}

impl From<ExecutorError> for ProtocolError {
    fn from(err: ExecutorError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Executor, Box::new(err))
    }
}
