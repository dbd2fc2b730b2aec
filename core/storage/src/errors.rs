use std::error::Error;

use derive_more::Display;

use protocol::{ProtocolError, ProtocolErrorKind};

#[derive(Debug, Display)]
pub enum StorageError {
    #[display(fmt = "write of block {} out of order, current top is {}", height, top)]
    OutOfOrder { height: u64, top: u64 },

    #[display(
        fmt = "writing tip offset {} disagrees with index offset {}, concurrent writer suspected",
        found,
        expected
    )]
    IndexMismatch { expected: u64, found: u64 },

    #[display(fmt = "index missing offset for block height {}", height)]
    MissingOffset { height: u64 },

    #[display(fmt = "block {} missing from the log", height)]
    MissingBlock { height: u64 },

    #[display(fmt = "committer {} degraded at height {}", name, height)]
    CommitterDegraded { name: String, height: u64 },

    #[display(fmt = "sync chunk starts at {}, expected {}", got, expected)]
    ChunkGap { expected: u64, got: u64 },

    #[display(fmt = "sync chunk rejected: {}", _0)]
    BadChunk(String),

    #[display(fmt = "{:?}", _0)]
    Io(std::io::Error),
}

impl Error for StorageError {}

impl From<StorageError> for ProtocolError {
    fn from(err: StorageError) -> ProtocolError {
        ProtocolError::new(ProtocolErrorKind::Storage, Box::new(err))
    }
}
