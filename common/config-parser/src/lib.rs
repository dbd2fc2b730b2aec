//! Loads the node configuration from a toml file or any reader.

mod err;
mod types;

pub use err::ParseError;
pub use types::{ConsensusAlgo, FederationNode, NodeConfig};

use std::fs;
use std::io;
use std::path::Path;

use serde::de;

/// Parse a config from reader.
pub fn parse_reader<R: io::Read, T: de::DeserializeOwned>(r: &mut R) -> Result<T, ParseError> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    Ok(toml::from_slice(&buf)?)
}

/// Parse a config from file.
pub fn parse<T: de::DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, ParseError> {
    let mut f = fs::File::open(path)?;
    parse_reader(&mut f)
}
