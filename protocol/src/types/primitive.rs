use bytes::Bytes;
use hasher::{Hasher, HasherKeccak};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::types::TypesError;
use crate::ProtocolResult;

pub const HASH_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 20;

lazy_static! {
    static ref HASHER_INST: HasherKeccak = HasherKeccak::new();
}

/// 32-byte keccak digest.
#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_LEN]);

/// Merkle roots are plain hashes.
pub type MerkleRoot = Hash;

/// 20-byte node or signer address, the truncated digest of a public key.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Hash {
    pub fn digest(bytes: Bytes) -> Self {
        let out = HASHER_INST.digest(&bytes);

        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&out);
        Self(hash)
    }

    pub fn from_empty() -> Self {
        Self([0u8; HASH_LEN])
    }

    pub fn from_bytes(bytes: Bytes) -> ProtocolResult<Self> {
        if bytes.len() != HASH_LEN {
            return Err(TypesError::LengthMismatch {
                expect: HASH_LEN,
                real:   bytes.len(),
            }
            .into());
        }

        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn from_hex(s: &str) -> ProtocolResult<Self> {
        let bytes = hex::decode(clean_0x(s)).map_err(TypesError::from)?;
        Self::from_bytes(Bytes::from(bytes))
    }

    pub fn as_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash(0x{})", self.as_hex())
    }
}

impl Address {
    /// Derive an address from raw public key bytes.
    pub fn from_pubkey_bytes(pubkey: Bytes) -> Self {
        let hash = Hash::digest(pubkey);
        let bytes = hash.as_bytes();

        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes[HASH_LEN - ADDRESS_LEN..]);
        Self(out)
    }

    pub fn from_empty() -> Self {
        Self([0u8; ADDRESS_LEN])
    }

    pub fn from_bytes(bytes: Bytes) -> ProtocolResult<Self> {
        if bytes.len() != ADDRESS_LEN {
            return Err(TypesError::LengthMismatch {
                expect: ADDRESS_LEN,
                real:   bytes.len(),
            }
            .into());
        }

        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn from_hex(s: &str) -> ProtocolResult<Self> {
        let bytes = hex::decode(clean_0x(s)).map_err(TypesError::from)?;
        Self::from_bytes(Bytes::from(bytes))
    }

    pub fn as_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address(0x{})", self.as_hex())
    }
}

pub fn clean_0x(s: &str) -> &str {
    if s.starts_with("0x") {
        &s[2..]
    } else {
        s
    }
}
