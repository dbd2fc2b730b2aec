pub use ophelia::HashValue;
pub use ophelia::{
    Crypto, Error, PrivateKey, PublicKey, Signature, ToPublicKey, UncompressedPublicKey,
};
pub use ophelia_secp256k1::{
    Secp256k1, Secp256k1PrivateKey, Secp256k1PublicKey, Secp256k1Signature,
};
