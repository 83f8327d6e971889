//! Utility functions and helpers
//!
//! Cryptographic primitives, encodings, and serialization glue used
//! throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, double_sha256, ecdsa_sign, ecdsa_verify,
    hash160, new_key_pair, public_key_from_pkcs8, ripemd160_digest, sha256_digest,
};

pub use serialization::{deserialize, serialize};
