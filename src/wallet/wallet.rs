//! Single-key wallet
//!
//! Each node owns one ECDSA P-256 keypair. The address is the Base58Check
//! encoding of `version ‖ hash160(public_key) ‖ checksum`, so the 20-byte
//! payload doubles as the P2PKH lock script for outputs sent here.

use crate::error::{BlockchainError, Result};
use crate::utils::{
    base58_decode, base58_encode, ecdsa_sign, hash160, new_key_pair, public_key_from_pkcs8,
    sha256_digest,
};
use serde::{Deserialize, Serialize};

pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
pub const VERSION: u8 = 0x00;

#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    /// Rebuild a wallet from a persisted PKCS#8 private key.
    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Wallet> {
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(&self.public_key);
        let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + ADDRESS_CHECK_SUM_LEN);
        payload.push(VERSION);
        payload.extend_from_slice(&pub_key_hash);
        let check_sum = checksum(&payload);
        payload.extend_from_slice(&check_sum);
        base58_encode(&payload)
    }

    pub fn get_public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }

    /// Produce a DER-encoded signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        ecdsa_sign(&self.pkcs8, message)
    }
}

/// hash160 of a public key, the payload locked by a P2PKH output.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    hash160(pub_key)
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(&first_sha);
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Check version byte, length and checksum of a Base58Check address.
pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };
    if payload.len() <= ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }
    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    let version = payload[0];
    if version != VERSION {
        return false;
    }
    let pub_key_hash = &payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN];

    let mut target_vec = vec![version];
    target_vec.extend_from_slice(pub_key_hash);
    let target_checksum = checksum(&target_vec);
    actual_checksum.eq(target_checksum.as_slice())
}

/// Extract the 20-byte public key hash from an address.
pub fn convert_address(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    let payload = base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wallet_address_is_valid() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
    }

    #[test]
    fn test_convert_address_roundtrip() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        let pub_key_hash = convert_address(&address).unwrap();
        assert_eq!(pub_key_hash, hash_pub_key(wallet.get_public_key()));
        assert_eq!(pub_key_hash.len(), 20);
    }

    #[test]
    fn test_validate_address_rejects_garbage() {
        assert!(!validate_address("not-an-address"));
        assert!(!validate_address(""));

        // Flip a character of a valid address to break the checksum.
        let wallet = Wallet::new().unwrap();
        let mut address = wallet.get_address();
        let replacement = if address.ends_with('2') { '3' } else { '2' };
        address.pop();
        address.push(replacement);
        assert!(!validate_address(&address));
    }

    #[test]
    fn test_wallet_restores_from_pkcs8() {
        let wallet = Wallet::new().unwrap();
        let restored = Wallet::from_pkcs8(wallet.get_pkcs8().to_vec()).unwrap();
        assert_eq!(wallet.get_address(), restored.get_address());
    }
}
