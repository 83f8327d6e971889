//! Blocks
//!
//! The hashed header is exactly 76 bytes:
//! `version(4) ‖ prev_hash(32) ‖ merkle_root(32) ‖ timestamp(4, truncated) ‖ nonce(4)`
//! with all integers big-endian. The block hash is the double SHA-256 of
//! that header, so nothing outside it (transaction bodies aside from the
//! Merkle commitment) affects the id.

use crate::core::merkle::merkle_root;
use crate::core::transaction::Transaction;
use crate::error::Result;
use crate::utils::{current_timestamp, double_sha256};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// Size of the hashed header in bytes.
pub const BLOCK_HEADER_SIZE: usize = 76;

#[derive(Clone, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    version: u32,
    prev_hash: Vec<u8>,
    merkle_root: Vec<u8>,
    timestamp: i64,
    nonce: u32,
    transactions: Vec<Transaction>,
    hash: Vec<u8>,
}

impl Block {
    /// New block stamped with the current time, nonce 0.
    pub fn new(prev_hash: Vec<u8>, transactions: Vec<Transaction>, version: u32) -> Result<Block> {
        let timestamp = current_timestamp()?;
        Ok(Block::with_timestamp(
            prev_hash,
            transactions,
            version,
            timestamp,
        ))
    }

    /// New block with an explicit timestamp (genesis and tests).
    pub fn with_timestamp(
        prev_hash: Vec<u8>,
        transactions: Vec<Transaction>,
        version: u32,
        timestamp: i64,
    ) -> Block {
        let txids: Vec<Vec<u8>> = transactions.iter().map(|tx| tx.get_id().to_vec()).collect();
        let merkle_root = merkle_root(&txids);
        let mut block = Block {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce: 0,
            transactions,
            hash: vec![],
        };
        block.hash = block.compute_hash();
        block
    }

    /// The 76-byte hashed header.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BLOCK_HEADER_SIZE);
        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(&self.prev_hash);
        bytes.extend_from_slice(&self.merkle_root);
        bytes.extend_from_slice(&(self.timestamp as u32).to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes
    }

    pub fn compute_hash(&self) -> Vec<u8> {
        double_sha256(&self.header_bytes())
    }

    /// Update the nonce and refresh the cached hash.
    pub fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
        self.hash = self.compute_hash();
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_prev_hash(&self) -> &[u8] {
        &self.prev_hash
    }

    pub fn get_prev_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.prev_hash)
    }

    pub fn get_merkle_root(&self) -> &[u8] {
        &self.merkle_root
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> u32 {
        self.nonce
    }

    pub fn get_hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get_transactions_mut(&mut self) -> &mut [Transaction] {
        &mut self.transactions
    }

    /// Header plus the canonical size of every transaction.
    pub fn size(&self) -> usize {
        BLOCK_HEADER_SIZE
            + self
                .transactions
                .iter()
                .map(|tx| tx.serialized_size())
                .sum::<usize>()
    }

    /// Recompute the Merkle root from the transactions and compare.
    pub fn verify_merkle_root(&self) -> bool {
        let txids: Vec<Vec<u8>> = self
            .transactions
            .iter()
            .map(|tx| tx.get_id().to_vec())
            .collect();
        merkle_root(&txids) == self.merkle_root
    }
}
