//! Persistent block store
//!
//! One sled database per node data directory with four trees:
//!
//! - `blocks`: block hash → serialized block
//! - `transactions`: txid → serialized transaction
//! - `index`: height (8-byte big-endian) → block hash
//! - `meta`: `chain_height`, `best_block_hash`, `private_key`
//!
//! `save_block` commits the block, its height index entry and the chain
//! metadata in a single sled transaction, so a crash never leaves the
//! metadata pointing at a block that was not written. `swap_chain` does
//! the same for whole-chain replacement: the candidate chain and the
//! stale-entry removals commit together or not at all.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use log::debug;
use sled::transaction::TransactionError;
use sled::{Db, Transactional};
use std::collections::HashSet;

const BLOCKS_TREE: &str = "blocks";
const TRANSACTIONS_TREE: &str = "transactions";
const INDEX_TREE: &str = "index";
const META_TREE: &str = "meta";

const CHAIN_HEIGHT_KEY: &str = "chain_height";
const BEST_BLOCK_HASH_KEY: &str = "best_block_hash";
const PRIVATE_KEY_KEY: &str = "private_key";

pub struct Storage {
    db: Db,
}

impl Storage {
    pub fn open(path: &str) -> Result<Storage> {
        let db = sled::open(path)?;
        debug!("Opened block store at {path}");
        Ok(Storage { db })
    }

    /// Persist a block at `height` and advance the chain metadata
    /// atomically. Transaction bodies are written first; they are
    /// content-addressed, so a retry cannot corrupt them.
    pub fn save_block(&self, block: &Block, height: usize) -> Result<()> {
        let transactions_tree = self.db.open_tree(TRANSACTIONS_TREE)?;
        for tx in block.get_transactions() {
            transactions_tree.insert(tx.get_id(), serialize(tx)?)?;
        }

        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        let index_tree = self.db.open_tree(INDEX_TREE)?;
        let meta_tree = self.db.open_tree(META_TREE)?;

        let block_bytes = serialize(block)?;
        let block_hash = block.get_hash().to_vec();
        let height_key = (height as u64).to_be_bytes();

        (&blocks_tree, &index_tree, &meta_tree)
            .transaction(|(blocks, index, meta)| {
                blocks.insert(block_hash.as_slice(), block_bytes.clone())?;
                index.insert(&height_key, block_hash.as_slice())?;
                meta.insert(CHAIN_HEIGHT_KEY, &height_key)?;
                meta.insert(BEST_BLOCK_HASH_KEY, block_hash.as_slice())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| {
                BlockchainError::Database(format!("Failed to persist block: {e:?}"))
            })?;

        self.db.flush()?;
        Ok(())
    }

    pub fn get_block(&self, hash: &[u8]) -> Result<Option<Block>> {
        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        match blocks_tree.get(hash)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_block_by_height(&self, height: usize) -> Result<Option<Block>> {
        let index_tree = self.db.open_tree(INDEX_TREE)?;
        match index_tree.get((height as u64).to_be_bytes())? {
            Some(hash) => self.get_block(&hash),
            None => Ok(None),
        }
    }

    pub fn get_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        let transactions_tree = self.db.open_tree(TRANSACTIONS_TREE)?;
        match transactions_tree.get(txid)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Height of the persisted tip, if any chain exists yet.
    pub fn get_chain_height(&self) -> Result<Option<usize>> {
        let meta_tree = self.db.open_tree(META_TREE)?;
        match meta_tree.get(CHAIN_HEIGHT_KEY)? {
            Some(bytes) => {
                let mut height_bytes = [0u8; 8];
                if bytes.len() != 8 {
                    return Err(BlockchainError::Database(
                        "Corrupt chain height entry".to_string(),
                    ));
                }
                height_bytes.copy_from_slice(&bytes);
                Ok(Some(u64::from_be_bytes(height_bytes) as usize))
            }
            None => Ok(None),
        }
    }

    pub fn get_best_block_hash(&self) -> Result<Option<Vec<u8>>> {
        let meta_tree = self.db.open_tree(META_TREE)?;
        Ok(meta_tree.get(BEST_BLOCK_HASH_KEY)?.map(|v| v.to_vec()))
    }

    pub fn save_private_key(&self, pkcs8: &[u8]) -> Result<()> {
        let meta_tree = self.db.open_tree(META_TREE)?;
        meta_tree.insert(PRIVATE_KEY_KEY, pkcs8)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn load_private_key(&self) -> Result<Option<Vec<u8>>> {
        let meta_tree = self.db.open_tree(META_TREE)?;
        Ok(meta_tree.get(PRIVATE_KEY_KEY)?.map(|v| v.to_vec()))
    }

    /// All persisted blocks in height order.
    pub fn load_blockchain(&self) -> Result<Vec<Block>> {
        let index_tree = self.db.open_tree(INDEX_TREE)?;
        let mut blocks = Vec::new();
        for entry in index_tree.iter() {
            let (_, hash) = entry?;
            match self.get_block(&hash)? {
                Some(block) => blocks.push(block),
                None => {
                    return Err(BlockchainError::Database(
                        "Height index references a missing block".to_string(),
                    ))
                }
            }
        }
        Ok(blocks)
    }

    /// Replace the persisted chain with `new_blocks`, removing whatever
    /// `old_blocks` entries the new chain does not carry. Everything
    /// commits in one sled transaction, so a failure partway leaves the
    /// previously persisted chain intact.
    pub fn swap_chain(&self, new_blocks: &[Block], old_blocks: &[Block]) -> Result<()> {
        let tip = new_blocks.last().ok_or_else(|| {
            BlockchainError::Database("Cannot persist an empty chain".to_string())
        })?;

        let mut kept_hashes: HashSet<Vec<u8>> = HashSet::with_capacity(new_blocks.len());
        let mut kept_txids: HashSet<Vec<u8>> = HashSet::new();
        let mut block_entries = Vec::with_capacity(new_blocks.len());
        let mut tx_entries = Vec::new();
        for (height, block) in new_blocks.iter().enumerate() {
            kept_hashes.insert(block.get_hash().to_vec());
            block_entries.push((
                block.get_hash().to_vec(),
                serialize(block)?,
                (height as u64).to_be_bytes(),
            ));
            for tx in block.get_transactions() {
                kept_txids.insert(tx.get_id().to_vec());
                tx_entries.push((tx.get_id().to_vec(), serialize(tx)?));
            }
        }

        let stale_hashes: Vec<Vec<u8>> = old_blocks
            .iter()
            .map(|block| block.get_hash().to_vec())
            .filter(|hash| !kept_hashes.contains(hash))
            .collect();
        let stale_txids: Vec<Vec<u8>> = old_blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .map(|tx| tx.get_id().to_vec())
            .filter(|txid| !kept_txids.contains(txid))
            .collect();
        let stale_heights: Vec<[u8; 8]> = (new_blocks.len()..old_blocks.len())
            .map(|height| (height as u64).to_be_bytes())
            .collect();

        let tip_hash = tip.get_hash().to_vec();
        let tip_height_key = ((new_blocks.len() - 1) as u64).to_be_bytes();

        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        let index_tree = self.db.open_tree(INDEX_TREE)?;
        let transactions_tree = self.db.open_tree(TRANSACTIONS_TREE)?;
        let meta_tree = self.db.open_tree(META_TREE)?;

        (&blocks_tree, &index_tree, &transactions_tree, &meta_tree)
            .transaction(|(blocks, index, transactions, meta)| {
                for (hash, bytes, height_key) in &block_entries {
                    blocks.insert(hash.as_slice(), bytes.clone())?;
                    index.insert(height_key, hash.as_slice())?;
                }
                for (txid, bytes) in &tx_entries {
                    transactions.insert(txid.as_slice(), bytes.clone())?;
                }
                for hash in &stale_hashes {
                    blocks.remove(hash.as_slice())?;
                }
                for txid in &stale_txids {
                    transactions.remove(txid.as_slice())?;
                }
                for height_key in &stale_heights {
                    index.remove(height_key)?;
                }
                meta.insert(CHAIN_HEIGHT_KEY, &tip_height_key)?;
                meta.insert(BEST_BLOCK_HASH_KEY, tip_hash.as_slice())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| {
                BlockchainError::Database(format!("Failed to swap chains: {e:?}"))
            })?;

        self.db.flush()?;
        Ok(())
    }
}
