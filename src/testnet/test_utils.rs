//! Test utilities for chain testing

use crate::core::blockchain::Blockchain;
use crate::core::proof_of_work::validate_proof_of_work;
use crate::error::{BlockchainError, Result};
use crate::storage::mempool::Mempool;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// Create a test node with temporary storage
pub fn create_test_node() -> Result<(Blockchain, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let db_path = temp_dir.path().join("test_chain");
    let blockchain = Blockchain::open(db_path.to_str().ok_or_else(|| {
        BlockchainError::Io("Temp path is not valid UTF-8".to_string())
    })?)?;
    Ok((blockchain, temp_dir))
}

/// Create multiple isolated test nodes
pub fn create_test_network(node_count: usize) -> Result<Vec<(Blockchain, TempDir)>> {
    (0..node_count).map(|_| create_test_node()).collect()
}

/// Mine `count` empty blocks at difficulty 1
pub fn mine_empty_blocks(blockchain: &Blockchain, count: usize) -> Result<()> {
    let mempool = Mempool::new();
    for _ in 0..count {
        blockchain.mine_new_block(&mempool, 1, 0)?;
    }
    Ok(())
}

/// Walk the chain checking linkage, hash integrity, Merkle roots and
/// (past genesis) proof of work at the easiest difficulty.
pub fn validate_chain_integrity(blockchain: &Blockchain) -> bool {
    let blocks = blockchain.all_blocks();
    let mut prev_hash: Option<Vec<u8>> = None;

    for (height, block) in blocks.iter().enumerate() {
        if let Some(prev) = &prev_hash {
            if block.get_prev_hash() != prev.as_slice() {
                return false;
            }
        }
        if block.get_hash() != block.compute_hash().as_slice() {
            return false;
        }
        if !block.verify_merkle_root() {
            return false;
        }
        if height > 0 && !validate_proof_of_work(block, 1) {
            return false;
        }
        prev_hash = Some(block.get_hash().to_vec());
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_node() {
        let (blockchain, _temp_dir) = create_test_node().unwrap();
        assert_eq!(blockchain.chain_height(), 1);
    }

    #[test]
    fn test_create_test_network_is_isolated() {
        let nodes = create_test_network(3).unwrap();
        assert_eq!(nodes.len(), 3);

        // Distinct wallets, identical genesis.
        let genesis_hash = nodes[0].0.latest_block().unwrap().get_hash().to_vec();
        for (blockchain, _) in &nodes[1..] {
            assert_eq!(
                blockchain.latest_block().unwrap().get_hash(),
                genesis_hash.as_slice()
            );
            assert_ne!(blockchain.address(), nodes[0].0.address());
        }
    }

    #[test]
    fn test_mined_chain_passes_integrity() {
        let (blockchain, _temp_dir) = create_test_node().unwrap();
        mine_empty_blocks(&blockchain, 2).unwrap();
        assert_eq!(blockchain.chain_height(), 3);
        assert!(validate_chain_integrity(&blockchain));
    }
}
