//! Merkle tree over transaction ids
//!
//! Nodes combine as `double_sha256(left ‖ right)` with the last node
//! duplicated on odd levels. A single-transaction list hashes once more,
//! so its root is `double_sha256(txid)` rather than the txid itself.

use crate::error::{BlockchainError, Result};
use crate::utils::double_sha256;
use serde::{Deserialize, Serialize};

/// One sibling on an inclusion path. `is_right` says whether the sibling
/// sits to the right of the running hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ProofElement {
    pub hash: Vec<u8>,
    pub is_right: bool,
}

/// Merkle root of a list of txids. An empty list maps to 32 zero bytes.
pub fn merkle_root(txids: &[Vec<u8>]) -> Vec<u8> {
    if txids.is_empty() {
        return vec![0u8; 32];
    }
    if txids.len() == 1 {
        return double_sha256(&txids[0]);
    }

    let mut level: Vec<Vec<u8>> = txids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1].clone();
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    level.remove(0)
}

/// Inclusion path for the txid at `index`.
pub fn merkle_path(txids: &[Vec<u8>], index: usize) -> Result<Vec<ProofElement>> {
    if index >= txids.len() {
        return Err(BlockchainError::InvalidBlock(format!(
            "Merkle path index {index} out of range for {} transactions",
            txids.len()
        )));
    }
    if txids.len() == 1 {
        return Ok(vec![]);
    }

    let mut path = Vec::new();
    let mut level: Vec<Vec<u8>> = txids.to_vec();
    let mut position = index;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1].clone();
            level.push(last);
        }

        let sibling = if position % 2 == 0 {
            ProofElement {
                hash: level[position + 1].clone(),
                is_right: true,
            }
        } else {
            ProofElement {
                hash: level[position - 1].clone(),
                is_right: false,
            }
        };
        path.push(sibling);

        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
        position /= 2;
    }

    Ok(path)
}

/// Fold a txid up an inclusion path and compare against the root.
pub fn verify_merkle_path(txid: &[u8], path: &[ProofElement], root: &[u8]) -> bool {
    if path.is_empty() {
        return double_sha256(txid) == root;
    }

    let mut current = txid.to_vec();
    for element in path {
        current = if element.is_right {
            hash_pair(&current, &element.hash)
        } else {
            hash_pair(&element.hash, &current)
        };
    }
    current == root
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    double_sha256(&combined)
}
