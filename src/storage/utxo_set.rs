//! In-memory UTXO set
//!
//! Authoritative index of unspent outputs keyed by `(txid, vout)`. The
//! chain manager owns the only mutable instance and touches it exclusively
//! inside its write lock, so the set itself carries no synchronization.

use crate::core::block::Block;
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct OutPoint {
    pub txid: Vec<u8>,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Vec<u8>, vout: u32) -> OutPoint {
        OutPoint { txid, vout }
    }

    pub fn txid_hex(&self) -> String {
        HEXLOWER.encode(&self.txid)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Utxo {
    pub value: u64,
    pub address: String,
    pub pk_script: Vec<u8>,
    pub block_height: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, Utxo>,
}

impl UtxoSet {
    pub fn new() -> UtxoSet {
        UtxoSet {
            entries: HashMap::new(),
        }
    }

    /// Replay a whole chain from an empty set.
    pub fn from_blocks(blocks: &[Block]) -> Result<UtxoSet> {
        let mut set = UtxoSet::new();
        for (height, block) in blocks.iter().enumerate() {
            set.apply_block(block, height)?;
        }
        Ok(set)
    }

    /// Fold one block into the set: spent outpoints leave, new outputs
    /// enter. Transactions apply in block order, so an output created
    /// earlier in the block is spendable later in it.
    pub fn apply_block(&mut self, block: &Block, height: usize) -> Result<()> {
        for tx in block.get_transactions() {
            for input in tx.get_vin().iter().filter(|input| !input.is_coinbase()) {
                let outpoint = OutPoint::new(input.get_prev_txid().to_vec(), input.get_vout());
                if self.entries.remove(&outpoint).is_none() {
                    return Err(BlockchainError::InvalidBlock(format!(
                        "Block spends missing UTXO {}:{}",
                        outpoint.txid_hex(),
                        outpoint.vout
                    )));
                }
            }
            for (vout, output) in tx.get_vout().iter().enumerate() {
                let outpoint = OutPoint::new(tx.get_id().to_vec(), vout as u32);
                self.entries.insert(
                    outpoint,
                    Utxo {
                        value: output.get_value(),
                        address: output.get_address().to_string(),
                        pk_script: output.get_pk_script().to_vec(),
                        block_height: height,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.entries
            .values()
            .filter(|utxo| utxo.address == address)
            .map(|utxo| utxo.value)
            .sum()
    }

    /// Greedy largest-first selection covering `amount`. Returns the
    /// chosen entries and their total, or None when the address cannot
    /// cover it.
    pub fn select_utxos(&self, address: &str, amount: u64) -> Option<(Vec<(OutPoint, Utxo)>, u64)> {
        let mut candidates: Vec<(OutPoint, Utxo)> = self
            .entries
            .iter()
            .filter(|(_, utxo)| utxo.address == address)
            .map(|(outpoint, utxo)| (outpoint.clone(), utxo.clone()))
            .collect();
        candidates.sort_by(|a, b| b.1.value.cmp(&a.1.value));

        let mut selected = Vec::new();
        let mut total = 0u64;
        for (outpoint, utxo) in candidates {
            if total >= amount {
                break;
            }
            total += utxo.value;
            selected.push((outpoint, utxo));
        }

        if total >= amount {
            Some((selected, total))
        } else {
            None
        }
    }

    pub fn all(&self) -> Vec<(OutPoint, Utxo)> {
        self.entries
            .iter()
            .map(|(outpoint, utxo)| (outpoint.clone(), utxo.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
