//! Chain manager
//!
//! Owns the in-memory chain, the UTXO set derived from it, the persistent
//! store and the node wallet. Every ledger mutation (accepting a block,
//! swapping in a longer chain) happens inside one coarse write lock, so a
//! reader always observes a consistent (blocks, UTXO set) pair.
//!
//! Acceptance of a block requires, in order: it extends the current tip
//! (or is the genesis block on an empty chain), its stored hash and Merkle
//! root survive recomputation, no outpoint is spent twice across its
//! transactions, and every non-coinbase transaction validates against the
//! current UTXO set. Persistence happens before the in-memory append; a
//! storage failure leaves memory untouched.

use crate::core::block::Block;
use crate::core::genesis::{genesis_block, is_genesis_block};
use crate::core::proof_of_work::{adjust_difficulty, mine};
use crate::core::transaction::{TXInput, TXOutput, Transaction};
use crate::core::validator::TransactionValidator;
use crate::error::{BlockchainError, Result};
use crate::storage::mempool::Mempool;
use crate::storage::store::Storage;
use crate::storage::utxo_set::{OutPoint, Utxo, UtxoSet};
use crate::utils::current_timestamp;
use crate::wallet::Wallet;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Coinbase subsidy per mined block, before fees.
pub const BLOCK_REWARD: u64 = 5_000_000_000;

/// Change at or below this folds into the fee instead of creating an
/// output.
pub const DUST_LIMIT: u64 = 546;

/// Header version stamped on newly mined blocks.
pub const BLOCK_VERSION: u32 = 1;

/// Upper bound on mempool transactions pulled into one block.
pub const MAX_BLOCK_TRANSACTIONS: usize = 100;

struct ChainState {
    blocks: Vec<Block>,
    utxo_set: UtxoSet,
}

#[derive(Clone)]
pub struct Blockchain {
    state: Arc<RwLock<ChainState>>,
    storage: Arc<Storage>,
    wallet: Arc<Wallet>,
}

impl Blockchain {
    /// Open (or bootstrap) the chain under `data_dir`. A fresh directory
    /// gets a new persisted wallet key and the genesis block; an existing
    /// one reloads both and replays the chain into the UTXO set.
    pub fn open(data_dir: &str) -> Result<Blockchain> {
        let storage = Storage::open(data_dir)?;

        let wallet = match storage.load_private_key()? {
            Some(pkcs8) => Wallet::from_pkcs8(pkcs8)?,
            None => {
                let wallet = Wallet::new()?;
                storage.save_private_key(wallet.get_pkcs8())?;
                info!("Generated node key, address {}", wallet.get_address());
                wallet
            }
        };

        let mut blocks = storage.load_blockchain()?;
        if blocks.is_empty() {
            let genesis = genesis_block().clone();
            storage.save_block(&genesis, 0)?;
            info!("Bootstrapped new chain from genesis {}", genesis.get_hash_hex());
            blocks = vec![genesis];
        } else {
            info!("Loaded chain of {} block(s) from disk", blocks.len());
        }

        let utxo_set = UtxoSet::from_blocks(&blocks)?;

        Ok(Blockchain {
            state: Arc::new(RwLock::new(ChainState { blocks, utxo_set })),
            storage: Arc::new(storage),
            wallet: Arc::new(wallet),
        })
    }

    pub fn address(&self) -> String {
        self.wallet.get_address()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Validate and append a block to the tip.
    pub fn add_block(&self, block: Block) -> Result<()> {
        let mut state = self
            .state
            .write()
            .expect("Failed to acquire chain lock - this should never happen");

        Self::check_block(&state, &block)?;

        // Persist first; a storage failure must leave memory untouched.
        let height = state.blocks.len();
        self.storage.save_block(&block, height)?;

        if let Err(e) = state.utxo_set.apply_block(&block, height) {
            // Validation guarantees this cannot happen; if it somehow does,
            // rebuild from the block list to restore consistency.
            warn!("UTXO apply failed after validation: {e}");
            let rebuilt = UtxoSet::from_blocks(&state.blocks)?;
            state.utxo_set = rebuilt;
            return Err(e);
        }

        Self::annotate_spent_outputs(&mut state.blocks, &block);
        info!(
            "Accepted block {} at height {height} with {} transaction(s)",
            block.get_hash_hex(),
            block.get_transactions().len()
        );
        state.blocks.push(block);
        Ok(())
    }

    /// A block arriving from a peer; identical acceptance rules, no
    /// rebroadcast here.
    pub fn receive_block(&self, block: Block) -> Result<()> {
        self.add_block(block)
    }

    fn check_block(state: &ChainState, block: &Block) -> Result<()> {
        match state.blocks.last() {
            Some(tip) => {
                if block.get_prev_hash() != tip.get_hash() {
                    return Err(BlockchainError::InvalidBlock(format!(
                        "Block {} does not extend the tip {}",
                        block.get_hash_hex(),
                        tip.get_hash_hex()
                    )));
                }
            }
            None => {
                if !is_genesis_block(block) {
                    return Err(BlockchainError::InvalidBlock(
                        "First block must be the genesis block".to_string(),
                    ));
                }
            }
        }

        if block.get_hash() != block.compute_hash().as_slice() {
            return Err(BlockchainError::InvalidBlock(
                "Stored block hash does not match its header".to_string(),
            ));
        }
        if !block.verify_merkle_root() {
            return Err(BlockchainError::InvalidBlock(
                "Merkle root does not match the transactions".to_string(),
            ));
        }

        // No outpoint may be spent twice across the block.
        let mut spent: HashSet<OutPoint> = HashSet::new();
        for tx in block.get_transactions() {
            for input in tx.get_vin().iter().filter(|input| !input.is_coinbase()) {
                let outpoint = OutPoint::new(input.get_prev_txid().to_vec(), input.get_vout());
                if !spent.insert(outpoint) {
                    return Err(BlockchainError::InvalidBlock(
                        "Block spends the same output twice".to_string(),
                    ));
                }
            }
        }

        let validator = TransactionValidator::new(&state.utxo_set);
        for tx in block.get_transactions() {
            if tx.is_coinbase() {
                continue;
            }
            if let Some(reason) = validator.validate(tx).reason() {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Transaction {} invalid: {reason}",
                    tx.get_id_hex()
                )));
            }
        }

        Ok(())
    }

    /// Mark the outputs consumed by `block` as spent on the in-memory
    /// chain copy. Display bookkeeping only; the UTXO set is authoritative.
    fn annotate_spent_outputs(blocks: &mut [Block], block: &Block) {
        for tx in block.get_transactions() {
            let spender = tx.get_id_hex();
            for input in tx.get_vin().iter().filter(|input| !input.is_coinbase()) {
                for earlier in blocks.iter_mut() {
                    for candidate in earlier.get_transactions_mut() {
                        if candidate.get_id() == input.get_prev_txid() {
                            candidate.mark_output_spent(input.get_vout(), spender.clone());
                        }
                    }
                }
            }
        }
    }

    /// Adopt a strictly longer chain with the same genesis whose links and
    /// hashes all verify. Returns whether the swap happened. The UTXO set
    /// is rebuilt by replaying the candidate from empty, and blocks plus
    /// state swap atomically under the write lock.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<bool> {
        let mut state = self
            .state
            .write()
            .expect("Failed to acquire chain lock - this should never happen");

        if candidate.len() <= state.blocks.len() {
            info!(
                "Ignoring candidate chain of {} block(s); local chain has {}",
                candidate.len(),
                state.blocks.len()
            );
            return Ok(false);
        }

        let first = match candidate.first() {
            Some(first) => first,
            None => return Ok(false),
        };
        if first.get_hash() != genesis_block().get_hash() {
            warn!("Candidate chain starts from a different genesis block");
            return Ok(false);
        }

        for pair in candidate.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.get_prev_hash() != prev.get_hash()
                || next.get_hash() != next.compute_hash().as_slice()
                || !next.verify_merkle_root()
            {
                warn!(
                    "Candidate chain fails integrity at block {}",
                    next.get_hash_hex()
                );
                return Ok(false);
            }
        }

        let utxo_set = match UtxoSet::from_blocks(&candidate) {
            Ok(set) => set,
            Err(e) => {
                warn!("Candidate chain does not replay cleanly: {e}");
                return Ok(false);
            }
        };

        // Persist the new chain before swapping memory. The storage swap
        // is a single transaction, so a failure here leaves both memory
        // and disk on the old chain.
        self.storage.swap_chain(&candidate, &state.blocks)?;

        info!(
            "Replacing chain: {} block(s) -> {}",
            state.blocks.len(),
            candidate.len()
        );
        state.blocks = candidate;
        state.utxo_set = utxo_set;
        Ok(true)
    }

    /// Build and sign a payment from the node wallet. Greedy largest-first
    /// coin selection; change at or below the dust limit folds into the fee.
    pub fn create_transaction(&self, to: &str, amount: u64, fee: u64) -> Result<Transaction> {
        if !crate::wallet::validate_address(to) {
            return Err(BlockchainError::InvalidAddress(to.to_string()));
        }
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }

        let from = self.wallet.get_address();
        let required = amount
            .checked_add(fee)
            .ok_or_else(|| BlockchainError::Transaction("Amount overflow".to_string()))?;

        let state = self
            .state
            .read()
            .expect("Failed to acquire chain lock - this should never happen");

        let (selected, total) = state
            .utxo_set
            .select_utxos(&from, required)
            .ok_or(BlockchainError::InsufficientFunds {
                required,
                available: state.utxo_set.balance(&from),
            })?;
        drop(state);

        let vin: Vec<TXInput> = selected
            .iter()
            .map(|(outpoint, utxo)| {
                TXInput::new(
                    outpoint.txid.clone(),
                    outpoint.vout,
                    self.wallet.get_public_key().to_vec(),
                    utxo.value,
                    utxo.address.clone(),
                    utxo.pk_script.clone(),
                )
            })
            .collect();

        let mut vout = vec![TXOutput::new(amount, to)?];
        let change = total - required;
        let mut actual_fee = fee;
        if change > DUST_LIMIT {
            vout.push(TXOutput::new(change, &from)?);
        } else {
            actual_fee += change;
        }

        let mut tx = Transaction::new(vin, vout, None, actual_fee)?;
        tx.sign(&self.wallet)?;
        info!(
            "Created transaction {} paying {amount} to {to} (fee {actual_fee})",
            tx.get_id_hex()
        );
        Ok(tx)
    }

    /// Assemble, mine and append a new block paying this node. Included
    /// mempool transactions are re-validated against the current UTXO set
    /// and dropped from the pool once the block is in.
    pub fn mine_new_block(
        &self,
        mempool: &Mempool,
        difficulty: u32,
        max_txs: usize,
    ) -> Result<Block> {
        let (prev_hash, height, effective_difficulty, candidates) = {
            let state = self
                .state
                .read()
                .expect("Failed to acquire chain lock - this should never happen");
            let tip = state.blocks.last().ok_or_else(|| {
                BlockchainError::Mining("Cannot mine on an empty chain".to_string())
            })?;
            let height = state.blocks.len();
            let effective = adjust_difficulty(&state.blocks, height, difficulty);

            // Filter stale or mutually conflicting pool entries.
            let validator = TransactionValidator::new(&state.utxo_set);
            let mut taken: HashSet<OutPoint> = HashSet::new();
            let mut candidates = Vec::new();
            for tx in mempool.top_by_fee(max_txs) {
                if !validator.validate(&tx).is_valid() {
                    continue;
                }
                let outpoints: Vec<OutPoint> = tx
                    .get_vin()
                    .iter()
                    .filter(|input| !input.is_coinbase())
                    .map(|input| OutPoint::new(input.get_prev_txid().to_vec(), input.get_vout()))
                    .collect();
                if outpoints.iter().any(|op| taken.contains(op)) {
                    continue;
                }
                taken.extend(outpoints);
                candidates.push(tx);
            }

            (tip.get_hash().to_vec(), height, effective, candidates)
        };

        // Fees were checked against inputs minus outputs at validation, so
        // the sum is backed by real value; the additions stay checked all
        // the same.
        let total_fees = candidates.iter().try_fold(0u64, |acc, tx| {
            acc.checked_add(tx.get_fee())
                .ok_or_else(|| BlockchainError::Mining("Fee total overflows".to_string()))
        })?;
        let reward = BLOCK_REWARD
            .checked_add(total_fees)
            .ok_or_else(|| BlockchainError::Mining("Coinbase reward overflows".to_string()))?;
        let included: Vec<String> = candidates.iter().map(|tx| tx.get_id_hex()).collect();

        let script_data = format!("Mined at {}", current_timestamp()?).into_bytes();
        let coinbase = Transaction::new_coinbase(&self.address(), reward, script_data)?;

        let mut transactions = vec![coinbase];
        transactions.extend(candidates);

        let mut block = Block::new(prev_hash, transactions, BLOCK_VERSION)?;
        let nonce = mine(&mut block, effective_difficulty)?;
        info!(
            "Mined block {} at height {height} (difficulty {effective_difficulty}, nonce {nonce})",
            block.get_hash_hex()
        );

        self.add_block(block.clone())?;
        mempool.remove_many(&included);
        Ok(block)
    }

    pub fn chain_height(&self) -> usize {
        self.read_state().blocks.len()
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.read_state().blocks.last().cloned()
    }

    pub fn block_at_height(&self, height: usize) -> Option<Block> {
        self.read_state().blocks.get(height).cloned()
    }

    /// Blocks `[start, start + count)`, clamped to the chain.
    pub fn blocks_range(&self, start: usize, count: usize) -> Vec<Block> {
        let state = self.read_state();
        state
            .blocks
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect()
    }

    pub fn all_blocks(&self) -> Vec<Block> {
        self.read_state().blocks.clone()
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.read_state().utxo_set.balance(address)
    }

    pub fn all_utxos(&self) -> Vec<(OutPoint, Utxo)> {
        self.read_state().utxo_set.all()
    }

    /// Snapshot of the UTXO set, for mempool admission outside the lock.
    pub fn utxo_snapshot(&self) -> UtxoSet {
        self.read_state().utxo_set.clone()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ChainState> {
        self.state
            .read()
            .expect("Failed to acquire chain lock - this should never happen")
    }
}
