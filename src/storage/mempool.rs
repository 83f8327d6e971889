//! Transaction memory pool
//!
//! Pending transactions keyed by hex txid. Admission revalidates against
//! the caller's UTXO snapshot, enforces a minimum fee rate, and refuses
//! anything that conflicts with an already-pooled spend, so two
//! transactions consuming the same outpoint never coexist. At capacity
//! the lowest fee-rate entry is evicted, but only for a strictly
//! higher-paying newcomer.

use crate::core::transaction::Transaction;
use crate::core::validator::TransactionValidator;
use crate::error::{BlockchainError, Result};
use crate::storage::utxo_set::{OutPoint, UtxoSet};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::RwLock;

/// Default pool capacity.
pub const MAX_POOL_SIZE: usize = 5000;

/// Admission floor: one fee unit per serialized byte.
pub const MIN_FEE_RATE: f64 = 1.0;

pub struct Mempool {
    inner: RwLock<HashMap<String, Transaction>>,
    capacity: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Mempool {
        Mempool::with_capacity(MAX_POOL_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Mempool {
        Mempool {
            inner: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Admit a transaction. Rejections come back as `Transaction` errors
    /// carrying the reason.
    pub fn add_transaction(&self, tx: Transaction, utxo_set: &UtxoSet) -> Result<()> {
        let txid_hex = tx.get_id_hex();

        let outcome = TransactionValidator::new(utxo_set).validate(&tx);
        if let Some(reason) = outcome.reason() {
            return Err(BlockchainError::Transaction(format!(
                "Rejected {txid_hex}: {reason}"
            )));
        }

        if tx.fee_rate() < MIN_FEE_RATE {
            return Err(BlockchainError::Transaction(format!(
                "Rejected {txid_hex}: fee rate {:.4} below the minimum {MIN_FEE_RATE}",
                tx.fee_rate()
            )));
        }

        let mut pool = self.inner.write().map_err(|e| {
            BlockchainError::Transaction(format!("Failed to acquire mempool lock: {e}"))
        })?;

        if pool.contains_key(&txid_hex) {
            return Err(BlockchainError::Transaction(format!(
                "Duplicate transaction {txid_hex}"
            )));
        }

        // No two pooled transactions may spend the same outpoint.
        for input in tx.get_vin().iter().filter(|input| !input.is_coinbase()) {
            let outpoint = OutPoint::new(input.get_prev_txid().to_vec(), input.get_vout());
            let conflict = pool.values().any(|pooled| {
                pooled.get_vin().iter().any(|pooled_input| {
                    !pooled_input.is_coinbase()
                        && pooled_input.get_prev_txid() == outpoint.txid.as_slice()
                        && pooled_input.get_vout() == outpoint.vout
                })
            });
            if conflict {
                return Err(BlockchainError::Transaction(format!(
                    "Conflicting spend of {}:{} already pooled",
                    outpoint.txid_hex(),
                    outpoint.vout
                )));
            }
        }

        if pool.len() >= self.capacity {
            let lowest = pool
                .iter()
                .min_by(|a, b| {
                    a.1.fee_rate()
                        .partial_cmp(&b.1.fee_rate())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(txid, pooled)| (txid.clone(), pooled.fee_rate()));

            match lowest {
                Some((lowest_txid, lowest_rate)) if tx.fee_rate() > lowest_rate => {
                    info!("Mempool full, evicting {lowest_txid} (fee rate {lowest_rate:.4})");
                    pool.remove(&lowest_txid);
                }
                _ => {
                    return Err(BlockchainError::Transaction(format!(
                        "Mempool full and {txid_hex} does not outbid the lowest fee rate"
                    )));
                }
            }
        }

        debug!("Pooled transaction {txid_hex} (fee {})", tx.get_fee());
        pool.insert(txid_hex, tx);
        Ok(())
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.contains_key(txid_hex),
            Err(e) => {
                error!("Failed to acquire mempool lock: {e}");
                false
            }
        }
    }

    pub fn get(&self, txid_hex: &str) -> Option<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.get(txid_hex).cloned(),
            Err(e) => {
                error!("Failed to acquire mempool lock: {e}");
                None
            }
        }
    }

    /// Up to `n` transactions ordered by descending fee rate.
    pub fn top_by_fee(&self, n: usize) -> Vec<Transaction> {
        let pool = match self.inner.read() {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to acquire mempool lock: {e}");
                return vec![];
            }
        };
        let mut txs: Vec<Transaction> = pool.values().cloned().collect();
        txs.sort_by(|a, b| {
            b.fee_rate()
                .partial_cmp(&a.fee_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        txs.truncate(n);
        txs
    }

    /// Drop the given txids, typically after block inclusion.
    pub fn remove_many(&self, txid_hexes: &[String]) {
        match self.inner.write() {
            Ok(mut pool) => {
                for txid_hex in txid_hexes {
                    pool.remove(txid_hex);
                }
            }
            Err(e) => error!("Failed to acquire mempool lock: {e}"),
        }
    }

    pub fn all(&self) -> Vec<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.values().cloned().collect(),
            Err(e) => {
                error!("Failed to acquire mempool lock: {e}");
                vec![]
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(e) => {
                error!("Failed to acquire mempool lock: {e}");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut pool) => pool.clear(),
            Err(e) => error!("Failed to acquire mempool lock: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::Block;
    use crate::core::transaction::{TXInput, TXOutput};
    use crate::wallet::Wallet;

    struct Fixture {
        wallet: Wallet,
        utxo_set: UtxoSet,
        outpoints: Vec<OutPoint>,
    }

    /// Fund a wallet with `n` coinbase outputs of `value` each.
    fn funded_fixture(n: usize, value: u64) -> Fixture {
        let wallet = Wallet::new().unwrap();
        let mut utxo_set = UtxoSet::new();
        let mut outpoints = Vec::new();
        for i in 0..n {
            let coinbase = Transaction::new_coinbase(
                &wallet.get_address(),
                value,
                format!("funding {i}").into_bytes(),
            )
            .unwrap();
            outpoints.push(OutPoint::new(coinbase.get_id().to_vec(), 0));
            let block = Block::with_timestamp(vec![0u8; 32], vec![coinbase], 1, 0);
            utxo_set.apply_block(&block, i).unwrap();
        }
        Fixture {
            wallet,
            utxo_set,
            outpoints,
        }
    }

    /// Spend one funded outpoint entirely: `fee` is what the recipient
    /// does not get, so the declared fee always equals inputs minus
    /// outputs. A signed single-in single-out spend serializes to just
    /// over 200 bytes, so fees of a few hundred clear the rate floor.
    fn spend(fixture: &Fixture, outpoint_idx: usize, fee: u64) -> Transaction {
        let outpoint = &fixture.outpoints[outpoint_idx];
        let funded = fixture.utxo_set.get(outpoint).unwrap().value;
        let input = TXInput::new(
            outpoint.txid.clone(),
            outpoint.vout,
            fixture.wallet.get_public_key().to_vec(),
            funded,
            fixture.wallet.get_address(),
            vec![],
        );
        let recipient = Wallet::new().unwrap();
        let output = TXOutput::new(funded - fee, &recipient.get_address()).unwrap();
        let mut tx = Transaction::new(vec![input], vec![output], None, fee).unwrap();
        tx.sign(&fixture.wallet).unwrap();
        tx
    }

    #[test]
    fn test_admit_and_duplicate_reject() {
        let fixture = funded_fixture(1, 10_000);
        let mempool = Mempool::new();
        let tx = spend(&fixture, 0, 300);

        mempool.add_transaction(tx.clone(), &fixture.utxo_set).unwrap();
        assert_eq!(mempool.len(), 1);
        assert!(mempool.contains(&tx.get_id_hex()));

        let err = mempool
            .add_transaction(tx, &fixture.utxo_set)
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_invalid_transaction_rejected() {
        let fixture = funded_fixture(1, 10_000);
        let mempool = Mempool::new();
        // Unsigned spend fails validation.
        let outpoint = &fixture.outpoints[0];
        let input = TXInput::new(
            outpoint.txid.clone(),
            outpoint.vout,
            fixture.wallet.get_public_key().to_vec(),
            10_000,
            fixture.wallet.get_address(),
            vec![],
        );
        let recipient = Wallet::new().unwrap();
        let output = TXOutput::new(9_700, &recipient.get_address()).unwrap();
        let tx = Transaction::new(vec![input], vec![output], None, 300).unwrap();

        assert!(mempool.add_transaction(tx, &fixture.utxo_set).is_err());
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_below_minimum_fee_rate_rejected() {
        let fixture = funded_fixture(1, 10_000);
        let mempool = Mempool::new();
        // Validates fine but pays well under a fee unit per byte.
        let tx = spend(&fixture, 0, 50);

        let err = mempool
            .add_transaction(tx, &fixture.utxo_set)
            .unwrap_err();
        assert!(err.to_string().contains("fee rate"));
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_inflated_declared_fee_never_pools() {
        let fixture = funded_fixture(1, 10_000);
        let mempool = Mempool::new();
        // Correctly signed, but the declared fee dwarfs inputs minus
        // outputs; admitting it would let the next coinbase overflow.
        let outpoint = &fixture.outpoints[0];
        let input = TXInput::new(
            outpoint.txid.clone(),
            outpoint.vout,
            fixture.wallet.get_public_key().to_vec(),
            10_000,
            fixture.wallet.get_address(),
            vec![],
        );
        let recipient = Wallet::new().unwrap();
        let output = TXOutput::new(9_000, &recipient.get_address()).unwrap();
        let mut tx =
            Transaction::new(vec![input], vec![output], None, u64::MAX - 1_000).unwrap();
        tx.sign(&fixture.wallet).unwrap();

        let err = mempool
            .add_transaction(tx, &fixture.utxo_set)
            .unwrap_err();
        assert!(err.to_string().contains("Declared fee"));
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_conflicting_spend_rejected() {
        let fixture = funded_fixture(1, 10_000);
        let mempool = Mempool::new();
        let first = spend(&fixture, 0, 300);
        let second = spend(&fixture, 0, 320);

        mempool
            .add_transaction(first, &fixture.utxo_set)
            .unwrap();
        let err = mempool
            .add_transaction(second, &fixture.utxo_set)
            .unwrap_err();
        assert!(err.to_string().contains("Conflicting spend"));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_eviction_requires_strictly_higher_fee_rate() {
        let fixture = funded_fixture(3, 10_000);
        let mempool = Mempool::with_capacity(2);

        let low = spend(&fixture, 0, 250);
        let mid = spend(&fixture, 1, 500);
        mempool.add_transaction(low.clone(), &fixture.utxo_set).unwrap();
        mempool.add_transaction(mid, &fixture.utxo_set).unwrap();

        // Above the floor but below the pool's cheapest: no displacement.
        let cheaper = spend(&fixture, 2, 230);
        assert!(mempool
            .add_transaction(cheaper, &fixture.utxo_set)
            .is_err());
        assert!(mempool.contains(&low.get_id_hex()));

        // Strictly higher fee rate evicts the cheapest entry.
        let rich = spend(&fixture, 2, 600);
        mempool.add_transaction(rich.clone(), &fixture.utxo_set).unwrap();
        assert_eq!(mempool.len(), 2);
        assert!(!mempool.contains(&low.get_id_hex()));
        assert!(mempool.contains(&rich.get_id_hex()));
    }

    #[test]
    fn test_top_by_fee_descending() {
        let fixture = funded_fixture(3, 10_000);
        let mempool = Mempool::new();

        let cheap = spend(&fixture, 0, 250);
        let pricey = spend(&fixture, 1, 800);
        let middle = spend(&fixture, 2, 400);
        for tx in [&cheap, &pricey, &middle] {
            mempool.add_transaction(tx.clone(), &fixture.utxo_set).unwrap();
        }

        let top = mempool.top_by_fee(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].get_id(), pricey.get_id());
        assert_eq!(top[1].get_id(), middle.get_id());
    }

    #[test]
    fn test_remove_many() {
        let fixture = funded_fixture(2, 10_000);
        let mempool = Mempool::new();
        let a = spend(&fixture, 0, 300);
        let b = spend(&fixture, 1, 300);
        mempool.add_transaction(a.clone(), &fixture.utxo_set).unwrap();
        mempool.add_transaction(b.clone(), &fixture.utxo_set).unwrap();

        mempool.remove_many(&[a.get_id_hex()]);
        assert_eq!(mempool.len(), 1);
        assert!(mempool.contains(&b.get_id_hex()));
    }
}
