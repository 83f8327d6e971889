//! Transaction validation
//!
//! A pure function over a UTXO-set snapshot. Checks run in a fixed order
//! and stop at the first failure:
//!
//! 1. structure (recomputable txid, at least one input and output)
//! 2. every referenced outpoint exists
//! 3. no outpoint referenced twice within the transaction
//! 4. inputs cover outputs and the declared fee equals the difference
//! 5. the P2PKH script check per input, signature over the txid
//!
//! All-coinbase transactions skip steps 2 through 5. A failed signature is
//! a hard reject.

use crate::core::script::verify_p2pkh;
use crate::core::transaction::{Transaction, MAX_TX_SLOTS};
use crate::storage::utxo_set::{OutPoint, UtxoSet};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(String),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Valid => None,
            ValidationOutcome::Invalid(reason) => Some(reason),
        }
    }

    fn invalid(reason: impl Into<String>) -> ValidationOutcome {
        ValidationOutcome::Invalid(reason.into())
    }
}

pub struct TransactionValidator<'a> {
    utxo_set: &'a UtxoSet,
}

impl<'a> TransactionValidator<'a> {
    pub fn new(utxo_set: &'a UtxoSet) -> TransactionValidator<'a> {
        TransactionValidator { utxo_set }
    }

    pub fn validate(&self, tx: &Transaction) -> ValidationOutcome {
        // Step 1: structure.
        if tx.get_id().len() != 32 {
            return ValidationOutcome::invalid("Transaction id must be 32 bytes");
        }
        if tx.get_id() != tx.compute_txid().as_slice() {
            return ValidationOutcome::invalid("Transaction id does not match its contents");
        }
        if tx.get_vin().is_empty() {
            return ValidationOutcome::invalid("Transaction has no inputs");
        }
        if tx.get_vout().is_empty() {
            return ValidationOutcome::invalid("Transaction has no outputs");
        }
        // Local construction enforces the slot bound; transactions off the
        // wire only pass through here.
        if tx.get_vin().len() > MAX_TX_SLOTS || tx.get_vout().len() > MAX_TX_SLOTS {
            return ValidationOutcome::invalid(format!(
                "Transaction exceeds {MAX_TX_SLOTS} inputs or outputs"
            ));
        }

        if tx.is_coinbase() {
            return ValidationOutcome::Valid;
        }

        // Step 2: every input must reference a live UTXO.
        let mut input_total: u64 = 0;
        for (index, input) in tx.get_vin().iter().enumerate() {
            let outpoint = OutPoint::new(input.get_prev_txid().to_vec(), input.get_vout());
            match self.utxo_set.get(&outpoint) {
                Some(utxo) => input_total += utxo.value,
                None => {
                    return ValidationOutcome::invalid(format!(
                        "Input #{index} references missing UTXO {}:{}",
                        outpoint.txid_hex(),
                        outpoint.vout
                    ));
                }
            }
        }

        // Step 3: no outpoint may appear twice in one transaction.
        let mut seen: HashSet<OutPoint> = HashSet::with_capacity(tx.get_vin().len());
        for input in tx.get_vin() {
            let outpoint = OutPoint::new(input.get_prev_txid().to_vec(), input.get_vout());
            if !seen.insert(outpoint) {
                return ValidationOutcome::invalid("Transaction spends the same output twice");
            }
        }

        // Step 4: inputs must cover outputs, and the declared fee must be
        // exactly the remainder. Miners pay themselves the declared fee,
        // so an inflated value would mint an unbacked coinbase.
        let output_total: u64 = tx.get_vout().iter().map(|output| output.get_value()).sum();
        if input_total < output_total {
            return ValidationOutcome::invalid(format!(
                "Outputs ({output_total}) exceed inputs ({input_total})"
            ));
        }
        let implied_fee = input_total - output_total;
        if tx.get_fee() != implied_fee {
            return ValidationOutcome::invalid(format!(
                "Declared fee {} does not match inputs minus outputs ({implied_fee})",
                tx.get_fee()
            ));
        }

        // Step 5: P2PKH check against the referenced UTXO's lock script.
        for (index, input) in tx.get_vin().iter().enumerate() {
            let outpoint = OutPoint::new(input.get_prev_txid().to_vec(), input.get_vout());
            let utxo = match self.utxo_set.get(&outpoint) {
                Some(utxo) => utxo,
                None => {
                    return ValidationOutcome::invalid(format!(
                        "Input #{index} references missing UTXO"
                    ))
                }
            };
            if let Err(reason) = verify_p2pkh(
                input.get_signature(),
                input.get_pub_key(),
                &utxo.pk_script,
                tx.get_id(),
            ) {
                return ValidationOutcome::invalid(format!("Input #{index}: {reason}"));
            }
        }

        ValidationOutcome::Valid
    }
}
