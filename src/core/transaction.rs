//! UTXO transactions
//!
//! A transaction consumes previous outputs and creates new ones. The
//! canonical byte encoding is fixed and big-endian:
//!
//! - input  = `prev_txid(32) ‖ vout(4) ‖ sig_len(1) ‖ sig ‖ pk_len(1) ‖ pk ‖ 0xffffffff`
//! - output = `value(8) ‖ pk_script`
//! - tx     = `input_count(1) ‖ inputs ‖ output_count(1) ‖ outputs`
//!
//! The txid is the double SHA-256 of that encoding with one twist: a real
//! input's signature is encoded as zero-length in the preimage, so signing
//! never changes the id the signature commits to. A coinbase input carries
//! arbitrary script data instead of a signature and that data IS hashed,
//! which keeps coinbase txids unique across blocks.

use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, double_sha256};
use crate::wallet::{convert_address, Wallet};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// Trailing sequence marker on every encoded input.
const INPUT_SEQUENCE: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// The canonical encoding counts inputs and outputs in one byte each, so
/// anything larger would make two distinct transactions encode alike.
pub const MAX_TX_SLOTS: usize = u8::MAX as usize;

#[derive(Clone, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    prev_txid: Vec<u8>,
    vout: u32,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
    is_coinbase: bool,
    // Denormalized copies of the referenced output, populated at build
    // time for fee math and display. Validation never trusts them.
    value: u64,
    address: String,
    pk_script: Vec<u8>,
}

impl TXInput {
    pub fn new(
        prev_txid: Vec<u8>,
        vout: u32,
        pub_key: Vec<u8>,
        value: u64,
        address: String,
        pk_script: Vec<u8>,
    ) -> TXInput {
        TXInput {
            prev_txid,
            vout,
            signature: vec![],
            pub_key,
            is_coinbase: false,
            value,
            address,
            pk_script,
        }
    }

    /// A coinbase input references the all-zero txid at index 0 and holds
    /// free-form script data where a signature would go.
    pub fn new_coinbase(script_data: Vec<u8>) -> TXInput {
        TXInput {
            prev_txid: vec![0u8; 32],
            vout: 0,
            signature: script_data,
            pub_key: vec![],
            is_coinbase: true,
            value: 0,
            address: String::new(),
            pk_script: vec![],
        }
    }

    pub fn get_prev_txid(&self) -> &[u8] {
        &self.prev_txid
    }

    pub fn get_vout(&self) -> u32 {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    pub fn get_pub_key(&self) -> &[u8] {
        &self.pub_key
    }

    pub fn is_coinbase(&self) -> bool {
        self.is_coinbase
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_address(&self) -> &str {
        &self.address
    }

    pub fn get_pk_script(&self) -> &[u8] {
        &self.pk_script
    }

    fn to_bytes(&self, for_txid: bool) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            32 + 4 + 1 + self.signature.len() + 1 + self.pub_key.len() + 4,
        );
        bytes.extend_from_slice(&self.prev_txid);
        bytes.extend_from_slice(&self.vout.to_be_bytes());
        // Real signatures are excluded from the txid preimage; coinbase
        // script data is not a signature and stays in.
        if for_txid && !self.is_coinbase {
            bytes.push(0);
        } else {
            bytes.push(self.signature.len() as u8);
            bytes.extend_from_slice(&self.signature);
        }
        bytes.push(self.pub_key.len() as u8);
        bytes.extend_from_slice(&self.pub_key);
        bytes.extend_from_slice(&INPUT_SEQUENCE);
        bytes
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    address: String,
    pk_script: Vec<u8>,
    // Advisory bookkeeping on the in-memory chain copy. The UTXO set is
    // the authority on spendability.
    spent: bool,
    spender: Option<String>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        let pk_script = convert_address(address)?;
        Ok(TXOutput {
            value,
            address: address.to_string(),
            pk_script,
            spent: false,
            spender: None,
        })
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_address(&self) -> &str {
        &self.address
    }

    pub fn get_pk_script(&self) -> &[u8] {
        &self.pk_script
    }

    pub fn is_spent(&self) -> bool {
        self.spent
    }

    pub fn get_spender(&self) -> Option<&str> {
        self.spender.as_deref()
    }

    pub fn mark_spent(&mut self, spender_txid: String) {
        self.spent = true;
        self.spender = Some(spender_txid);
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.pk_script.len());
        bytes.extend_from_slice(&self.value.to_be_bytes());
        bytes.extend_from_slice(&self.pk_script);
        bytes
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
    contract: Option<String>,
    fee: u64,
    timestamp: i64,
}

impl Transaction {
    pub fn new(
        vin: Vec<TXInput>,
        vout: Vec<TXOutput>,
        contract: Option<String>,
        fee: u64,
    ) -> Result<Transaction> {
        if vin.len() > MAX_TX_SLOTS || vout.len() > MAX_TX_SLOTS {
            return Err(BlockchainError::Transaction(format!(
                "At most {MAX_TX_SLOTS} inputs and outputs per transaction"
            )));
        }
        let timestamp = current_timestamp()?;
        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
            contract,
            fee,
            timestamp,
        };
        tx.id = tx.compute_txid();
        Ok(tx)
    }

    /// Coinbase transaction paying `reward` to `to_address`.
    pub fn new_coinbase(to_address: &str, reward: u64, script_data: Vec<u8>) -> Result<Transaction> {
        let input = TXInput::new_coinbase(script_data);
        let output = TXOutput::new(reward, to_address)?;
        Transaction::new(vec![input], vec![output], None, 0)
    }

    pub fn get_id(&self) -> &[u8] {
        &self.id
    }

    pub fn get_id_hex(&self) -> String {
        HEXLOWER.encode(&self.id)
    }

    pub fn get_vin(&self) -> &[TXInput] {
        &self.vin
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        &self.vout
    }

    pub fn get_contract(&self) -> Option<&str> {
        self.contract.as_deref()
    }

    pub fn get_fee(&self) -> u64 {
        self.fee
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_coinbase(&self) -> bool {
        !self.vin.is_empty() && self.vin.iter().all(|input| input.is_coinbase())
    }

    /// Canonical encoding. `for_txid` drops real-input signatures.
    pub fn to_bytes(&self, for_txid: bool) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(self.vin.len() as u8);
        for input in &self.vin {
            bytes.extend_from_slice(&input.to_bytes(for_txid));
        }
        bytes.push(self.vout.len() as u8);
        for output in &self.vout {
            bytes.extend_from_slice(&output.to_bytes());
        }
        bytes
    }

    /// Double SHA-256 of the canonical encoding under the txid policy.
    pub fn compute_txid(&self) -> Vec<u8> {
        double_sha256(&self.to_bytes(true))
    }

    /// Full serialized size including signatures, used for fee rates and
    /// block sizes.
    pub fn serialized_size(&self) -> usize {
        self.to_bytes(false).len()
    }

    /// Fee per serialized byte.
    pub fn fee_rate(&self) -> f64 {
        let size = self.serialized_size();
        if size == 0 {
            return 0.0;
        }
        self.fee as f64 / size as f64
    }

    /// Sign every real input over the txid. The txid excludes signatures,
    /// so this never invalidates the id.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<()> {
        if self.id.len() != 32 {
            return Err(BlockchainError::Transaction(
                "Cannot sign a transaction without a txid".to_string(),
            ));
        }
        let message = self.id.clone();
        for input in self.vin.iter_mut().filter(|input| !input.is_coinbase()) {
            let signature = wallet.sign(&message)?;
            input.set_signature(signature);
        }
        Ok(())
    }

    pub fn mark_output_spent(&mut self, vout: u32, spender_txid: String) {
        if let Some(output) = self.vout.get_mut(vout as usize) {
            output.mark_spent(spender_txid);
        }
    }
}
