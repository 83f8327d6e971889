//! Core chain functionality
//!
//! Blocks, transactions, validation, proof-of-work consensus and the
//! chain manager.

pub mod block;
pub mod blockchain;
pub mod genesis;
pub mod merkle;
pub mod proof_of_work;
pub mod script;
pub mod transaction;
pub mod validator;

pub use block::{Block, BLOCK_HEADER_SIZE};
pub use blockchain::{Blockchain, BLOCK_REWARD, BLOCK_VERSION, DUST_LIMIT, MAX_BLOCK_TRANSACTIONS};
pub use genesis::{genesis_block, is_genesis_block, GENESIS_MINER_ADDRESS, GENESIS_REWARD};
pub use merkle::{merkle_path, merkle_root, verify_merkle_path, ProofElement};
pub use proof_of_work::{
    adjust_difficulty, mine, target_string, validate_proof_of_work,
    DIFFICULTY_ADJUSTMENT_INTERVAL, MIN_DIFFICULTY, TARGET_BLOCK_TIME_SECS,
};
pub use script::{verify_p2pkh, Opcode, PK_SCRIPT_LEN};
pub use transaction::{TXInput, TXOutput, Transaction, MAX_TX_SLOTS};
pub use validator::{TransactionValidator, ValidationOutcome};
