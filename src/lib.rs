//! # Guri Chain
//!
//! A minimal but complete UTXO proof-of-work blockchain node:
//!
//! - **Ledger**: UTXO model with canonical big-endian encodings and
//!   double-SHA-256 ids
//! - **Validation**: fixed-order transaction checks with a small P2PKH
//!   script interpreter (DER ECDSA signatures over the txid)
//! - **Mempool**: fee-rate ordered with capacity eviction
//! - **Consensus**: hex-string PoW targets, interval difficulty
//!   adjustment, longest-chain fork choice with a full UTXO replay
//! - **Network**: TCP peers exchanging length-prefixed JSON frames from a
//!   closed message enum
//! - **Storage**: sled-backed block store, one database per node
//!
//! Layout:
//! - `core/`: blocks, transactions, validation, PoW, the chain manager
//! - `storage/`: block store, UTXO set, mempool
//! - `network/`: wire protocol, peers, the P2P node
//! - `wallet/`: node key and Base58Check addresses
//! - `cli/`: process arguments and the interactive shell
//! - `config/`, `error/`, `utils/`: the usual plumbing

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Opt, Shell};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    genesis_block, is_genesis_block, Block, Blockchain, TXInput, TXOutput, Transaction,
    TransactionValidator, ValidationOutcome, BLOCK_REWARD, DUST_LIMIT,
};
pub use error::{BlockchainError, Result};
pub use network::{Message, MessageKind, P2PNetwork, Peer, PeerState};
pub use storage::{Mempool, OutPoint, Storage, Utxo, UtxoSet, MAX_POOL_SIZE, MIN_FEE_RATE};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, double_sha256, ecdsa_sign, ecdsa_verify,
    hash160, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{convert_address, hash_pub_key, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN};
