//! The genesis block
//!
//! Every node derives the identical genesis block from fixed constants,
//! built once behind a `Lazy` and shared immutably from then on. Identity
//! checks compare block hashes, never pointers.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use once_cell::sync::Lazy;

pub const GENESIS_VERSION: u32 = 1;
pub const GENESIS_TIMESTAMP: i64 = 1731960000;
pub const GENESIS_MESSAGE: &str = "Genesis Block - Guri Chain 2025-11-19";
pub const GENESIS_MINER_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
pub const GENESIS_REWARD: u64 = 500;

static GENESIS_BLOCK: Lazy<Block> = Lazy::new(|| {
    let coinbase = Transaction::new_coinbase(
        GENESIS_MINER_ADDRESS,
        GENESIS_REWARD,
        GENESIS_MESSAGE.as_bytes().to_vec(),
    )
    .expect("Genesis constants are fixed and valid");
    Block::with_timestamp(
        vec![0u8; 32],
        vec![coinbase],
        GENESIS_VERSION,
        GENESIS_TIMESTAMP,
    )
});

/// The shared genesis block.
pub fn genesis_block() -> &'static Block {
    &GENESIS_BLOCK
}

/// A block is the genesis block iff its hash matches.
pub fn is_genesis_block(block: &Block) -> bool {
    block.get_hash() == genesis_block().get_hash()
}
