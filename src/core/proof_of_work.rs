//! Proof of work and difficulty adjustment
//!
//! The target for difficulty `d` is the 64-character hex string of `d`
//! zeros followed by `f`s; a block wins when its lowercase-hex hash
//! compares lexicographically below that string. The nonce walks the full
//! `u32` space from zero and exhausting it is a mining failure.
//!
//! Difficulty re-evaluates every 2016 blocks against a 600-second block
//! target, moving a single step at a time and never below 1.

use crate::core::block::Block;
use crate::error::{BlockchainError, Result};
use log::{debug, info};

/// Blocks between difficulty re-evaluations.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: usize = 2016;

/// Desired seconds per block.
pub const TARGET_BLOCK_TIME_SECS: i64 = 600;

/// Difficulty floor.
pub const MIN_DIFFICULTY: u32 = 1;

/// The comparison target for a difficulty: `d` zeros then `f`s, 64 chars.
pub fn target_string(difficulty: u32) -> String {
    let zeros = (difficulty as usize).min(64);
    let mut target = String::with_capacity(64);
    for _ in 0..zeros {
        target.push('0');
    }
    for _ in zeros..64 {
        target.push('f');
    }
    target
}

/// Search the nonce space until the block hash beats the target. Returns
/// the winning nonce; the block keeps it and the matching hash.
pub fn mine(block: &mut Block, difficulty: u32) -> Result<u32> {
    let target = target_string(difficulty);
    info!(
        "Mining block over {} transaction(s) at difficulty {difficulty}",
        block.get_transactions().len()
    );

    let mut nonce: u32 = 0;
    loop {
        block.set_nonce(nonce);
        if block.get_hash_hex().as_str() < target.as_str() {
            debug!("Found nonce {nonce}, hash {}", block.get_hash_hex());
            return Ok(nonce);
        }
        nonce = match nonce.checked_add(1) {
            Some(next) => next,
            None => {
                return Err(BlockchainError::Mining(
                    "Exhausted the nonce space without beating the target".to_string(),
                ))
            }
        };
    }
}

/// Recompute the hash and compare against the difficulty target.
pub fn validate_proof_of_work(block: &Block, difficulty: u32) -> bool {
    let recomputed = block.compute_hash();
    let hash_hex = data_encoding::HEXLOWER.encode(&recomputed);
    hash_hex.as_str() < target_string(difficulty).as_str()
}

/// Difficulty for the block about to be mined at `height`, given the chain
/// so far. Only interval boundaries move the value, one step at a time.
pub fn adjust_difficulty(blocks: &[Block], height: usize, current: u32) -> u32 {
    adjust_with_interval(
        blocks,
        height,
        current,
        DIFFICULTY_ADJUSTMENT_INTERVAL,
        TARGET_BLOCK_TIME_SECS,
    )
}

fn adjust_with_interval(
    blocks: &[Block],
    height: usize,
    current: u32,
    interval: usize,
    block_time_secs: i64,
) -> u32 {
    if height == 0 || height % interval != 0 || height < interval || blocks.len() < height {
        return current;
    }

    let window_start = &blocks[height - interval];
    let window_end = &blocks[height - 1];
    let actual = window_end.get_timestamp() - window_start.get_timestamp();
    let expected = interval as i64 * block_time_secs;

    if actual < expected / 2 {
        info!(
            "Blocks arriving fast ({actual}s over the window, expected {expected}s), raising difficulty to {}",
            current + 1
        );
        current + 1
    } else if actual > expected * 2 {
        let lowered = current.saturating_sub(1).max(MIN_DIFFICULTY);
        info!(
            "Blocks arriving slow ({actual}s over the window, expected {expected}s), lowering difficulty to {lowered}"
        );
        lowered
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::Transaction;
    use crate::wallet::Wallet;

    fn block_at(timestamp: i64) -> Block {
        Block::with_timestamp(vec![0u8; 32], vec![], 1, timestamp)
    }

    fn minable_block() -> Block {
        let wallet = Wallet::new().unwrap();
        let coinbase =
            Transaction::new_coinbase(&wallet.get_address(), 500, b"pow test".to_vec()).unwrap();
        Block::with_timestamp(vec![0u8; 32], vec![coinbase], 1, 1731960000)
    }

    #[test]
    fn test_target_string_shape() {
        assert_eq!(target_string(1), format!("0{}", "f".repeat(63)));
        assert_eq!(target_string(3), format!("000{}", "f".repeat(61)));
        assert_eq!(target_string(64), "0".repeat(64));
        assert_eq!(target_string(1).len(), 64);
    }

    #[test]
    fn test_mined_block_validates() {
        let mut block = minable_block();
        let nonce = mine(&mut block, 1).unwrap();
        assert_eq!(block.get_nonce(), nonce);
        assert!(block.get_hash_hex().starts_with('0'));
        assert!(validate_proof_of_work(&block, 1));
    }

    #[test]
    fn test_impossible_target_never_validates() {
        // Difficulty 64 demands an all-zero hash.
        let block = minable_block();
        assert!(!validate_proof_of_work(&block, 64));
    }

    #[test]
    fn test_adjustment_only_at_interval_boundaries() {
        let blocks: Vec<Block> = (0..8).map(|i| block_at(i * 600)).collect();
        for height in [1usize, 2, 3, 5, 7] {
            assert_eq!(adjust_with_interval(&blocks, height, 3, 4, 600), 3);
        }
        assert_eq!(adjust_with_interval(&blocks, 0, 3, 4, 600), 3);
    }

    #[test]
    fn test_fast_window_raises_difficulty() {
        // Four blocks 100s apart: window spans 300s against 2400s expected.
        let blocks: Vec<Block> = (0..4).map(|i| block_at(i * 100)).collect();
        assert_eq!(adjust_with_interval(&blocks, 4, 3, 4, 600), 4);
    }

    #[test]
    fn test_slow_window_lowers_difficulty_with_floor() {
        // Four blocks 2000s apart: window spans 6000s against 2400s expected.
        let blocks: Vec<Block> = (0..4).map(|i| block_at(i * 2000)).collect();
        assert_eq!(adjust_with_interval(&blocks, 4, 3, 4, 600), 2);
        assert_eq!(adjust_with_interval(&blocks, 4, 1, 4, 600), 1);
    }

    #[test]
    fn test_on_pace_window_keeps_difficulty() {
        let blocks: Vec<Block> = (0..4).map(|i| block_at(i * 600)).collect();
        assert_eq!(adjust_with_interval(&blocks, 4, 3, 4, 600), 3);
    }
}
