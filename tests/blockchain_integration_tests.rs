//! End-to-end node scenarios: mining, spending, double spends, fork
//! choice and persistence across restarts.

use guri_chain::core::{genesis_block, Blockchain, GENESIS_MINER_ADDRESS, GENESIS_REWARD};
use guri_chain::storage::{Mempool, OutPoint};
use guri_chain::{Block, Wallet, BLOCK_REWARD};
use tempfile::TempDir;

const TEST_FEE: u64 = 1000;

fn new_node() -> (Blockchain, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let blockchain = Blockchain::open(dir.path().join("db").to_str().unwrap()).unwrap();
    (blockchain, dir)
}

#[test]
fn genesis_is_identical_across_nodes() {
    let (node_a, _dir_a) = new_node();
    let (node_b, _dir_b) = new_node();

    let genesis_a = node_a.latest_block().unwrap();
    let genesis_b = node_b.latest_block().unwrap();
    assert_eq!(genesis_a.get_hash(), genesis_b.get_hash());
    assert_eq!(genesis_a.get_hash(), genesis_block().get_hash());

    assert_eq!(node_a.balance(GENESIS_MINER_ADDRESS), GENESIS_REWARD);
    assert_eq!(node_b.balance(GENESIS_MINER_ADDRESS), GENESIS_REWARD);
}

#[test]
fn mining_pays_the_block_reward() {
    let (node, _dir) = new_node();
    let mempool = Mempool::new();

    let block = node.mine_new_block(&mempool, 1, 10).unwrap();
    assert_eq!(node.chain_height(), 2);
    assert!(block.get_hash_hex().starts_with('0'));
    assert_eq!(node.balance(&node.address()), BLOCK_REWARD);
}

#[test]
fn spend_moves_value_and_consumes_the_utxo() {
    let (node, _dir) = new_node();
    let mempool = Mempool::new();
    node.mine_new_block(&mempool, 1, 10).unwrap();

    let recipient = Wallet::new().unwrap();
    let tx = node
        .create_transaction(&recipient.get_address(), 1000, TEST_FEE)
        .unwrap();
    let spent_outpoint = OutPoint::new(
        tx.get_vin()[0].get_prev_txid().to_vec(),
        tx.get_vin()[0].get_vout(),
    );
    mempool
        .add_transaction(tx.clone(), &node.utxo_snapshot())
        .unwrap();

    let block = node.mine_new_block(&mempool, 1, 10).unwrap();
    assert_eq!(block.get_transactions().len(), 2);
    assert!(mempool.is_empty());

    // Coinbase of the second block collects reward plus the fee.
    let coinbase = &block.get_transactions()[0];
    assert_eq!(coinbase.get_vout()[0].get_value(), BLOCK_REWARD + TEST_FEE);

    assert_eq!(node.balance(&recipient.get_address()), 1000);
    assert_eq!(node.balance(&node.address()), 2 * BLOCK_REWARD - 1000);

    // The spent outpoint is gone from the UTXO set.
    assert!(!node
        .all_utxos()
        .iter()
        .any(|(outpoint, _)| *outpoint == spent_outpoint));
}

#[test]
fn conflicting_spend_never_reaches_a_block() {
    let (node, _dir) = new_node();
    let mempool = Mempool::new();
    node.mine_new_block(&mempool, 1, 10).unwrap();

    // Two payments that must select the same single UTXO.
    let first = node
        .create_transaction(&Wallet::new().unwrap().get_address(), 1000, TEST_FEE)
        .unwrap();
    let second = node
        .create_transaction(&Wallet::new().unwrap().get_address(), 2000, TEST_FEE)
        .unwrap();
    assert_eq!(
        first.get_vin()[0].get_prev_txid(),
        second.get_vin()[0].get_prev_txid()
    );

    let snapshot = node.utxo_snapshot();
    mempool.add_transaction(first, &snapshot).unwrap();
    let err = mempool.add_transaction(second.clone(), &snapshot).unwrap_err();
    assert!(err.to_string().contains("Conflicting spend"));

    // Only the pooled transaction makes it into the next block.
    let block = node.mine_new_block(&mempool, 1, 10).unwrap();
    assert_eq!(block.get_transactions().len(), 2);
    assert!(!block
        .get_transactions()
        .iter()
        .any(|tx| tx.get_id() == second.get_id()));
}

#[test]
fn block_rejected_when_it_does_not_extend_the_tip() {
    let (node, _dir) = new_node();
    let mempool = Mempool::new();
    node.mine_new_block(&mempool, 1, 10).unwrap();

    // A block built on the genesis hash no longer extends the tip.
    let stale = Block::with_timestamp(
        genesis_block().get_hash().to_vec(),
        vec![guri_chain::Transaction::new_coinbase(
            &node.address(),
            BLOCK_REWARD,
            b"stale".to_vec(),
        )
        .unwrap()],
        1,
        0,
    );
    let err = node.add_block(stale).unwrap_err();
    assert!(err.to_string().contains("does not extend the tip"));
    assert_eq!(node.chain_height(), 2);
}

#[test]
fn longer_valid_chain_replaces_the_local_one() {
    let (node_a, _dir_a) = new_node();
    let (node_b, _dir_b) = new_node();
    let mempool = Mempool::new();

    node_a.mine_new_block(&mempool, 1, 10).unwrap();
    node_b.mine_new_block(&mempool, 1, 10).unwrap();
    node_b.mine_new_block(&mempool, 1, 10).unwrap();

    assert_eq!(node_a.chain_height(), 2);
    assert_eq!(node_b.chain_height(), 3);

    // Equal or shorter chains are refused.
    assert!(!node_a.replace_chain(node_a.all_blocks()).unwrap());
    assert!(!node_b.replace_chain(node_a.all_blocks()).unwrap());

    // The longer chain wins and the UTXO set equals a fresh replay.
    assert!(node_a.replace_chain(node_b.all_blocks()).unwrap());
    assert_eq!(node_a.chain_height(), 3);
    assert_eq!(node_a.balance(&node_b.address()), 2 * BLOCK_REWARD);
    assert_eq!(node_a.balance(&node_a.address()), 0);
    assert_eq!(
        node_a.latest_block().unwrap().get_hash(),
        node_b.latest_block().unwrap().get_hash()
    );
}

#[test]
fn tampered_candidate_chain_is_refused() {
    let (node_a, _dir_a) = new_node();
    let (node_b, _dir_b) = new_node();
    let mempool = Mempool::new();

    node_b.mine_new_block(&mempool, 1, 10).unwrap();
    node_b.mine_new_block(&mempool, 1, 10).unwrap();

    let mut candidate = node_b.all_blocks();
    // Re-nonce the middle block: its hash changes and the link to the
    // next block breaks.
    let nonce = candidate[1].get_nonce();
    candidate[1].set_nonce(nonce.wrapping_add(1));

    assert!(!node_a.replace_chain(candidate).unwrap());
    assert_eq!(node_a.chain_height(), 1);
}

#[test]
fn chain_and_wallet_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let path = path.to_str().unwrap();

    let (address, tip_hash) = {
        let node = Blockchain::open(path).unwrap();
        let mempool = Mempool::new();
        node.mine_new_block(&mempool, 1, 10).unwrap();
        (node.address(), node.latest_block().unwrap().get_hash().to_vec())
    };

    let reopened = Blockchain::open(path).unwrap();
    assert_eq!(reopened.address(), address);
    assert_eq!(reopened.chain_height(), 2);
    assert_eq!(
        reopened.latest_block().unwrap().get_hash(),
        tip_hash.as_slice()
    );
    assert_eq!(reopened.balance(&address), BLOCK_REWARD);
}

#[test]
fn spent_outputs_are_annotated_on_the_chain_copy() {
    let (node, _dir) = new_node();
    let mempool = Mempool::new();
    node.mine_new_block(&mempool, 1, 10).unwrap();

    let recipient = Wallet::new().unwrap();
    let tx = node
        .create_transaction(&recipient.get_address(), 1000, TEST_FEE)
        .unwrap();
    let spender = tx.get_id_hex();
    mempool
        .add_transaction(tx, &node.utxo_snapshot())
        .unwrap();
    node.mine_new_block(&mempool, 1, 10).unwrap();

    // The first mined block's coinbase output is now marked spent.
    let funding_block = node.block_at_height(1).unwrap();
    let coinbase_output = &funding_block.get_transactions()[0].get_vout()[0];
    assert!(coinbase_output.is_spent());
    assert_eq!(coinbase_output.get_spender(), Some(spender.as_str()));
}
