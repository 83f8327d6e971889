//! Interactive shell
//!
//! A thin line-oriented front end over the node. Commands parse, call one
//! node operation and print the outcome; all chain logic lives below.

use crate::core::blockchain::{Blockchain, MAX_BLOCK_TRANSACTIONS};
use crate::error::Result;
use crate::network::p2p::P2PNetwork;
use crate::storage::mempool::Mempool;
use log::error;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Flat fee attached to shell-created payments.
pub const DEFAULT_FEE: u64 = 1000;

const DEFAULT_DIFFICULTY: u32 = 3;
const MAX_CLI_DIFFICULTY: u32 = 6;
const DEFAULT_LIST_COUNT: usize = 10;

struct NodeHandle {
    blockchain: Blockchain,
    mempool: Arc<Mempool>,
    network: Arc<P2PNetwork>,
}

pub struct Shell {
    node: Option<NodeHandle>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    pub fn new() -> Shell {
        Shell { node: None }
    }

    /// Open the chain at `path` and start listening on `port`.
    pub fn start_node(&mut self, port: u16, path: &str) -> Result<()> {
        if self.node.is_some() {
            println!("Node already started");
            return Ok(());
        }
        let blockchain = Blockchain::open(path)?;
        let mempool = Arc::new(Mempool::new());
        let network = P2PNetwork::new(blockchain.clone(), Arc::clone(&mempool));
        let addr = network.start(port)?;
        println!(
            "Node started on {addr}, address {}, height {}",
            blockchain.address(),
            blockchain.chain_height()
        );
        self.node = Some(NodeHandle {
            blockchain,
            mempool,
            network,
        });
        Ok(())
    }

    /// Read commands from stdin until `exit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        print_help();
        loop {
            print!("> ");
            io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            if !self.handle_line(line.trim()) {
                break;
            }
        }
        Ok(())
    }

    /// Returns false when the shell should exit.
    pub fn handle_line(&mut self, line: &str) -> bool {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            return true;
        };

        match command {
            "start" => self.cmd_start(args),
            "connect" => self.cmd_connect(args),
            "status" => self.cmd_status(),
            "balance" => self.cmd_balance(args),
            "send" => self.cmd_send(args),
            "mine" => self.cmd_mine(args),
            "mempool" => self.cmd_mempool(),
            "peers" => self.cmd_peers(),
            "sync" => self.cmd_sync(),
            "list" => self.cmd_list(args),
            "block" => self.cmd_block(args),
            "help" => print_help(),
            "exit" => return false,
            other => println!("Unknown command '{other}', try 'help'"),
        }
        true
    }

    fn node(&self) -> Option<&NodeHandle> {
        if self.node.is_none() {
            println!("Node not started, use: start <port> <path>");
        }
        self.node.as_ref()
    }

    fn cmd_start(&mut self, args: &[&str]) {
        let (Some(port), Some(path)) = (args.first(), args.get(1)) else {
            println!("Usage: start <port> <path>");
            return;
        };
        let Ok(port) = port.parse::<u16>() else {
            println!("Invalid port '{port}'");
            return;
        };
        if let Err(e) = self.start_node(port, path) {
            error!("Failed to start node: {e}");
            println!("Failed to start node: {e}");
        }
    }

    fn cmd_connect(&self, args: &[&str]) {
        let Some(node) = self.node() else { return };
        let (Some(host), Some(port)) = (args.first(), args.get(1)) else {
            println!("Usage: connect <host> <port>");
            return;
        };
        let Ok(port) = port.parse::<u16>() else {
            println!("Invalid port '{port}'");
            return;
        };
        match node.network.connect_to_peer(host, port) {
            Ok(()) => println!("Connected to {host}:{port}"),
            Err(e) => println!("Connect failed: {e}"),
        }
    }

    fn cmd_status(&self) {
        let Some(node) = self.node() else { return };
        let height = node.blockchain.chain_height();
        println!("Address:  {}", node.blockchain.address());
        println!("Height:   {height}");
        if let Some(tip) = node.blockchain.latest_block() {
            println!("Tip:      {}", tip.get_hash_hex());
        }
        println!("Balance:  {}", node.blockchain.balance(&node.blockchain.address()));
        println!("Mempool:  {} transaction(s)", node.mempool.len());
        println!("Peers:    {}", node.network.peer_count());
    }

    fn cmd_balance(&self, args: &[&str]) {
        let Some(node) = self.node() else { return };
        let address = args
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| node.blockchain.address());
        println!("Balance of {address}: {}", node.blockchain.balance(&address));
    }

    fn cmd_send(&self, args: &[&str]) {
        let Some(node) = self.node() else { return };
        let (Some(address), Some(amount)) = (args.first(), args.get(1)) else {
            println!("Usage: send <address> <amount>");
            return;
        };
        let Ok(amount) = amount.parse::<u64>() else {
            println!("Invalid amount '{amount}'");
            return;
        };

        let tx = match node.blockchain.create_transaction(address, amount, DEFAULT_FEE) {
            Ok(tx) => tx,
            Err(e) => {
                println!("Send failed: {e}");
                return;
            }
        };
        let snapshot = node.blockchain.utxo_snapshot();
        if let Err(e) = node.mempool.add_transaction(tx.clone(), &snapshot) {
            println!("Send failed: {e}");
            return;
        }
        if let Err(e) = node.network.broadcast_transaction(tx.clone()) {
            println!("Broadcast failed: {e}");
        }
        println!("Queued transaction {}", tx.get_id_hex());
    }

    fn cmd_mine(&self, args: &[&str]) {
        let Some(node) = self.node() else { return };
        let difficulty = match args.first() {
            Some(raw) => match raw.parse::<u32>() {
                Ok(d) if (1..=MAX_CLI_DIFFICULTY).contains(&d) => d,
                _ => {
                    println!("Difficulty must be 1-{MAX_CLI_DIFFICULTY}");
                    return;
                }
            },
            None => DEFAULT_DIFFICULTY,
        };

        match node
            .blockchain
            .mine_new_block(&node.mempool, difficulty, MAX_BLOCK_TRANSACTIONS)
        {
            Ok(block) => {
                println!(
                    "Mined block {} with {} transaction(s)",
                    block.get_hash_hex(),
                    block.get_transactions().len()
                );
                if let Err(e) = node.network.broadcast_block(block) {
                    println!("Broadcast failed: {e}");
                }
            }
            Err(e) => println!("Mining failed: {e}"),
        }
    }

    fn cmd_mempool(&self) {
        let Some(node) = self.node() else { return };
        let txs = node.mempool.all();
        println!("{} pooled transaction(s)", txs.len());
        for tx in txs {
            println!(
                "  {}  fee {}  ({} bytes)",
                tx.get_id_hex(),
                tx.get_fee(),
                tx.serialized_size()
            );
        }
    }

    fn cmd_peers(&self) {
        let Some(node) = self.node() else { return };
        let peers = node.network.peers();
        println!("{} peer(s)", peers.len());
        for (address, state) in peers {
            println!("  {address}  [{state}]");
        }
    }

    fn cmd_sync(&self) {
        let Some(node) = self.node() else { return };
        match node.network.request_chain_sync() {
            Ok(()) => println!("Requested chain from {} peer(s)", node.network.peer_count()),
            Err(e) => println!("Sync failed: {e}"),
        }
    }

    fn cmd_list(&self, args: &[&str]) {
        let Some(node) = self.node() else { return };
        let start = args.first().and_then(|s| s.parse().ok()).unwrap_or(0);
        let count = args
            .get(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LIST_COUNT);
        for (offset, block) in node.blockchain.blocks_range(start, count).iter().enumerate() {
            println!(
                "#{:<6} {}  {} tx  time {}",
                start + offset,
                block.get_hash_hex(),
                block.get_transactions().len(),
                block.get_timestamp()
            );
        }
    }

    fn cmd_block(&self, args: &[&str]) {
        let Some(node) = self.node() else { return };
        let Some(height) = args.first().and_then(|s| s.parse::<usize>().ok()) else {
            println!("Usage: block <height>");
            return;
        };
        let Some(block) = node.blockchain.block_at_height(height) else {
            println!("No block at height {height}");
            return;
        };

        println!("Block #{height} {}", block.get_hash_hex());
        println!("  prev:    {}", block.get_prev_hash_hex());
        println!("  nonce:   {}", block.get_nonce());
        println!("  time:    {}", block.get_timestamp());
        println!("  size:    {} bytes", block.size());
        for tx in block.get_transactions() {
            println!("  tx {}{}", tx.get_id_hex(), if tx.is_coinbase() { " (coinbase)" } else { "" });
            for output in tx.get_vout() {
                let spent = match output.get_spender() {
                    Some(spender) => format!("spent by {spender}"),
                    None if output.is_spent() => "spent".to_string(),
                    None => "unspent".to_string(),
                };
                println!(
                    "    -> {} to {} [{spent}]",
                    output.get_value(),
                    output.get_address()
                );
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start <port> <path>      start the node");
    println!("  connect <host> <port>    connect to a peer");
    println!("  status                   node summary");
    println!("  balance [address]        balance (default: own address)");
    println!("  send <address> <amount>  queue and broadcast a payment");
    println!("  mine [difficulty]        mine a block (1-{MAX_CLI_DIFFICULTY}, default {DEFAULT_DIFFICULTY})");
    println!("  mempool                  list pooled transactions");
    println!("  peers                    list peers");
    println!("  sync                     request chains from peers");
    println!("  list [start] [count]     list blocks");
    println!("  block <height>           show one block");
    println!("  help                     this text");
    println!("  exit                     quit");
}
