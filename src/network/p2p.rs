//! Peer-to-peer node
//!
//! One listener thread accepts inbound connections; every peer gets its
//! own receive thread that reads frames and dispatches them. Broadcasts
//! walk the peer table and drop any peer whose send fails. Chain sync is
//! pull-based: `RequestChain` asks every peer for its full chain and a
//! strictly longer, fully valid response replaces the local one.

use crate::core::blockchain::Blockchain;
use crate::error::{BlockchainError, Result};
use crate::network::message::{read_message, Message, MessageKind};
use crate::network::peer::{Peer, PeerState};
use crate::storage::mempool::Mempool;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, RwLock};
use std::thread;

pub struct P2PNetwork {
    blockchain: Blockchain,
    mempool: Arc<Mempool>,
    peers: RwLock<HashMap<String, Arc<Peer>>>,
    listen_addr: RwLock<Option<SocketAddr>>,
}

impl P2PNetwork {
    pub fn new(blockchain: Blockchain, mempool: Arc<Mempool>) -> Arc<P2PNetwork> {
        Arc::new(P2PNetwork {
            blockchain,
            mempool,
            peers: RwLock::new(HashMap::new()),
            listen_addr: RwLock::new(None),
        })
    }

    /// The node's identity on the wire, its wallet address.
    fn node_id(&self) -> String {
        self.blockchain.address()
    }

    /// Bind the listener and start accepting peers. Port 0 picks an
    /// ephemeral port; `listen_addr` reports the bound address.
    pub fn start(self: &Arc<Self>, port: u16) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|e| BlockchainError::Network(format!("Bind port {port}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| BlockchainError::Network(format!("Listener address: {e}")))?;

        if let Ok(mut listen_addr) = self.listen_addr.write() {
            *listen_addr = Some(addr);
        }
        info!("Listening for peers on {addr}");

        let network = Arc::clone(self);
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Err(e) = network.adopt_stream(stream) {
                            warn!("Failed to adopt inbound connection: {e}");
                        }
                    }
                    Err(e) => warn!("Accept failed: {e}"),
                }
            }
        });

        Ok(addr)
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr.read().ok().and_then(|addr| *addr)
    }

    /// Dial a peer and start its receive thread.
    pub fn connect_to_peer(self: &Arc<Self>, host: &str, port: u16) -> Result<()> {
        let peer = Peer::connect(host, port)?;
        self.register_peer(Arc::new(peer))
    }

    fn adopt_stream(self: &Arc<Self>, stream: TcpStream) -> Result<()> {
        let peer = Peer::from_stream(stream)?;
        self.register_peer(Arc::new(peer))
    }

    fn register_peer(self: &Arc<Self>, peer: Arc<Peer>) -> Result<()> {
        let address = peer.address().to_string();
        {
            let mut peers = self.peers.write().map_err(|e| {
                BlockchainError::Network(format!("Failed to acquire peer table lock: {e}"))
            })?;
            peers.insert(address.clone(), Arc::clone(&peer));
        }
        info!("Peer {address} registered");

        let network = Arc::clone(self);
        thread::spawn(move || {
            network.receive_loop(peer);
        });
        Ok(())
    }

    /// Per-peer receive thread: read frames until the socket dies.
    fn receive_loop(self: &Arc<Self>, peer: Arc<Peer>) {
        let mut reader = match peer.reader() {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Peer {} has no readable socket: {e}", peer.address());
                self.drop_peer(peer.address());
                return;
            }
        };

        loop {
            match read_message(&mut reader) {
                Ok(message) => self.dispatch(&peer, message),
                Err(e) => {
                    debug!("Peer {} read ended: {e}", peer.address());
                    break;
                }
            }
        }

        peer.mark_disconnected();
        self.drop_peer(peer.address());
    }

    fn dispatch(self: &Arc<Self>, peer: &Arc<Peer>, message: Message) {
        debug!(
            "{} from {} via {}",
            message.kind.name(),
            message.sender_id,
            peer.address()
        );

        match message.kind {
            MessageKind::NewBlock(block) => {
                let hash = block.get_hash_hex();
                match self.blockchain.receive_block(block) {
                    Ok(()) => info!("Accepted block {hash} from {}", message.sender_id),
                    Err(e) => debug!("Rejected block {hash}: {e}"),
                }
            }
            MessageKind::NewTransaction(tx) => {
                let txid = tx.get_id_hex();
                let snapshot = self.blockchain.utxo_snapshot();
                match self.mempool.add_transaction(tx, &snapshot) {
                    Ok(()) => debug!("Pooled relayed transaction {txid}"),
                    Err(e) => debug!("Dropped relayed transaction {txid}: {e}"),
                }
            }
            MessageKind::RequestChain => {
                let chain = self.blockchain.all_blocks();
                match Message::new(MessageKind::ResponseChain(chain), self.node_id()) {
                    Ok(response) => {
                        if let Err(e) = peer.send(&response) {
                            warn!("Failed to answer chain request from {}: {e}", peer.address());
                        }
                    }
                    Err(e) => warn!("Failed to build chain response: {e}"),
                }
            }
            MessageKind::ResponseChain(blocks) => {
                match self.blockchain.replace_chain(blocks) {
                    Ok(true) => info!("Adopted longer chain from {}", message.sender_id),
                    Ok(false) => debug!("Kept local chain over {}'s", message.sender_id),
                    Err(e) => warn!("Chain replacement failed: {e}"),
                }
            }
            MessageKind::Ping => {
                if let Ok(pong) = Message::new(MessageKind::Pong, self.node_id()) {
                    let _ = peer.send(&pong);
                }
            }
            MessageKind::Pong => {
                debug!("Pong from {}", message.sender_id);
            }
        }
    }

    /// Send to every connected peer, dropping the ones that fail.
    pub fn broadcast(&self, kind: MessageKind) -> Result<()> {
        let message = Message::new(kind, self.node_id())?;
        let peers: Vec<Arc<Peer>> = {
            let table = self.peers.read().map_err(|e| {
                BlockchainError::Network(format!("Failed to acquire peer table lock: {e}"))
            })?;
            table.values().cloned().collect()
        };

        let mut failed = Vec::new();
        for peer in peers {
            if let Err(e) = peer.send(&message) {
                warn!("Broadcast to {} failed: {e}", peer.address());
                failed.push(peer.address().to_string());
            }
        }
        for address in failed {
            self.drop_peer(&address);
        }
        Ok(())
    }

    pub fn broadcast_block(&self, block: crate::core::block::Block) -> Result<()> {
        self.broadcast(MessageKind::NewBlock(block))
    }

    pub fn broadcast_transaction(&self, tx: crate::core::transaction::Transaction) -> Result<()> {
        self.broadcast(MessageKind::NewTransaction(tx))
    }

    /// Ask every peer for its chain; longer valid responses replace ours.
    pub fn request_chain_sync(&self) -> Result<()> {
        info!("Requesting chain sync from {} peer(s)", self.peer_count());
        self.broadcast(MessageKind::RequestChain)
    }

    fn drop_peer(&self, address: &str) {
        if let Ok(mut peers) = self.peers.write() {
            if let Some(peer) = peers.remove(address) {
                peer.disconnect();
                info!("Peer {address} dropped");
            }
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().map(|peers| peers.len()).unwrap_or(0)
    }

    /// Snapshot of the peer table for display.
    pub fn peers(&self) -> Vec<(String, PeerState)> {
        match self.peers.read() {
            Ok(peers) => peers
                .values()
                .map(|peer| (peer.address().to_string(), peer.state()))
                .collect(),
            Err(_) => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_node() -> (Arc<P2PNetwork>, Blockchain, Arc<Mempool>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let blockchain = Blockchain::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let mempool = Arc::new(Mempool::new());
        let network = P2PNetwork::new(blockchain.clone(), Arc::clone(&mempool));
        (network, blockchain, mempool, dir)
    }

    fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(50));
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn test_connect_registers_both_sides() {
        let (server, _, _, _dir_a) = test_node();
        let addr = server.start(0).unwrap();

        let (client, _, _, _dir_b) = test_node();
        client
            .connect_to_peer("127.0.0.1", addr.port())
            .unwrap();

        wait_for("both peer tables to fill", || {
            server.peer_count() == 1 && client.peer_count() == 1
        });
        assert_eq!(client.peers()[0].1, PeerState::Connected);
    }

    #[test]
    fn test_chain_sync_adopts_longer_chain() {
        let (server, server_chain, server_pool, _dir_a) = test_node();
        let addr = server.start(0).unwrap();
        server_chain.mine_new_block(&server_pool, 1, 10).unwrap();
        assert_eq!(server_chain.chain_height(), 2);

        let (client, client_chain, _, _dir_b) = test_node();
        client
            .connect_to_peer("127.0.0.1", addr.port())
            .unwrap();
        wait_for("connection", || client.peer_count() == 1);

        client.request_chain_sync().unwrap();
        wait_for("chain adoption", || client_chain.chain_height() == 2);
        assert_eq!(
            client_chain.latest_block().unwrap().get_hash(),
            server_chain.latest_block().unwrap().get_hash()
        );
    }

    #[test]
    fn test_new_block_broadcast_extends_peer() {
        let (server, server_chain, server_pool, _dir_a) = test_node();
        let addr = server.start(0).unwrap();

        let (client, client_chain, _, _dir_b) = test_node();
        client
            .connect_to_peer("127.0.0.1", addr.port())
            .unwrap();
        wait_for("connection", || server.peer_count() == 1);

        // Same genesis on both sides, so a mined block extends the peer.
        let block = server_chain.mine_new_block(&server_pool, 1, 10).unwrap();
        server.broadcast_block(block).unwrap();

        wait_for("block propagation", || client_chain.chain_height() == 2);
    }
}
