//! Peer-to-peer networking
//!
//! Length-prefixed JSON frames over TCP, a closed message enum, one
//! receive thread per peer.

pub mod message;
pub mod p2p;
pub mod peer;

pub use message::{read_message, write_message, Message, MessageKind, MAX_MESSAGE_SIZE};
pub use p2p::P2PNetwork;
pub use peer::{Peer, PeerState, TCP_WRITE_TIMEOUT_MS};
