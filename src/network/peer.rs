//! A single peer connection
//!
//! Wraps one TCP socket. The write half sits behind a mutex so broadcasts
//! from different threads never interleave frames; the read half is a
//! cloned handle owned by the peer's receive thread.

use crate::config::GLOBAL_CONFIG;
use crate::error::{BlockchainError, Result};
use crate::network::message::{write_message, Message};
use log::debug;
use std::net::TcpStream;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Write timeout applied to every peer socket.
pub const TCP_WRITE_TIMEOUT_MS: u64 = 5000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerState::Connecting => write!(f, "connecting"),
            PeerState::Connected => write!(f, "connected"),
            PeerState::Disconnected => write!(f, "disconnected"),
        }
    }
}

pub struct Peer {
    address: String,
    writer: Mutex<TcpStream>,
    state: RwLock<PeerState>,
}

impl Peer {
    /// Dial an outbound connection.
    pub fn connect(host: &str, port: u16) -> Result<Peer> {
        debug!("Connecting to peer {host}:{port}");
        let stream = TcpStream::connect((host, port))
            .map_err(|e| BlockchainError::Network(format!("Connect to {host}:{port}: {e}")))?;
        Peer::from_stream(stream)
    }

    /// Adopt an accepted or freshly dialed socket.
    pub fn from_stream(stream: TcpStream) -> Result<Peer> {
        let address = stream
            .peer_addr()
            .map_err(|e| BlockchainError::Network(format!("Peer address unavailable: {e}")))?
            .to_string();

        stream.set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT_MS)))?;
        let read_timeout_secs = GLOBAL_CONFIG.get_peer_read_timeout_secs();
        if read_timeout_secs > 0 {
            stream.set_read_timeout(Some(Duration::from_secs(read_timeout_secs)))?;
        }

        Ok(Peer {
            address,
            writer: Mutex::new(stream),
            state: RwLock::new(PeerState::Connected),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> PeerState {
        match self.state.read() {
            Ok(state) => *state,
            Err(_) => PeerState::Disconnected,
        }
    }

    pub fn mark_disconnected(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = PeerState::Disconnected;
        }
    }

    /// Send one frame. Failures flip the peer to disconnected.
    pub fn send(&self, message: &Message) -> Result<()> {
        let mut stream = self.writer.lock().map_err(|e| {
            BlockchainError::Network(format!("Failed to acquire peer write lock: {e}"))
        })?;
        if let Err(e) = write_message(&mut *stream, message) {
            drop(stream);
            self.mark_disconnected();
            return Err(e);
        }
        Ok(())
    }

    /// A cloned read handle for the receive thread.
    pub fn reader(&self) -> Result<TcpStream> {
        let stream = self.writer.lock().map_err(|e| {
            BlockchainError::Network(format!("Failed to acquire peer write lock: {e}"))
        })?;
        Ok(stream.try_clone()?)
    }

    /// Shut the socket down; the receive thread unblocks with an error.
    pub fn disconnect(&self) {
        self.mark_disconnected();
        if let Ok(stream) = self.writer.lock() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
