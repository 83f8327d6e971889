//! Wire protocol
//!
//! The peer protocol is a closed set of six message kinds wrapped in an
//! envelope carrying the sender id and a timestamp. Frames on the wire are
//! a 4-byte big-endian length prefix followed by the JSON body; there is
//! no other traffic on a peer socket.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::error::{BlockchainError, Result};
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Hard cap on a single frame. A full chain response stays well under
/// this at the scales this node targets.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MessageKind {
    NewBlock(Block),
    NewTransaction(Transaction),
    RequestChain,
    ResponseChain(Vec<Block>),
    Ping,
    Pong,
}

impl MessageKind {
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::NewBlock(_) => "NEW_BLOCK",
            MessageKind::NewTransaction(_) => "NEW_TRANSACTION",
            MessageKind::RequestChain => "REQUEST_CHAIN",
            MessageKind::ResponseChain(_) => "RESPONSE_CHAIN",
            MessageKind::Ping => "PING",
            MessageKind::Pong => "PONG",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub sender_id: String,
    pub timestamp: i64,
}

impl Message {
    pub fn new(kind: MessageKind, sender_id: String) -> Result<Message> {
        Ok(Message {
            kind,
            sender_id,
            timestamp: current_timestamp()?,
        })
    }
}

/// Write one length-prefixed frame.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(BlockchainError::Network(format!(
            "Refusing to send oversized frame of {} bytes",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(BlockchainError::Network(format!(
            "Peer announced an oversized frame of {len} bytes"
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(serde_json::from_slice(&payload)?)
}
