//! Wire messages and their length-prefixed framing.
//!
//! Three request kinds, each answered by a single `Ack` on success. Mirrors
//! the teacher's RPC-style request/response protocol, but framed over a plain
//! TCP stream instead of relying on an RPC crate.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::blockchain::{Block, Tx};
use crate::error::{NodeError, NodeResult};

/// A new wallet address, broadcast by the node that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddrMsg {
    pub addr: Vec<u8>,
    pub node_id: String,
}

/// A freshly built transaction, broadcast for inclusion in the mempool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxMsg {
    pub tx: Tx,
}

/// A freshly mined block, broadcast for the receiver's chain to append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMsg {
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Addr(AddrMsg),
    Tx(TxMsg),
    Block(BlockMsg),
}

/// Every successful handler reply. `r` is always `"ACK"`, kept as a string
/// field rather than a unit struct since that's the wire shape the spec's
/// reply record actually uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub r: String,
}

impl Ack {
    pub fn ok() -> Self {
        Ack { r: "ACK".to_string() }
    }

    pub fn is_ack(&self) -> bool {
        self.r == "ACK"
    }
}

/// Largest frame this node will read off the wire before giving up. Guards
/// against a malformed length prefix turning into an unbounded allocation.
const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Writes `value` as a 4-byte big-endian length prefix followed by its
/// canonical-serialized bytes.
pub async fn write_framed<W, T>(writer: &mut W, value: &T) -> NodeResult<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(value)?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await.map_err(|e| {
        NodeError::TransportError(format!("writing frame length: {}", e))
    })?;
    writer
        .write_all(&payload)
        .await
        .map_err(|e| NodeError::TransportError(format!("writing frame payload: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| NodeError::TransportError(format!("flushing frame: {}", e)))?;
    Ok(())
}

/// Reads one length-prefixed, canonical-serialized value from `reader`.
pub async fn read_framed<R, T>(reader: &mut R) -> NodeResult<T>
where
    R: AsyncReadExt + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| NodeError::TransportError(format!("reading frame length: {}", e)))?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(NodeError::MalformedMessage(format!(
            "frame of {} bytes exceeds {} byte limit",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| NodeError::TransportError(format!("reading frame payload: {}", e)))?;
    bincode::deserialize(&payload)
        .map_err(|e| NodeError::MalformedMessage(format!("decoding frame: {}", e)))
}
