//! Peer protocol: wire messages and framing, outbound calls, fire-and-forget
//! broadcast to the configured roster, and the inbound RPC server.

pub mod broadcast;
pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{Ack, AddrMsg, BlockMsg, Message, TxMsg};
