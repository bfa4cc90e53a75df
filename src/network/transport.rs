//! Outbound RPC calls: dial a peer, send one framed [`Message`], and read
//! back its [`Ack`]. Every call is a single request/response round trip.
//! There is no persistent connection pooling, matching the one-shot dial per
//! message the distilled source used.

use tokio::net::TcpStream;

use crate::error::{NodeError, NodeResult};
use crate::network::protocol::{read_framed, write_framed, Ack, Message};

pub async fn call(endpoint: &str, message: &Message) -> NodeResult<Ack> {
    let mut stream = TcpStream::connect(endpoint)
        .await
        .map_err(|e| NodeError::TransportError(format!("dialing {}: {}", endpoint, e)))?;

    write_framed(&mut stream, message).await?;
    read_framed(&mut stream).await
}
