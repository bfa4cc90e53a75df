//! The RPC server: one accepted connection per task, each handling exactly
//! one request/response round trip before closing.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;

use crate::error::NodeResult;
use crate::network::protocol::{read_framed, write_framed, Message};
use crate::node::Node;

pub async fn run(node: Arc<Node>, listen_addr: SocketAddr) -> NodeResult<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(|e| crate::error::NodeError::TransportError(format!("binding {}: {}", listen_addr, e)))?;
    info!("machine {} listening on {}", node.node_id(), listen_addr);

    loop {
        let (stream, peer_addr) = listener.accept().await.map_err(|e| {
            crate::error::NodeError::TransportError(format!("accepting connection: {}", e))
        })?;
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(node, stream).await {
                warn!("connection from {} failed: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_connection(node: Arc<Node>, mut stream: tokio::net::TcpStream) -> NodeResult<()> {
    let message: Message = read_framed(&mut stream).await?;

    let ack = match message {
        Message::Addr(msg) => node.handle_addr(msg).await,
        Message::Tx(msg) => node.handle_tx(msg).await,
        Message::Block(msg) => node.handle_block(msg).await,
    };

    match ack {
        Ok(ack) => write_framed(&mut stream, &ack).await,
        Err(e) => {
            error!("fatal error handling message: {}", e);
            Err(e)
        }
    }
}
