//! Fire-and-forget broadcast to every peer in the configured roster,
//! sequentially and without deduplication. Small rosters keep this
//! tractable. A transport failure is fatal: the caller is expected to let it
//! propagate up to the process's main loop.

use log::{debug, info};

use crate::config::RosterConfig;
use crate::error::NodeResult;
use crate::network::protocol::Message;
use crate::network::transport;

pub async fn broadcast(roster: &RosterConfig, message: &Message) -> NodeResult<()> {
    for (peer_id, endpoint) in &roster.peers {
        debug!("broadcasting to {} at {}", peer_id, endpoint);
        let ack = transport::call(endpoint, message).await?;
        if !ack.is_ack() {
            info!("peer {} replied without ACK: {:?}", peer_id, ack);
        }
    }
    Ok(())
}
