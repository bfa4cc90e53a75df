//! The node: owns the chain, mempool, and known-address table behind their
//! three independent exclusions, and implements the RPC handlers that drive
//! them from incoming [`Message`]s.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use crate::blockchain::{Block, Chain, Mempool, Tx, REWARD, THRESHOLD};
use crate::config::Config;
use crate::database::SledBlockStore;
use crate::error::{NodeError, NodeResult};
use crate::network::broadcast;
use crate::network::protocol::{AddrMsg, Ack, BlockMsg, Message, TxMsg};
use crate::wallet::Wallet;

pub struct Node {
    node_id: String,
    chain: Arc<Chain>,
    mempool: Mutex<Mempool>,
    addrs: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    chain_write: Mutex<()>,
    wallet: Arc<Wallet>,
    config: Config,
}

impl Node {
    /// Opens the on-disk chain store and this node's wallet (generating and
    /// persisting one on first start), matching the teacher's `data_dir`
    /// layout convention.
    pub fn open(config: Config) -> NodeResult<Arc<Node>> {
        std::fs::create_dir_all(&config.node.data_dir)
            .map_err(|e| NodeError::ConfigError(e.to_string()))?;

        let store = SledBlockStore::open(&config.node.node_id, &config.node.data_dir)?;
        let chain = Arc::new(Chain::new(Box::new(store)));

        let wallet_path = config.wallet_file();
        let wallet = if wallet_path.exists() {
            Wallet::load(&wallet_path)?
        } else {
            let wallet = Wallet::generate()?;
            wallet.save(&wallet_path)?;
            wallet
        };
        info!("node {} ready, address {}", config.node.node_id, wallet.address);

        Ok(Arc::new(Node {
            node_id: config.node.node_id.clone(),
            chain,
            mempool: Mutex::new(Mempool::new()),
            addrs: Mutex::new(HashMap::new()),
            chain_write: Mutex::new(()),
            wallet: Arc::new(wallet),
            config,
        }))
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Mines and appends the genesis block: a single reward transaction
    /// paying this node's own address.
    pub async fn mine_genesis(self: &Arc<Self>) -> NodeResult<()> {
        let reward = Tx::build_reward(&self.wallet)?;
        let chain = Arc::clone(&self.chain);
        let block = mine_blocking(vec![reward], true, chain).await?;

        let _guard = self.chain_write.lock().await;
        self.chain.append_block(block)?;
        info!("machine {} mined genesis block", self.node_id);
        Ok(())
    }

    /// Broadcasts this node's own address to every configured peer.
    pub async fn announce_address(&self) -> NodeResult<()> {
        let msg = Message::Addr(AddrMsg {
            addr: crate::crypto::decode_address(&self.wallet.address)?,
            node_id: self.node_id.clone(),
        });
        broadcast::broadcast(&self.config.roster, &msg).await
    }

    /// Handler for an incoming `MsgAddr`: records the sender's address under
    /// the address-table exclusion.
    pub async fn handle_addr(&self, msg: AddrMsg) -> NodeResult<Ack> {
        let mut addrs = self.addrs.lock().await;
        addrs.entry(msg.node_id).or_default().push(msg.addr);
        Ok(Ack::ok())
    }

    /// Returns every address this node has learned of from `node_id`.
    pub async fn known_addresses(&self, node_id: &str) -> Vec<Vec<u8>> {
        self.addrs.lock().await.get(node_id).cloned().unwrap_or_default()
    }

    /// Handler for an incoming `MsgTx`: inserts into the mempool and attempts
    /// to mine, all under one held mempool exclusion.
    pub async fn handle_tx(self: &Arc<Self>, msg: TxMsg) -> NodeResult<Ack> {
        let mut pool = self.mempool.lock().await;
        pool.insert(msg.tx);
        self.attempt_mine(&mut pool).await?;
        Ok(Ack::ok())
    }

    /// Handler for an incoming `MsgBlock`: appends under the chain-write
    /// exclusion. An invalid block is logged and dropped; the reply is
    /// always `ACK` on receipt per the error-handling policy.
    pub async fn handle_block(&self, msg: BlockMsg) -> NodeResult<Ack> {
        let _guard = self.chain_write.lock().await;
        match self.chain.append_block(msg.block) {
            Ok(()) => Ok(Ack::ok()),
            Err(NodeError::InvalidBlock(reason)) => {
                warn!("rejected invalid block: {}", reason);
                Ok(Ack::ok())
            }
            Err(e) => Err(e),
        }
    }

    /// Selects mempool candidates, mines a block rewarding this node if the
    /// threshold is met, appends it, and broadcasts it. Called with the
    /// mempool lock already held. A mining attempt that fails the
    /// threshold returns immediately without releasing and reacquiring it.
    async fn attempt_mine(self: &Arc<Self>, pool: &mut Mempool) -> NodeResult<()> {
        let candidates = pool.select_candidates(&self.chain)?;
        if candidates.len() < THRESHOLD {
            return Ok(());
        }

        let reward = Tx::build_reward(&self.wallet)?;
        let mut txs = candidates;
        txs.push(reward);

        let chain = Arc::clone(&self.chain);
        let block = mine_blocking(txs, false, chain).await?;

        {
            let _guard = self.chain_write.lock().await;
            self.chain.append_block(block.clone())?;
        }
        info!("machine {} mined block at height {}", self.node_id, block.height);

        let included: Vec<Vec<u8>> = block.txs.iter().map(|tx| tx.hash.clone()).collect();
        pool.remove_many(&included);

        broadcast::broadcast(&self.config.roster, &Message::Block(BlockMsg { block })).await
    }
}

/// Runs the CPU-bound proof-of-work loop off the async executor's worker
/// threads, per the concurrency model's suspension-point contract.
async fn mine_blocking(txs: Vec<Tx>, is_genesis: bool, chain: Arc<Chain>) -> NodeResult<Block> {
    tokio::task::spawn_blocking(move || Block::mine(txs, is_genesis, &chain))
        .await
        .map_err(|e| NodeError::StoreInconsistent(format!("mining task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(node_id: &str, dir: &std::path::Path) -> Config {
        let mut config = Config::new(node_id.to_string());
        config.node.data_dir = dir.to_path_buf();
        config
    }

    /// Literal scenario 1: after mining genesis, this node's own address
    /// holds the full reward and an unrelated address holds nothing.
    #[tokio::test]
    async fn mine_genesis_sets_tip_and_balance() {
        let dir = tempdir().unwrap();
        let node = Node::open(test_config("node-a", dir.path())).unwrap();
        node.mine_genesis().await.unwrap();

        let tip = node.chain().tip_hash().unwrap();
        assert!(tip.is_some());

        assert_eq!(Tx::balance(node.wallet(), node.chain()).unwrap(), REWARD);

        let other = Wallet::generate().unwrap();
        assert_eq!(Tx::balance(&other, node.chain()).unwrap(), 0);
    }

    #[tokio::test]
    async fn handle_addr_records_sender() {
        let dir = tempdir().unwrap();
        let node = Node::open(test_config("node-b", dir.path())).unwrap();

        let ack = node
            .handle_addr(AddrMsg {
                addr: vec![9, 9, 9],
                node_id: "peer-1".to_string(),
            })
            .await
            .unwrap();
        assert!(ack.is_ack());

        let known = node.known_addresses("peer-1").await;
        assert_eq!(known, vec![vec![9, 9, 9]]);
    }

    #[tokio::test]
    async fn handle_tx_mines_when_threshold_met() {
        let dir = tempdir().unwrap();
        let node = Node::open(test_config("node-c", dir.path())).unwrap();
        node.mine_genesis().await.unwrap();

        let tip_before = node.chain().tip_hash().unwrap();
        // A reward tx is only ever synthesized by `attempt_mine` itself, never
        // submitted over the wire. Exercise the realistic path instead: a spend
        // of the genesis reward, so the mined block ends up with exactly one
        // reward tx.
        let recipient = Wallet::generate().unwrap();
        let tx = Tx::build(node.wallet(), node.chain(), &recipient.address, 10).unwrap();
        let ack = node.handle_tx(TxMsg { tx }).await.unwrap();
        assert!(ack.is_ack());

        let tip_after = node.chain().tip_hash().unwrap();
        assert_ne!(tip_before, tip_after);
    }

    #[tokio::test]
    async fn handle_block_rejects_invalid_without_erroring() {
        let dir = tempdir().unwrap();
        let node = Node::open(test_config("node-d", dir.path())).unwrap();
        node.mine_genesis().await.unwrap();

        let mut bogus = node
            .chain()
            .get_block(&node.chain().tip_hash().unwrap().unwrap())
            .unwrap()
            .unwrap();
        bogus.nonce = bogus.nonce.wrapping_add(1);
        bogus.hash = vec![0xaa; 32];

        let ack = node.handle_block(BlockMsg { block: bogus }).await.unwrap();
        assert!(ack.is_ack());
    }
}
