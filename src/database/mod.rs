//! The block store: a transactional key→bytes mapping with a distinguished tip key,
//! backed by `sled`. This is the one place the chain engine touches a persistence
//! engine; everything above it only calls through [`BlockStore`].

use std::path::Path;

use crate::blockchain::block::Block;
use crate::error::{NodeError, NodeResult};

/// The special key whose value is the current tip's hash, per the external
/// interface contract (one byte, ASCII 'l').
const TIP_KEY: &[u8] = b"l";

pub trait BlockStore: Send + Sync {
    fn read_tip(&self) -> NodeResult<Option<Vec<u8>>>;

    /// Reads the tip hash and the tip block's height as a single atomic view.
    /// The corrected replacement for two separate reads; see the design notes
    /// on the prev-hash/tip race.
    fn read_tip_with_height(&self) -> NodeResult<Option<(Vec<u8>, u64)>>;

    fn get_block(&self, hash: &[u8]) -> NodeResult<Option<Block>>;

    fn put_block(&self, block: &Block, new_tip: bool) -> NodeResult<()>;
}

pub struct SledBlockStore {
    db: sled::Db,
}

impl SledBlockStore {
    /// Opens (creating if absent) the per-node persistent store.
    pub fn open(node_id: &str, data_dir: &Path) -> NodeResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| NodeError::ConfigError(e.to_string()))?;
        let path = data_dir.join(format!("blockchain-{node_id}.db"));
        let db = sled::open(path)?;
        Ok(SledBlockStore { db })
    }

    fn deserialize_block(bytes: &[u8]) -> NodeResult<Block> {
        bincode::deserialize(bytes).map_err(NodeError::from)
    }

    fn serialize_block(block: &Block) -> NodeResult<Vec<u8>> {
        bincode::serialize(block).map_err(NodeError::from)
    }
}

impl BlockStore for SledBlockStore {
    fn read_tip(&self) -> NodeResult<Option<Vec<u8>>> {
        Ok(self.db.get(TIP_KEY)?.map(|v| v.to_vec()))
    }

    fn read_tip_with_height(&self) -> NodeResult<Option<(Vec<u8>, u64)>> {
        // Both reads happen inside one sled transaction so the tip hash and the
        // block it names are observed as a single consistent snapshot.
        let result = self
            .db
            .transaction(|tx_db| {
                let Some(tip) = tx_db.get(TIP_KEY)? else {
                    return Ok(None);
                };
                let tip = tip.to_vec();
                let Some(bytes) = tx_db.get(tip.as_slice())? else {
                    return Ok(None);
                };
                Ok(Some((tip, bytes.to_vec())))
            })
            .map_err(|e: sled::transaction::TransactionError<sled::Error>| match e {
                sled::transaction::TransactionError::Storage(e) => NodeError::StoreIoError(e),
                sled::transaction::TransactionError::Abort(e) => NodeError::StoreIoError(e),
            })?;

        match result {
            None => Ok(None),
            Some((tip, bytes)) => {
                let block = Self::deserialize_block(&bytes)?;
                Ok(Some((tip, block.height)))
            }
        }
    }

    fn get_block(&self, hash: &[u8]) -> NodeResult<Option<Block>> {
        match self.db.get(hash)? {
            Some(bytes) => Ok(Some(Self::deserialize_block(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_block(&self, block: &Block, new_tip: bool) -> NodeResult<()> {
        let bytes = Self::serialize_block(block)?;
        let hash = block.hash.clone();
        self.db
            .transaction(move |tx_db| {
                tx_db.insert(hash.as_slice(), bytes.as_slice())?;
                if new_tip {
                    tx_db.insert(TIP_KEY, hash.as_slice())?;
                }
                Ok::<_, sled::transaction::ConflictableTransactionError<sled::Error>>(())
            })
            .map_err(|e: sled::transaction::TransactionError<sled::Error>| match e {
                sled::transaction::TransactionError::Storage(e) => NodeError::StoreIoError(e),
                sled::transaction::TransactionError::Abort(e) => NodeError::StoreIoError(e),
            })?;
        self.db.flush().map_err(NodeError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::Block;
    use tempfile::tempdir;

    fn genesis_block() -> Block {
        Block {
            txs: vec![],
            tx_digest: vec![0; 32],
            prev_hash: vec![],
            time_ns: 1,
            nonce: 0,
            height: 0,
            is_genesis: true,
            hash: vec![1; 32],
        }
    }

    #[test]
    fn put_and_read_tip_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SledBlockStore::open("test-node", dir.path()).unwrap();
        assert!(store.read_tip().unwrap().is_none());

        let block = genesis_block();
        store.put_block(&block, true).unwrap();

        assert_eq!(store.read_tip().unwrap(), Some(block.hash.clone()));
        let (tip, height) = store.read_tip_with_height().unwrap().unwrap();
        assert_eq!(tip, block.hash);
        assert_eq!(height, 0);

        let fetched = store.get_block(&block.hash).unwrap().unwrap();
        assert_eq!(fetched.hash, block.hash);
    }

    #[test]
    fn put_block_without_new_tip_does_not_move_tip() {
        let dir = tempdir().unwrap();
        let store = SledBlockStore::open("test-node", dir.path()).unwrap();
        let genesis = genesis_block();
        store.put_block(&genesis, true).unwrap();

        let mut orphan = genesis_block();
        orphan.hash = vec![2; 32];
        store.put_block(&orphan, false).unwrap();

        assert_eq!(store.read_tip().unwrap(), Some(genesis.hash));
        assert!(store.get_block(&orphan.hash).unwrap().is_some());
    }
}
