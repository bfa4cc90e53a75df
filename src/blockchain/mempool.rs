//! Pending-transaction pool: insertion-ordered storage and per-initiator
//! deduplicated candidate selection.
//!
//! The distilled source iterated a language map (nondeterministic order) when
//! selecting candidates; this keeps entries in insertion order instead, so two
//! nodes with the same mempool contents always pick the same candidate set.

use std::collections::HashSet;

use crate::blockchain::chain::Chain;
use crate::blockchain::transaction::Tx;
use crate::error::NodeResult;

#[derive(Default)]
pub struct Mempool {
    entries: Vec<Tx>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `tx` to the pool unless its hash is already present.
    pub fn insert(&mut self, tx: Tx) {
        if !self.entries.iter().any(|existing| existing.hash == tx.hash) {
            self.entries.push(tx);
        }
    }

    /// Removes every entry whose hash appears in `hashes`. Used to clean up
    /// after a mining attempt includes them in a block.
    pub fn remove_many(&mut self, hashes: &[Vec<u8>]) {
        self.entries.retain(|tx| !hashes.contains(&tx.hash));
    }

    /// Selects the transactions eligible for inclusion in the next block: each
    /// must currently verify against the local tip, and at most one transaction
    /// per distinct initiator public key is kept (first-wins in insertion order).
    pub fn select_candidates(&self, chain: &Chain) -> NodeResult<Vec<Tx>> {
        let tip = chain.tip_hash()?;
        let mut seen_initiators: HashSet<Vec<u8>> = HashSet::new();
        let mut candidates = Vec::new();

        for tx in &self.entries {
            if seen_initiators.contains(&tx.initiator_pk) {
                continue;
            }
            if tx.verify(chain, tip.as_deref()).is_err() {
                continue;
            }
            seen_initiators.insert(tx.initiator_pk.clone());
            candidates.push(tx.clone());
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SledBlockStore;
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    fn test_chain() -> (Chain, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SledBlockStore::open("test-node", dir.path()).unwrap();
        (Chain::new(Box::new(store)), dir)
    }

    #[test]
    fn duplicate_initiator_only_keeps_first() {
        let (chain, _dir) = test_chain();
        let wallet = Wallet::generate().unwrap();

        let mut pool = Mempool::new();
        // Each call signs with a fresh ECDSA nonce, so these are two distinct,
        // independently-valid transactions from the same initiator key.
        let reward1 = Tx::build_reward(&wallet).unwrap();
        let reward2 = Tx::build_reward(&wallet).unwrap();
        assert_ne!(reward1.hash, reward2.hash);

        pool.insert(reward1.clone());
        pool.insert(reward2);

        let candidates = pool.select_candidates(&chain).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].hash, reward1.hash);
    }

    #[test]
    fn remove_many_clears_included_entries() {
        let wallet = Wallet::generate().unwrap();
        let mut pool = Mempool::new();
        let tx = Tx::build_reward(&wallet).unwrap();
        pool.insert(tx.clone());
        assert_eq!(pool.len(), 1);

        pool.remove_many(&[tx.hash.clone()]);
        assert!(pool.is_empty());
    }
}
