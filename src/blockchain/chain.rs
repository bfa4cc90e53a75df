//! The chain: fork-choice over a [`BlockStore`], plus the prev-hash iterator used
//! for balance accumulation and block/transaction verification.

use crate::blockchain::block::Block;
use crate::database::BlockStore;
use crate::error::{NodeError, NodeResult};

pub struct Chain {
    store: Box<dyn BlockStore>,
}

impl Chain {
    pub fn new(store: Box<dyn BlockStore>) -> Self {
        Chain { store }
    }

    pub fn tip_hash(&self) -> NodeResult<Option<Vec<u8>>> {
        self.store.read_tip()
    }

    pub fn tip_hash_and_height(&self) -> NodeResult<Option<(Vec<u8>, u64)>> {
        self.store.read_tip_with_height()
    }

    pub fn get_block(&self, hash: &[u8]) -> NodeResult<Option<Block>> {
        self.store.get_block(hash)
    }

    /// Walks from `start` down to genesis via `prev_hash` links. `start = None`
    /// yields an empty iteration (an empty chain has nothing to walk).
    pub fn iter_from<'a>(&'a self, start: Option<&[u8]>) -> ChainIter<'a> {
        ChainIter {
            chain: self,
            current: start.map(|h| h.to_vec()),
        }
    }

    /// Walks from the current tip down to genesis. Captures the tip hash at
    /// construction, per the spec's iterator contract.
    pub fn iter_from_tip(&self) -> NodeResult<ChainIter<'_>> {
        Ok(self.iter_from(self.tip_hash()?.as_deref()))
    }

    /// Walks from the tip looking for a stored block whose hash equals `target`.
    /// Used to validate `prev_hash` references an ancestor still on the local
    /// chain (the chain never deletes blocks, so an ancestor by an older tip
    /// remains reachable even after fork choice moves on).
    pub fn find_ancestor_with_hash(&self, target: &[u8]) -> NodeResult<Option<Block>> {
        for block in self.iter_from_tip()? {
            let block = block?;
            if block.hash == target {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    /// Verifies `block`, then applies it: persists it and runs Nakamoto
    /// fork-choice to decide whether it becomes the new tip.
    pub fn append_block(&self, block: Block) -> NodeResult<()> {
        block.verify(self)?;
        self.apply_fork_choice(block)
    }

    fn apply_fork_choice(&self, block: Block) -> NodeResult<()> {
        if block.is_genesis {
            return self.store.put_block(&block, true);
        }

        match self.tip_hash_and_height()? {
            None => self.store.put_block(&block, true),
            Some((tip_hash, tip_height)) => {
                let new_tip = if block.height > tip_height {
                    true
                } else if block.height == tip_height {
                    let tip_block = self.get_block(&tip_hash)?.ok_or_else(|| {
                        NodeError::StoreInconsistent(
                            "tip hash does not resolve to a stored block".into(),
                        )
                    })?;
                    Self::challenger_wins_tie(&tip_block, &block)
                } else {
                    false
                };
                self.store.put_block(&block, new_tip)
            }
        }
    }

    /// Earlier `time_ns` wins; if tied, the lexicographically greater hash wins.
    fn challenger_wins_tie(incumbent: &Block, challenger: &Block) -> bool {
        if challenger.time_ns != incumbent.time_ns {
            challenger.time_ns < incumbent.time_ns
        } else {
            challenger.hash.as_slice() > incumbent.hash.as_slice()
        }
    }
}

pub struct ChainIter<'a> {
    chain: &'a Chain,
    current: Option<Vec<u8>>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = NodeResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;
        match self.chain.get_block(&hash) {
            Ok(Some(block)) => {
                if !block.is_genesis {
                    self.current = Some(block.prev_hash.clone());
                }
                Some(Ok(block))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
