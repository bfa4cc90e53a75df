//! The chain engine: block and transaction data model, proof-of-work mining,
//! validation, fork-choice, and the mempool's candidate-selection logic.

pub mod block;
pub mod chain;
pub mod mempool;
pub mod transaction;

pub use block::{Block, TBITS};
pub use chain::Chain;
pub use mempool::Mempool;
pub use transaction::{In, Out, Tx, REWARD, THRESHOLD};
