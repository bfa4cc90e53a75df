//! Transaction data model: canonical serialization, build, and verify.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blockchain::chain::Chain;
use crate::crypto;
use crate::error::{NodeError, NodeResult};
use crate::wallet::Wallet;

/// Fixed block subsidy paid to a reward transaction's sole output.
pub const REWARD: u64 = 100;

/// Minimum number of mempool candidates required to trigger a mining attempt.
pub const THRESHOLD: usize = 1;

/// Distinguishes which verify clause failed, for diagnostics. Converts into
/// `NodeError::InvalidTx` via `From`, the same layering the teacher uses
/// between `UTXOError` and `BlockchainError`.
#[derive(Debug)]
pub enum TxError {
    UnknownOutput { tx_hash: String, out_index: u32 },
    DoubleSpend { tx_hash: String, out_index: u32 },
    PaymentsExceedInputs,
    RewardMalformed(String),
    HashMismatch,
    SignatureInvalid,
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::UnknownOutput { tx_hash, out_index } => {
                write!(f, "input references unknown output {tx_hash}:{out_index}")
            }
            TxError::DoubleSpend { tx_hash, out_index } => {
                write!(f, "input double-spends output {tx_hash}:{out_index}")
            }
            TxError::PaymentsExceedInputs => write!(f, "outputs exceed inputs"),
            TxError::RewardMalformed(reason) => write!(f, "malformed reward transaction: {reason}"),
            TxError::HashMismatch => write!(f, "hash mismatch"),
            TxError::SignatureInvalid => write!(f, "signature verification failed"),
        }
    }
}

impl std::error::Error for TxError {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct In {
    pub ref_tx_hash: Vec<u8>,
    pub out_index: u32,
    pub amount: u64,
}

/// `recipient` is the decoded pubkey-hash (`RIPEMD160(SHA256(pk))`), not the
/// Base58-encoded address string. That is what an output's locking condition
/// actually compares against, and it avoids re-deriving a checksum on every
/// comparison during chain walks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Out {
    pub amount: u64,
    pub recipient: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub initiator_pk: Vec<u8>,
    pub inputs: Vec<In>,
    pub outputs: Vec<Out>,
    pub is_reward: bool,
    pub signature: Vec<u8>,
    pub hash: Vec<u8>,
}

impl Tx {
    fn canonical_bytes(&self, zero_hash: bool, zero_signature: bool) -> Vec<u8> {
        let mut clone = self.clone();
        if zero_hash {
            clone.hash = Vec::new();
        }
        if zero_signature {
            clone.signature = Vec::new();
        }
        bincode::serialize(&clone).expect("Tx canonical encoding is infallible")
    }

    /// Both `hash` and `signature` zero-length. What gets signed.
    fn presign_bytes(&self) -> Vec<u8> {
        self.canonical_bytes(true, true)
    }

    /// `hash` zero-length, `signature` present. What gets hashed. Sign-then-hash:
    /// the signature must already be set before this is called.
    fn prehash_bytes(&self) -> Vec<u8> {
        self.canonical_bytes(true, false)
    }

    /// Builds, signs, and hashes the single fixed-amount reward transaction paid
    /// to the wallet's own address.
    pub fn build_reward(wallet: &Wallet) -> NodeResult<Tx> {
        let own_hash = crypto::decode_address(&wallet.address)?;
        let mut tx = Tx {
            initiator_pk: wallet.public_key.clone(),
            inputs: Vec::new(),
            outputs: vec![Out {
                amount: REWARD,
                recipient: own_hash,
            }],
            is_reward: true,
            signature: Vec::new(),
            hash: Vec::new(),
        };
        tx.signature = wallet.sign(&tx.presign_bytes());
        tx.hash = crypto::sha256(&tx.prehash_bytes()).to_vec();
        Ok(tx)
    }

    /// Walks the chain from the tip accumulating `wallet`'s unspent outputs until
    /// `amount` is met, then builds a signed, hashed transfer transaction with
    /// optional change back to the wallet.
    pub fn build(wallet: &Wallet, chain: &Chain, recipient_address: &str, amount: u64) -> NodeResult<Tx> {
        let recipient = crypto::decode_address(recipient_address)?;
        let own_hash = crypto::decode_address(&wallet.address)?;
        let (acc, spend) = accumulate_unspent(chain, &wallet.public_key, &own_hash, amount)?;
        if acc < amount {
            return Err(NodeError::InsufficientFunds {
                requested: amount,
                available: acc,
            });
        }

        let mut outputs = vec![Out {
            amount,
            recipient,
        }];
        if acc > amount {
            outputs.push(Out {
                amount: acc - amount,
                recipient: own_hash,
            });
        }

        let mut tx = Tx {
            initiator_pk: wallet.public_key.clone(),
            inputs: spend,
            outputs,
            is_reward: false,
            signature: Vec::new(),
            hash: Vec::new(),
        };
        tx.signature = wallet.sign(&tx.presign_bytes());
        tx.hash = crypto::sha256(&tx.prehash_bytes()).to_vec();
        Ok(tx)
    }

    /// Verifies every clause from the spec against `reference_tip`, the block
    /// hash whose ancestor path this transaction's inputs must resolve within.
    /// `None` means an empty chain (only valid for reward transactions, which
    /// skip the input check entirely).
    pub fn verify(&self, chain: &Chain, reference_tip: Option<&[u8]>) -> NodeResult<()> {
        if !self.is_reward {
            self.verify_inputs(chain, reference_tip)?;
        }
        self.verify_payments()?;
        self.verify_hash()?;
        self.verify_signature()?;
        Ok(())
    }

    fn verify_inputs(&self, chain: &Chain, reference_tip: Option<&[u8]>) -> NodeResult<()> {
        let mut existing: HashSet<(Vec<u8>, u32)> = HashSet::new();
        let mut consumed: HashSet<(Vec<u8>, u32)> = HashSet::new();
        for block in chain.iter_from(reference_tip) {
            let block = block?;
            for tx in &block.txs {
                for (index, _out) in tx.outputs.iter().enumerate() {
                    existing.insert((tx.hash.clone(), index as u32));
                }
                for input in &tx.inputs {
                    consumed.insert((input.ref_tx_hash.clone(), input.out_index));
                }
            }
        }

        for input in &self.inputs {
            let key = (input.ref_tx_hash.clone(), input.out_index);
            if !existing.contains(&key) {
                return Err(TxError::UnknownOutput {
                    tx_hash: hex::encode(&input.ref_tx_hash),
                    out_index: input.out_index,
                }
                .into());
            }
            if consumed.contains(&key) {
                return Err(TxError::DoubleSpend {
                    tx_hash: hex::encode(&input.ref_tx_hash),
                    out_index: input.out_index,
                }
                .into());
            }
        }
        Ok(())
    }

    fn verify_payments(&self) -> Result<(), TxError> {
        let total_out: u64 = self.outputs.iter().map(|o| o.amount).sum();
        if self.is_reward {
            if !self.inputs.is_empty() {
                return Err(TxError::RewardMalformed("reward tx must have no inputs".into()));
            }
            if self.outputs.len() != 1 || self.outputs[0].amount != REWARD {
                return Err(TxError::RewardMalformed(
                    "reward tx must have exactly one output of the fixed reward amount".into(),
                ));
            }
        } else {
            let total_in: u64 = self.inputs.iter().map(|i| i.amount).sum();
            if total_out > total_in {
                return Err(TxError::PaymentsExceedInputs);
            }
        }
        Ok(())
    }

    fn verify_hash(&self) -> Result<(), TxError> {
        let recomputed = crypto::sha256(&self.prehash_bytes());
        if recomputed.as_slice() != self.hash.as_slice() {
            return Err(TxError::HashMismatch);
        }
        Ok(())
    }

    fn verify_signature(&self) -> Result<(), TxError> {
        if self.is_reward {
            return Ok(());
        }
        let msg = self.presign_bytes();
        if !crypto::verify(&self.initiator_pk, &msg, &self.signature) {
            return Err(TxError::SignatureInvalid);
        }
        Ok(())
    }

    /// Full unspent-output walk for `wallet`, run to completion rather than
    /// stopping once a requested amount is met: the spendable balance of its
    /// address as of the chain's current tip.
    pub fn balance(wallet: &Wallet, chain: &Chain) -> NodeResult<u64> {
        let own_hash = crypto::decode_address(&wallet.address)?;
        let (acc, _spend) = accumulate_unspent(chain, &wallet.public_key, &own_hash, u64::MAX)?;
        Ok(acc)
    }
}

/// The unspent-output accumulation walk described in the spec: newest-first,
/// stopping as soon as `amount` is met. For each visited tx, outputs paying
/// `own_hash` are counted first, unless already excluded by a later (that is,
/// earlier-walked) spend from this same wallet. Only then, if that tx was
/// itself initiated by this wallet and is not a reward, do its own inputs get
/// recorded as exclusions for outputs visited afterward (further back in the
/// chain). Reversing that order would make every wallet spend immediately
/// exclude its own change output.
fn accumulate_unspent(
    chain: &Chain,
    initiator_pk: &[u8],
    own_hash: &[u8],
    amount: u64,
) -> NodeResult<(u64, Vec<In>)> {
    let mut used: HashMap<Vec<u8>, HashSet<u32>> = HashMap::new();
    let mut acc = 0u64;
    let mut spend = Vec::new();

    'walk: for block in chain.iter_from_tip()? {
        let block = block?;
        for tx in &block.txs {
            for (index, out) in tx.outputs.iter().enumerate() {
                if out.recipient != own_hash {
                    continue;
                }
                let index = index as u32;
                let already_excluded = used.get(&tx.hash).is_some_and(|set| set.contains(&index));
                if already_excluded {
                    continue;
                }
                acc += out.amount;
                spend.push(In {
                    ref_tx_hash: tx.hash.clone(),
                    out_index: index,
                    amount: out.amount,
                });
                if acc >= amount {
                    break 'walk;
                }
            }

            if tx.initiator_pk == initiator_pk && !tx.is_reward {
                for input in &tx.inputs {
                    used.entry(input.ref_tx_hash.clone())
                        .or_default()
                        .insert(input.out_index);
                }
            }
        }
    }

    Ok((acc, spend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::Block;
    use crate::database::SledBlockStore;
    use tempfile::tempdir;

    fn test_chain() -> (Chain, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SledBlockStore::open("test-node", dir.path()).unwrap();
        (Chain::new(Box::new(store)), dir)
    }

    #[test]
    fn reward_tx_signs_and_verifies() {
        let wallet = Wallet::generate().unwrap();
        let tx = Tx::build_reward(&wallet).unwrap();
        assert!(tx.verify_hash().is_ok());
        assert!(tx.verify_signature().is_ok());
        assert!(tx.verify_payments().is_ok());
    }

    #[test]
    fn build_fails_with_insufficient_funds_on_empty_chain() {
        let (chain, _dir) = test_chain();
        let wallet = Wallet::generate().unwrap();
        let recipient = Wallet::generate().unwrap();

        let result = Tx::build(&wallet, &chain, &recipient.address, 10);
        assert!(matches!(result, Err(NodeError::InsufficientFunds { .. })));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let wallet = Wallet::generate().unwrap();
        let mut tx = Tx::build_reward(&wallet).unwrap();
        tx.signature[0] ^= 0xff;
        assert!(tx.verify_signature().is_err());
    }

    /// Literal scenario 2: A pays 30 to B; the mined block also rewards A.
    /// After: A = 100 - 30 + 100 = 170, B = 30.
    #[test]
    fn simple_transfer_matches_scenario_two_balances() {
        let (chain, _dir) = test_chain();
        let wallet_a = Wallet::generate().unwrap();
        let wallet_b = Wallet::generate().unwrap();

        let genesis_reward = Tx::build_reward(&wallet_a).unwrap();
        let genesis = Block::mine(vec![genesis_reward], true, &chain).unwrap();
        chain.append_block(genesis).unwrap();

        let transfer = Tx::build(&wallet_a, &chain, &wallet_b.address, 30).unwrap();
        let reward = Tx::build_reward(&wallet_a).unwrap();
        let block = Block::mine(vec![transfer, reward], false, &chain).unwrap();
        chain.append_block(block).unwrap();

        assert_eq!(Tx::balance(&wallet_a, &chain).unwrap(), 170);
        assert_eq!(Tx::balance(&wallet_b, &chain).unwrap(), 30);
    }

    /// Literal scenario 3: T1 spends the genesis reward output paying 50 to
    /// B and is mined into b1. T2 then spends the same output paying 50 to
    /// C; verifying T2 against TIP = b1.hash must fail.
    #[test]
    fn double_spend_rejected_against_real_tip() {
        let (chain, _dir) = test_chain();
        let wallet_a = Wallet::generate().unwrap();
        let wallet_b = Wallet::generate().unwrap();
        let wallet_c = Wallet::generate().unwrap();

        let genesis_reward = Tx::build_reward(&wallet_a).unwrap();
        let genesis = Block::mine(vec![genesis_reward.clone()], true, &chain).unwrap();
        chain.append_block(genesis).unwrap();

        let t1 = Tx::build(&wallet_a, &chain, &wallet_b.address, 50).unwrap();
        let b1 = Block::mine(vec![t1], false, &chain).unwrap();
        chain.append_block(b1).unwrap();

        let mut t2 = Tx {
            initiator_pk: wallet_a.public_key.clone(),
            inputs: vec![In {
                ref_tx_hash: genesis_reward.hash.clone(),
                out_index: 0,
                amount: REWARD,
            }],
            outputs: vec![Out {
                amount: 50,
                recipient: crypto::decode_address(&wallet_c.address).unwrap(),
            }],
            is_reward: false,
            signature: Vec::new(),
            hash: Vec::new(),
        };
        t2.signature = wallet_a.sign(&t2.presign_bytes());
        t2.hash = crypto::sha256(&t2.prehash_bytes()).to_vec();

        let tip = chain.tip_hash().unwrap();
        let err = t2.verify(&chain, tip.as_deref()).unwrap_err();
        assert!(matches!(err, NodeError::InvalidTx(_)));
    }

    /// Literal scenario 6: an address with balance 5 attempts to pay 10.
    #[test]
    fn insufficient_funds_matches_scenario_six_balance_five() {
        let (chain, _dir) = test_chain();
        let wallet_a = Wallet::generate().unwrap();
        let wallet_b = Wallet::generate().unwrap();
        let wallet_d = Wallet::generate().unwrap();

        let genesis_reward = Tx::build_reward(&wallet_a).unwrap();
        let genesis = Block::mine(vec![genesis_reward], true, &chain).unwrap();
        chain.append_block(genesis).unwrap();

        let spend_down = Tx::build(&wallet_a, &chain, &wallet_b.address, 95).unwrap();
        let block = Block::mine(vec![spend_down], false, &chain).unwrap();
        chain.append_block(block).unwrap();

        assert_eq!(Tx::balance(&wallet_a, &chain).unwrap(), 5);

        let result = Tx::build(&wallet_a, &chain, &wallet_d.address, 10);
        assert!(matches!(
            result,
            Err(NodeError::InsufficientFunds {
                requested: 10,
                available: 5
            })
        ));
    }
}
