//! The in-memory wallet (keypair + derived address) and its on-disk record.
//!
//! Full wallet orchestration (keypool management, recovery, interactive CLI) is out
//! of scope; this is the minimal collaborator contract the chain engine needs:
//! something it can sign transactions with and address rewards to, plus a thin
//! file format so a wallet survives a process restart.

use std::path::Path;

use p256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, keys};
use crate::error::{NodeError, NodeResult};

pub struct Wallet {
    pub signing_key: SigningKey,
    pub public_key: Vec<u8>,
    pub address: String,
}

/// The canonical-serialized record a wallet file holds, per the external interface
/// contract: `{ sk_pkcs8, pk_raw_xy, address }`.
#[derive(Serialize, Deserialize)]
struct WalletRecord {
    sk_pkcs8: Vec<u8>,
    pk_raw_xy: Vec<u8>,
    address: String,
}

impl Wallet {
    pub fn generate() -> NodeResult<Self> {
        let signing_key = keys::generate_keypair();
        Self::from_signing_key(signing_key)
    }

    fn from_signing_key(signing_key: SigningKey) -> NodeResult<Self> {
        let public_key = keys::raw_public_key(&signing_key);
        let address = crypto::derive_address(&public_key);
        Ok(Wallet {
            signing_key,
            public_key,
            address,
        })
    }

    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        crypto::sign(&self.signing_key, msg)
    }

    /// Writes `{sk_pkcs8, pk_raw_xy, address}` to `path` using the same canonical
    /// encoder used for on-disk blocks and on-wire messages.
    pub fn save(&self, path: impl AsRef<Path>) -> NodeResult<()> {
        let record = WalletRecord {
            sk_pkcs8: keys::signing_key_to_pkcs8(&self.signing_key)?,
            pk_raw_xy: self.public_key.clone(),
            address: self.address.clone(),
        };
        let bytes = bincode::serialize(&record)?;
        std::fs::write(path, bytes).map_err(|e| NodeError::ConfigError(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> NodeResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| NodeError::ConfigError(e.to_string()))?;
        let record: WalletRecord = bincode::deserialize(&bytes)?;
        let signing_key = keys::signing_key_from_pkcs8(&record.sk_pkcs8)?;
        let wallet = Self::from_signing_key(signing_key)?;
        debug_assert_eq!(wallet.address, record.address);
        Ok(wallet)
    }
}
