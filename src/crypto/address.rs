//! Address derivation: Base58Check over RIPEMD160(SHA256(pk)).

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::{NodeError, NodeResult};

const VERSION: u8 = 0x00;

/// `Base58(0x00 ‖ RIPEMD160(SHA256(pk)) ‖ checksum4)` where `checksum4` is the first
/// four bytes of `SHA256(SHA256(0x00 ‖ RIPEMD160(SHA256(pk))))`.
pub fn derive_address(pk: &[u8]) -> String {
    let sha = Sha256::digest(pk);
    let ripemd = Ripemd160::digest(sha);

    let mut payload = Vec::with_capacity(1 + ripemd.len());
    payload.push(VERSION);
    payload.extend_from_slice(&ripemd);

    let checksum_full = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum_full[0..4]);

    bs58::encode(payload).into_string()
}

/// Strips the version byte and checksum, returning the raw RIPEMD160(SHA256(pk)) hash.
/// Fails if the checksum does not match, guarding against transcription errors.
pub fn decode_address(address: &str) -> NodeResult<Vec<u8>> {
    let payload = bs58::decode(address)
        .into_vec()
        .map_err(|e| NodeError::CryptoError(format!("invalid base58 address: {e}")))?;
    if payload.len() < 1 + 20 + 4 {
        return Err(NodeError::CryptoError("address too short".into()));
    }
    let (versioned_hash, checksum) = payload.split_at(payload.len() - 4);
    let checksum_full = Sha256::digest(Sha256::digest(versioned_hash));
    if &checksum_full[0..4] != checksum {
        return Err(NodeError::CryptoError("address checksum mismatch".into()));
    }
    Ok(versioned_hash[1..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys;

    #[test]
    fn address_roundtrips_through_checksum() {
        let sk = keys::generate_keypair();
        let pk = keys::raw_public_key(&sk);
        let address = derive_address(&pk);

        let sha = Sha256::digest(&pk);
        let expected_hash = Ripemd160::digest(sha);
        let decoded = decode_address(&address).unwrap();
        assert_eq!(decoded, expected_hash.to_vec());
    }

    #[test]
    fn tampered_address_fails_checksum() {
        let sk = keys::generate_keypair();
        let pk = keys::raw_public_key(&sk);
        let mut address = derive_address(&pk);
        address.push('x');
        assert!(decode_address(&address).is_err());
    }
}
