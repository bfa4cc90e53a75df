//! SHA-256 helpers shared by transaction hashing, block hashing, and address
//! derivation.

use sha2::{Digest, Sha256};

pub type Hash32 = [u8; 32];

pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256d(data: &[u8]) -> Hash32 {
    sha256(&sha256(data))
}

/// `be64` from the spec: an 8-byte big-endian encoding of a 64-bit field, used when
/// assembling the block mid-hash input.
pub fn be64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}
