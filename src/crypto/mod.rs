//! External cryptographic primitives the chain engine consumes: keypair
//! generation, signing/verification over P-256, SHA-256 hashing, and address
//! derivation. The rest of the crate only ever calls through these functions.
//! No other module touches `p256`, `sha2`, `ripemd`, or `bs58` directly.

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{decode_address, derive_address};
pub use hash::{be64, sha256, sha256d, Hash32};
pub use keys::{generate_keypair, raw_public_key, sign, verify};
