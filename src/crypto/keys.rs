//! P-256 ECDSA keypair generation, signing, and verification.
//!
//! Public keys and signatures are carried around the rest of the crate as raw byte
//! vectors (`initiator_pk: Vec<u8>`, `signature: Vec<u8>`) rather than as `p256` types,
//! since those are what gets hashed, serialized to disk, and put on the wire. This
//! module is the only place that touches the `p256` crate directly.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::elliptic_curve::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use p256::EncodedPoint;
use rand::rngs::OsRng;

use crate::error::{NodeError, NodeResult};

/// Raw (X ‖ Y) public key bytes, 64 bytes, no SEC1 tag. The wire/storage shape
/// the rest of the crate passes around as `initiator_pk`.
pub fn raw_public_key(signing_key: &SigningKey) -> Vec<u8> {
    let verifying_key = VerifyingKey::from(signing_key);
    let point = verifying_key.to_encoded_point(false);
    point.as_bytes()[1..].to_vec()
}

/// Reconstructs a `VerifyingKey` from raw (X ‖ Y) bytes, mirroring the split-in-half
/// reconstruction the original protocol performs on the wire.
pub fn verifying_key_from_raw(pk: &[u8]) -> NodeResult<VerifyingKey> {
    if pk.len() != 64 {
        return Err(NodeError::CryptoError(format!(
            "expected 64-byte raw public key, got {}",
            pk.len()
        )));
    }
    let encoded = EncodedPoint::from_untagged_bytes(p256::FieldBytes::from_slice(pk).into());
    let maybe_affine = p256::AffinePoint::from_encoded_point(&encoded);
    let affine = Option::<p256::AffinePoint>::from(maybe_affine)
        .ok_or_else(|| NodeError::CryptoError("public key is not on curve".into()))?;
    VerifyingKey::from_affine(affine)
        .map_err(|e| NodeError::CryptoError(format!("invalid verifying key: {e}")))
}

/// Generates a fresh signing key.
pub fn generate_keypair() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

/// Signs `msg` and returns the concatenated (r ‖ s) signature bytes.
pub fn sign(signing_key: &SigningKey, msg: &[u8]) -> Vec<u8> {
    let sig: Signature = signing_key.sign(msg);
    sig.to_bytes().to_vec()
}

/// Verifies a concatenated (r ‖ s) signature against raw (X ‖ Y) public key bytes.
pub fn verify(pk: &[u8], msg: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = verifying_key_from_raw(pk) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(msg, &sig).is_ok()
}

/// PKCS#8 DER encoding of a signing key, for the wallet file's `sk_pkcs8` field.
pub fn signing_key_to_pkcs8(signing_key: &SigningKey) -> NodeResult<Vec<u8>> {
    signing_key
        .to_pkcs8_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| NodeError::CryptoError(format!("pkcs8 encode failed: {e}")))
}

/// Inverse of [`signing_key_to_pkcs8`].
pub fn signing_key_from_pkcs8(der: &[u8]) -> NodeResult<SigningKey> {
    SigningKey::from_pkcs8_der(der)
        .map_err(|e| NodeError::CryptoError(format!("pkcs8 decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrip() {
        let sk = generate_keypair();
        let pk = raw_public_key(&sk);
        let msg = b"hello tipchain";
        let sig = sign(&sk, msg);
        assert!(verify(&pk, msg, &sig));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let sk = generate_keypair();
        let pk = raw_public_key(&sk);
        let sig = sign(&sk, b"original");
        assert!(!verify(&pk, b"tampered", &sig));
    }

    #[test]
    fn pkcs8_roundtrip() {
        let sk = generate_keypair();
        let der = signing_key_to_pkcs8(&sk).unwrap();
        let sk2 = signing_key_from_pkcs8(&der).unwrap();
        assert_eq!(raw_public_key(&sk), raw_public_key(&sk2));
    }
}
