//! Cryptographic primitives assumed "provided" by spec.md §1: hashing and
//! ECDSA verification. Kept behind a small surface so callers never reach
//! for a hash/curve crate directly.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("malformed public key")]
    BadPublicKey,
    #[error("malformed signature")]
    BadSignature,
    #[error("signature verification failed")]
    VerificationFailed,
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derives the 25-byte canonical address body (20-byte RIPEMD160(SHA256(pubkey))
/// plus a 4-byte SHA256^2 integrity suffix) from a raw public key, per
/// spec.md §6 ("derives the 25-byte address from SHA256→RIPEMD160 plus a
/// 4-byte SHA256^2 suffix").
pub fn derive_address_bytes(pubkey: &[u8]) -> [u8; 25] {
    let hashed = ripemd160(&sha256(pubkey));
    let mut body = [0u8; 21];
    body[1..].copy_from_slice(&hashed);
    let checksum = double_sha256(&body);

    let mut out = [0u8; 25];
    out[..21].copy_from_slice(&body);
    out[21..].copy_from_slice(&checksum[..4]);
    out
}

/// Verifies `signature` over `message` under secp256k1 `pubkey`.
pub fn verify_ecdsa(pubkey: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| CryptoError::BadPublicKey)?;
    let sig = Signature::from_der(signature)
        .or_else(|_| Signature::from_slice(signature))
        .map_err(|_| CryptoError::BadSignature)?;
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}
