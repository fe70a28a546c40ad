use thiserror::Error;

/// Errors shared across crates at the data-model layer. Transport/storage/
/// protocol-specific errors live in the `node` crate closer to where they
/// are raised (spec.md §7 error-kind taxonomy).
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid address encoding: {0}")]
    InvalidAddress(String),
    #[error("invalid hash encoding: {0}")]
    InvalidHash(String),
    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),
}
