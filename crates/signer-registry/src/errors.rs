//! Error types for signer registry operations.

use bridge_types::{Address, ErrorKind};
use thiserror::Error;

/// Errors that can occur while verifying or mutating a signer registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Signature bundle has no entries.
    #[error("empty signature bundle")]
    EmptyBundle,

    /// Bundle length is not a whole number of signature entries.
    #[error("malformed signature bundle: length {len} is not a multiple of 65")]
    MalformedBundle { len: usize },

    /// Entry could not be decoded or no key recovers from it.
    #[error("invalid signature at index {index}")]
    InvalidSignature { index: usize },

    /// Recovered signer is not strictly greater than the previous one.
    #[error("signer at index {index} is duplicated or out of order")]
    UnsortedSigners { index: usize },

    /// Fewer member signatures than the threshold.
    #[error("insufficient signatures: provided {provided}, required {required}")]
    InsufficientSignatures { provided: usize, required: usize },

    /// Threshold of zero.
    #[error("invalid threshold: {threshold}")]
    InvalidThreshold { threshold: u32 },

    /// Operation would leave fewer signers than the threshold.
    #[error("signer shortage: {signers} signers cannot meet threshold {threshold}")]
    SignerShortage { signers: usize, threshold: u32 },

    /// Zero address used as a signer.
    #[error("invalid signer address {0}")]
    InvalidSigner(Address),

    /// Signer is already a member.
    #[error("signer {0} already exists")]
    SignerAlreadyExists(Address),

    /// Signer is not a member.
    #[error("signer {0} not found")]
    SignerNotFound(Address),

    /// Authorization was checked against a nonce that has since moved.
    #[error("stale authorization: registry nonce is {expected}, authorization was for {actual}")]
    StaleAuthorization { expected: u64, actual: u64 },

    /// Secret key bytes are not a valid secp256k1 scalar.
    #[error("invalid secret key")]
    InvalidSecretKey,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientSignatures { .. } | Self::StaleAuthorization { .. } => {
                ErrorKind::Authorization
            }
            Self::SignerAlreadyExists(_) | Self::SignerNotFound(_) => ErrorKind::StateConflict,
            _ => ErrorKind::Validation,
        }
    }
}
