//! Signer Registry - threshold authorization for bridge operations
//!
//! A fixed, enumerable set of signers jointly authorizes state changes on one
//! ledger. Authorization is a flat bundle of 65-byte recoverable ECDSA
//! signatures over a message hash that commits to:
//! - the registry's current nonce (consumed once per authorized operation)
//! - the target contract identity and operation selector
//! - the encoded operation arguments
//!
//! Each signature is further bound to the ledger identifier, so a bundle
//! collected for one deployment cannot be replayed on another.

pub mod bundle;
pub mod errors;
pub mod keys;
pub mod registry;

pub use bundle::{assemble_bundle, ledger_bound_digest, recover_bundle, SIGNATURE_LEN};
pub use errors::RegistryError;
pub use keys::SignerKey;
pub use registry::{authorization_hash, Authorization, SignerRegistry};

/// The registry's own administrative calls
///
/// Signers commit to each call's 4-byte selector.
pub mod calls {
    alloy_sol_types::sol! {
        function addSigner(address signer, bytes signatures);
        function removeSigner(address signer, bytes signatures);
        function updateThreshold(uint256 threshold, bytes signatures);
    }
}

/// Selectors of the administrative calls
pub mod constants {
    use alloy_sol_types::SolCall;

    use crate::calls;

    pub const ADD_SIGNER: [u8; 4] = calls::addSignerCall::SELECTOR;
    pub const REMOVE_SIGNER: [u8; 4] = calls::removeSignerCall::SELECTOR;
    pub const UPDATE_THRESHOLD: [u8; 4] = calls::updateThresholdCall::SELECTOR;
}
