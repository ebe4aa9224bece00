//! Bridge Program - mainchain/sidechain asset bridge
//!
//! Two programs, one per ledger, each controlled by its own signer registry:
//! - MainchainBridge: locks origin assets, releases them on authorized
//!   reject or finalize-withdrawal
//! - SidechainBridge: mints wrapped assets for finalized deposits, burns
//!   them on withdrawal, re-mints on authorized reject
//!
//! Every authorized transition follows the same order: guards, signature
//! check, nonce consumption and record commit, then the asset movement.
//! A failed asset movement is reported through a `*Failed` event and never
//! undoes the committed record.

pub mod assets;
mod control;
pub mod error;
pub mod factory;
pub mod instruction;
pub mod mainchain;
pub mod message;
pub mod processor;
pub mod sidechain;
pub mod state;

pub use assets::{AssetLedger, InMemoryAssets};
pub use error::BridgeError;
pub use factory::{WrappedAsset, WrappedAssetFactory};
pub use instruction::{MainchainInstruction, RegistryDescriptor, RegistryInstruction, SidechainInstruction};
pub use mainchain::MainchainBridge;
pub use message::AuthorizedCall;
pub use processor::{process, BridgeProgram, ExecutionOutcome};
pub use sidechain::SidechainBridge;
pub use state::{DepositRecord, DepositSettlement, Settlement, WithdrawalRecord};

/// Bridge calls gated by the signer registry
pub mod calls {
    alloy_sol_types::sol! {
        // Mainchain
        function rejectDeposit(uint256 ledgerId, uint256 depositIndex, bytes signatures);
        function finalizeWithdrawal(
            uint256 ledgerId,
            uint256 depositIndex,
            uint256 sideLedgerId,
            uint256 withdrawalIndex,
            address sideFrom,
            address mainTo,
            bytes signatures
        );

        // Sidechain
        function createWrappedAsset(
            uint256 sideLedgerId,
            uint256 originLedgerId,
            address originAsset,
            string name,
            string symbol,
            bytes signatures
        );
        function finalizeDeposit(
            uint256 sideLedgerId,
            uint256 originLedgerId,
            uint256 depositIndex,
            address originAsset,
            uint256 assetId,
            address originFrom,
            address sideTo,
            bytes signatures
        );
        function rejectWithdrawal(uint256 sideLedgerId, uint256 withdrawalIndex, bytes signatures);

        // Both sides
        function transferRelayer(uint256 ledgerId, address newRegistry, bytes32 commitment, bytes signatures);
    }
}

/// Constants
pub mod constants {
    use alloy_sol_types::SolCall;

    use crate::calls;

    // Selectors signers commit to
    pub const REJECT_DEPOSIT: [u8; 4] = calls::rejectDepositCall::SELECTOR;
    pub const FINALIZE_WITHDRAWAL: [u8; 4] = calls::finalizeWithdrawalCall::SELECTOR;
    pub const TRANSFER_RELAYER: [u8; 4] = calls::transferRelayerCall::SELECTOR;
    pub const CREATE_WRAPPED_ASSET: [u8; 4] = calls::createWrappedAssetCall::SELECTOR;
    pub const FINALIZE_DEPOSIT: [u8; 4] = calls::finalizeDepositCall::SELECTOR;
    pub const REJECT_WITHDRAWAL: [u8; 4] = calls::rejectWithdrawalCall::SELECTOR;

    /// Seed prefix for wrapped asset handles
    pub const WRAPPED_ASSET_SEED: &[u8] = b"wrapped";
}
