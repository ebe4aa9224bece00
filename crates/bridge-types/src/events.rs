//! Bridge events
//!
//! Each committed operation emits one event carrying enough data to rebuild
//! ledger state off-chain. The relayer consumes these from both ledgers.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{Address, AssetId, LedgerId, RecordIndex, TransferError};

/// Why a sidechain deposit finalization did not mint
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum DepositFailure {
    /// No wrapped asset registered yet for the origin pair; the deposit stays unfinalized
    WrappedAssetMissing,
    /// Deposit was marked finalized but the mint was refused
    MintFailed(TransferError),
}

/// Events emitted by bridges and signer registries
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    // Mainchain
    DepositInitiated {
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: Address,
        asset_id: AssetId,
        locked_from: Address,
        side_ledger_id: LedgerId,
        side_to: Address,
    },
    DepositRejected {
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: Address,
        asset_id: AssetId,
        locked_from: Address,
    },
    DepositRejectFailed {
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: Address,
        asset_id: AssetId,
        locked_from: Address,
        error: TransferError,
    },
    WithdrawalFinalized {
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        side_from: Address,
        main_to: Address,
        origin_asset: Address,
        asset_id: AssetId,
    },
    WithdrawalFailed {
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        side_from: Address,
        main_to: Address,
        origin_asset: Address,
        asset_id: AssetId,
        error: TransferError,
    },

    // Sidechain
    WrappedAssetCreated {
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        origin_asset: Address,
        wrapped_asset: Address,
        name: String,
        symbol: String,
    },
    DepositFinalized {
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: Address,
        asset_id: AssetId,
        origin_from: Address,
        side_to: Address,
        wrapped_asset: Address,
    },
    DepositFailed {
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: Address,
        asset_id: AssetId,
        origin_from: Address,
        side_to: Address,
        reason: DepositFailure,
    },
    WithdrawalInitiated {
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        wrapped_asset: Address,
        asset_id: AssetId,
        origin_ledger_id: LedgerId,
        origin_asset: Address,
        deposit_index: RecordIndex,
        side_from: Address,
        main_to: Address,
    },
    WithdrawalRejected {
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        wrapped_asset: Address,
        asset_id: AssetId,
        side_from: Address,
    },
    WithdrawalRejectFailed {
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        wrapped_asset: Address,
        asset_id: AssetId,
        side_from: Address,
        error: TransferError,
    },

    // Both sides
    RelayerTransferred {
        ledger_id: LedgerId,
        previous_registry: Address,
        new_registry: Address,
    },

    // Signer registry
    SignerAdded {
        registry: Address,
        signer: Address,
        nonce: u64,
    },
    SignerRemoved {
        registry: Address,
        signer: Address,
        nonce: u64,
    },
    ThresholdUpdated {
        registry: Address,
        threshold: u32,
        nonce: u64,
    },
}

impl BridgeEvent {
    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::DepositInitiated { .. } => "DepositInitiated",
            Self::DepositRejected { .. } => "DepositRejected",
            Self::DepositRejectFailed { .. } => "DepositRejectFailed",
            Self::WithdrawalFinalized { .. } => "WithdrawalFinalized",
            Self::WithdrawalFailed { .. } => "WithdrawalFailed",
            Self::WrappedAssetCreated { .. } => "WrappedAssetCreated",
            Self::DepositFinalized { .. } => "DepositFinalized",
            Self::DepositFailed { .. } => "DepositFailed",
            Self::WithdrawalInitiated { .. } => "WithdrawalInitiated",
            Self::WithdrawalRejected { .. } => "WithdrawalRejected",
            Self::WithdrawalRejectFailed { .. } => "WithdrawalRejectFailed",
            Self::RelayerTransferred { .. } => "RelayerTransferred",
            Self::SignerAdded { .. } => "SignerAdded",
            Self::SignerRemoved { .. } => "SignerRemoved",
            Self::ThresholdUpdated { .. } => "ThresholdUpdated",
        }
    }

    /// True for events reporting a committed operation whose asset movement failed
    ///
    /// These need an off-ledger actor to arrange recovery; nothing retries them.
    pub fn is_settlement_failure(&self) -> bool {
        matches!(
            self,
            Self::DepositRejectFailed { .. }
                | Self::WithdrawalFailed { .. }
                | Self::WithdrawalRejectFailed { .. }
                | Self::DepositFailed {
                    reason: DepositFailure::MintFailed(_),
                    ..
                }
        )
    }
}
