//! Bridge Program State
//!
//! Per-ledger records and the outcomes of authorized settlements.

use borsh::{BorshDeserialize, BorshSerialize};
use bridge_types::{Address, AssetId, LedgerId, RecordIndex, TransferError};
use serde::{Deserialize, Serialize};

/// Asset locked on the mainchain
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DepositRecord {
    /// Asset contract on the mainchain
    pub origin_asset: Address,
    /// Token id within the asset
    pub asset_id: AssetId,
    /// Depositor the asset was taken from
    pub locked_from: Address,
    /// Destination sidechain
    pub side_ledger_id: LedgerId,
    /// Recipient on the sidechain
    pub side_to: Address,
    /// Set exactly once, by reject or finalize-withdrawal
    pub released_to: Option<Address>,
}

impl DepositRecord {
    pub fn is_released(&self) -> bool {
        self.released_to.is_some()
    }
}

/// Wrapped asset burned on the sidechain, pending release on the mainchain
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalRecord {
    pub wrapped_asset: Address,
    pub asset_id: AssetId,
    /// Holder the wrapped asset was burned from
    pub burned_by: Address,
    /// Requested recipient on the mainchain
    pub main_to: Address,
    pub origin_ledger_id: LedgerId,
    pub origin_asset: Address,
    /// Mainchain deposit that minted this token
    pub origin_deposit_index: RecordIndex,
    /// Flips once, false to true
    pub rejected: bool,
}

/// Result of an authorized release whose record is already committed
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Transferred,
    /// Record committed and nonce consumed; the asset did not move
    TransferFailed(TransferError),
}

impl Settlement {
    pub fn is_transferred(&self) -> bool {
        matches!(self, Self::Transferred)
    }
}

impl From<Result<(), TransferError>> for Settlement {
    fn from(result: Result<(), TransferError>) -> Self {
        match result {
            Ok(()) => Self::Transferred,
            Err(e) => Self::TransferFailed(e),
        }
    }
}

/// Result of a sidechain deposit finalization
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum DepositSettlement {
    Minted { wrapped_asset: Address },
    MintFailed {
        wrapped_asset: Address,
        error: TransferError,
    },
    /// No wrapped asset yet; the deposit index stays open for a later attempt
    WrappedAssetMissing,
}

impl DepositSettlement {
    pub fn is_minted(&self) -> bool {
        matches!(self, Self::Minted { .. })
    }
}
