//! Bridge Program Errors

use bridge_types::{Address, AssetId, ErrorKind, LedgerId, RecordIndex, TransferError};
use signer_registry::RegistryError;
use thiserror::Error;

/// Bridge program errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Ledger id mismatch: expected {expected}, got {actual}")]
    LedgerMismatch { expected: LedgerId, actual: LedgerId },

    #[error("Counterpart ledger {0} is this ledger")]
    SameLedger(LedgerId),

    #[error("Authorization failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Deposit {0} not found")]
    DepositNotFound(RecordIndex),

    #[error("Deposit {index} already released to {released_to}")]
    DepositAlreadyReleased {
        index: RecordIndex,
        released_to: Address,
    },

    #[error("Withdrawal {0} not found")]
    WithdrawalNotFound(RecordIndex),

    #[error("Withdrawal {0} already rejected")]
    WithdrawalAlreadyRejected(RecordIndex),

    #[error("Deposit {deposit_index} from ledger {origin_ledger_id} already finalized")]
    DepositAlreadyFinalized {
        origin_ledger_id: LedgerId,
        deposit_index: RecordIndex,
    },

    #[error("Wrapped asset for {origin_asset} on ledger {origin_ledger_id} already exists at {wrapped_asset}")]
    WrappedAssetExists {
        origin_ledger_id: LedgerId,
        origin_asset: Address,
        wrapped_asset: Address,
    },

    #[error("{0} is not a wrapped asset of this bridge")]
    UnknownWrappedAsset(Address),

    #[error("Wrapped asset {wrapped_asset} token {asset_id} has no origin deposit")]
    UnknownOriginDeposit {
        wrapped_asset: Address,
        asset_id: AssetId,
    },

    #[error("New registry belongs to ledger {actual}, bridge is on ledger {expected}")]
    RegistryLedgerMismatch { expected: LedgerId, actual: LedgerId },

    #[error("Registry {0} already controls this bridge")]
    SameRegistry(Address),

    #[error("Asset transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(&'static str),

    #[error("Invalid instruction data")]
    InvalidInstructionData,
}

impl BridgeError {
    /// Classify the rejection for callers and relayers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(e) => e.kind(),
            Self::DepositAlreadyReleased { .. }
            | Self::WithdrawalAlreadyRejected(_)
            | Self::DepositAlreadyFinalized { .. }
            | Self::WrappedAssetExists { .. } => ErrorKind::StateConflict,
            _ => ErrorKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            BridgeError::LedgerMismatch {
                expected: LedgerId(1),
                actual: LedgerId(2)
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BridgeError::WithdrawalAlreadyRejected(3).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            BridgeError::from(RegistryError::InsufficientSignatures {
                provided: 1,
                required: 2
            })
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            BridgeError::from(RegistryError::MalformedBundle { len: 3 }).kind(),
            ErrorKind::Validation
        );
    }
}
