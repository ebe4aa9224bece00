//! Bridge Program Instructions

use borsh::{BorshDeserialize, BorshSerialize};
use bridge_types::{Address, AssetId, LedgerId, RecordIndex};
use serde::{Deserialize, Serialize};
use signer_registry::{RegistryError, SignerRegistry};

use crate::BridgeError;

/// Configuration of a registry to hand control to
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegistryDescriptor {
    pub identity: Address,
    pub signers: Vec<Address>,
    pub threshold: u32,
}

impl RegistryDescriptor {
    /// Build a fresh registry (nonce 0) on `ledger_id`
    pub fn build(&self, ledger_id: LedgerId) -> Result<SignerRegistry, RegistryError> {
        SignerRegistry::new(
            self.identity,
            ledger_id,
            self.signers.iter().copied(),
            self.threshold,
        )
    }
}

/// Signer registry administration, available on both ledgers
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RegistryInstruction {
    AddSigner {
        signer: Address,
        signatures: Vec<u8>,
    },
    RemoveSigner {
        signer: Address,
        signatures: Vec<u8>,
    },
    /// Setting the current value is a no-op and needs no signatures
    UpdateThreshold {
        threshold: u32,
        signatures: Vec<u8>,
    },
}

/// Mainchain bridge instructions
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum MainchainInstruction {
    /// Lock the caller's asset for a sidechain recipient
    ///
    /// No signatures: the caller must own the asset.
    Deposit {
        origin_asset: Address,
        asset_id: AssetId,
        side_ledger_id: LedgerId,
        side_to: Address,
    },

    /// Return a locked asset to its depositor
    RejectDeposit {
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        signatures: Vec<u8>,
    },

    /// Release a locked asset for a sidechain withdrawal
    FinalizeWithdrawal {
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        side_from: Address,
        main_to: Address,
        signatures: Vec<u8>,
    },

    /// Move control to a new signer registry
    TransferRelayer {
        ledger_id: LedgerId,
        new_registry: RegistryDescriptor,
        signatures: Vec<u8>,
    },

    Registry(RegistryInstruction),
}

/// Sidechain bridge instructions
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum SidechainInstruction {
    /// Register a wrapped asset for an origin pair
    CreateWrappedAsset {
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        origin_asset: Address,
        name: String,
        symbol: String,
        signatures: Vec<u8>,
    },

    /// Mint the wrapped representation of a mainchain deposit
    FinalizeDeposit {
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: Address,
        asset_id: AssetId,
        origin_from: Address,
        side_to: Address,
        signatures: Vec<u8>,
    },

    /// Burn the caller's wrapped token
    ///
    /// No signatures: the caller must hold the token.
    Withdraw {
        wrapped_asset: Address,
        asset_id: AssetId,
        main_to: Address,
    },

    /// Re-mint a burned token to its withdrawer
    RejectWithdrawal {
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        signatures: Vec<u8>,
    },

    /// Move control to a new signer registry
    TransferRelayer {
        side_ledger_id: LedgerId,
        new_registry: RegistryDescriptor,
        signatures: Vec<u8>,
    },

    Registry(RegistryInstruction),
}

impl RegistryInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddSigner { .. } => "AddSigner",
            Self::RemoveSigner { .. } => "RemoveSigner",
            Self::UpdateThreshold { .. } => "UpdateThreshold",
        }
    }
}

impl MainchainInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "Deposit",
            Self::RejectDeposit { .. } => "RejectDeposit",
            Self::FinalizeWithdrawal { .. } => "FinalizeWithdrawal",
            Self::TransferRelayer { .. } => "TransferRelayer",
            Self::Registry(ix) => ix.name(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("MainchainInstruction serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, BridgeError> {
        borsh::from_slice(data).map_err(|_| BridgeError::InvalidInstructionData)
    }
}

impl SidechainInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateWrappedAsset { .. } => "CreateWrappedAsset",
            Self::FinalizeDeposit { .. } => "FinalizeDeposit",
            Self::Withdraw { .. } => "Withdraw",
            Self::RejectWithdrawal { .. } => "RejectWithdrawal",
            Self::TransferRelayer { .. } => "TransferRelayer",
            Self::Registry(ix) => ix.name(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SidechainInstruction serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, BridgeError> {
        borsh::from_slice(data).map_err(|_| BridgeError::InvalidInstructionData)
    }
}
