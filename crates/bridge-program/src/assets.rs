//! Origin asset book
//!
//! The mainchain bridge takes and returns custody through [`AssetLedger`].
//! [`InMemoryAssets`] is the book used by the devnet and tests: one owner
//! per `(asset, asset_id)`, plus a set of accounts whose receive hook
//! rejects incoming tokens.

use std::collections::{BTreeMap, BTreeSet};

use bridge_types::{Address, AssetId, TransferError};
use serde::{Deserialize, Serialize};

/// Ownership transfers on the origin ledger
pub trait AssetLedger {
    fn owner_of(&self, asset: &Address, asset_id: AssetId) -> Option<Address>;

    /// Move `asset_id` from `from` to `to`
    fn transfer(
        &mut self,
        asset: &Address,
        asset_id: AssetId,
        from: &Address,
        to: &Address,
    ) -> Result<(), TransferError>;
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct InMemoryAssets {
    owners: BTreeMap<Address, BTreeMap<AssetId, Address>>,
    refusing: BTreeSet<Address>,
}

impl InMemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token; returns false if it already exists
    pub fn mint(&mut self, asset: Address, asset_id: AssetId, to: Address) -> bool {
        let tokens = self.owners.entry(asset).or_default();
        if tokens.contains_key(&asset_id) {
            return false;
        }
        tokens.insert(asset_id, to);
        true
    }

    /// Make `account` reject every incoming transfer
    pub fn refuse_receipts(&mut self, account: Address) {
        self.refusing.insert(account);
    }

    pub fn accept_receipts(&mut self, account: &Address) {
        self.refusing.remove(account);
    }

    pub fn refuses(&self, account: &Address) -> bool {
        self.refusing.contains(account)
    }

    /// Number of tokens of `asset` held by `holder`
    pub fn balance_of(&self, asset: &Address, holder: &Address) -> usize {
        self.owners
            .get(asset)
            .map(|tokens| tokens.values().filter(|owner| *owner == holder).count())
            .unwrap_or(0)
    }
}

impl AssetLedger for InMemoryAssets {
    fn owner_of(&self, asset: &Address, asset_id: AssetId) -> Option<Address> {
        self.owners.get(asset)?.get(&asset_id).copied()
    }

    fn transfer(
        &mut self,
        asset: &Address,
        asset_id: AssetId,
        from: &Address,
        to: &Address,
    ) -> Result<(), TransferError> {
        let tokens = self
            .owners
            .get_mut(asset)
            .ok_or(TransferError::UnknownAsset { asset: *asset })?;
        let owner = tokens.get_mut(&asset_id).ok_or(TransferError::UnknownToken {
            asset: *asset,
            asset_id,
        })?;

        if *owner != *from {
            return Err(TransferError::NotOwner {
                account: *from,
                asset: *asset,
                asset_id,
            });
        }
        if self.refusing.contains(to) {
            return Err(TransferError::ReceiverRejected {
                recipient: *to,
                asset: *asset,
                asset_id,
            });
        }

        *owner = *to;
        Ok(())
    }
}
