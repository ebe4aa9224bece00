//! Wrapped Asset Factory
//!
//! One wrapped asset per `(origin ledger, origin asset)` pair, created on
//! the sidechain and owned by the sidechain bridge. Only the owner can mint
//! or burn. Balances are tracked per token id, so a withdrawal can burn the
//! exact id a deposit minted.

use std::collections::{BTreeMap, BTreeSet};

use bridge_types::{Address, AssetId, LedgerId, TransferError};
use serde::{Deserialize, Serialize};

use crate::{constants::WRAPPED_ASSET_SEED, BridgeError};

/// Sidechain representation of an origin asset
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WrappedAsset {
    address: Address,
    owner: Address,
    origin_ledger_id: LedgerId,
    origin_asset: Address,
    name: String,
    symbol: String,
    balances: BTreeMap<AssetId, BTreeMap<Address, u64>>,
}

impl WrappedAsset {
    pub fn address(&self) -> Address {
        self.address
    }

    /// The only account allowed to mint and burn
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn origin_ledger_id(&self) -> LedgerId {
        self.origin_ledger_id
    }

    pub fn origin_asset(&self) -> Address {
        self.origin_asset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn balance_of(&self, holder: &Address, asset_id: AssetId) -> u64 {
        self.balances
            .get(&asset_id)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self, asset_id: AssetId) -> u64 {
        self.balances
            .get(&asset_id)
            .map(|holders| holders.values().sum())
            .unwrap_or(0)
    }

    fn authorize(&self, caller: &Address) -> Result<(), TransferError> {
        if *caller != self.owner {
            return Err(TransferError::Unauthorized {
                caller: *caller,
                asset: self.address,
            });
        }
        Ok(())
    }

    fn mint(&mut self, caller: &Address, to: &Address, asset_id: AssetId) -> Result<(), TransferError> {
        self.authorize(caller)?;
        *self
            .balances
            .entry(asset_id)
            .or_default()
            .entry(*to)
            .or_insert(0) += 1;
        Ok(())
    }

    fn burn(&mut self, caller: &Address, from: &Address, asset_id: AssetId) -> Result<(), TransferError> {
        self.authorize(caller)?;
        let insufficient = TransferError::InsufficientBalance {
            account: *from,
            asset: self.address,
            asset_id,
        };

        let holders = self.balances.get_mut(&asset_id).ok_or(insufficient.clone())?;
        let balance = holders.get_mut(from).ok_or(insufficient)?;
        *balance -= 1;
        if *balance == 0 {
            holders.remove(from);
        }
        if holders.is_empty() {
            self.balances.remove(&asset_id);
        }
        Ok(())
    }
}

/// Registry of wrapped assets owned by one bridge
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WrappedAssetFactory {
    owner: Address,
    registrations: BTreeMap<LedgerId, BTreeMap<Address, Address>>,
    assets: BTreeMap<Address, WrappedAsset>,
    refusing: BTreeSet<Address>,
}

impl WrappedAssetFactory {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            registrations: BTreeMap::new(),
            assets: BTreeMap::new(),
            refusing: BTreeSet::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Deterministic handle for an origin pair
    pub fn wrapped_address(&self, origin_ledger_id: LedgerId, origin_asset: &Address) -> Address {
        Address::derive(&[
            WRAPPED_ASSET_SEED,
            self.owner.as_bytes(),
            &origin_ledger_id.0.to_be_bytes(),
            origin_asset.as_bytes(),
        ])
    }

    /// Register a wrapped asset for an origin pair
    pub fn create(
        &mut self,
        origin_ledger_id: LedgerId,
        origin_asset: Address,
        name: &str,
        symbol: &str,
    ) -> Result<Address, BridgeError> {
        if name.is_empty() {
            return Err(BridgeError::InvalidMetadata("name must not be empty"));
        }
        if symbol.is_empty() {
            return Err(BridgeError::InvalidMetadata("symbol must not be empty"));
        }
        if let Some(wrapped_asset) = self.lookup(origin_ledger_id, &origin_asset) {
            return Err(BridgeError::WrappedAssetExists {
                origin_ledger_id,
                origin_asset,
                wrapped_asset,
            });
        }

        let address = self.wrapped_address(origin_ledger_id, &origin_asset);
        self.registrations
            .entry(origin_ledger_id)
            .or_default()
            .insert(origin_asset, address);
        self.assets.insert(
            address,
            WrappedAsset {
                address,
                owner: self.owner,
                origin_ledger_id,
                origin_asset,
                name: name.to_string(),
                symbol: symbol.to_string(),
                balances: BTreeMap::new(),
            },
        );
        Ok(address)
    }

    /// Wrapped asset registered for an origin pair
    pub fn lookup(&self, origin_ledger_id: LedgerId, origin_asset: &Address) -> Option<Address> {
        self.registrations
            .get(&origin_ledger_id)?
            .get(origin_asset)
            .copied()
    }

    pub fn get(&self, wrapped_asset: &Address) -> Option<&WrappedAsset> {
        self.assets.get(wrapped_asset)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WrappedAsset> {
        self.assets.values()
    }

    pub fn mint(
        &mut self,
        caller: &Address,
        wrapped_asset: &Address,
        to: &Address,
        asset_id: AssetId,
    ) -> Result<(), TransferError> {
        let refused = self.refusing.contains(to);
        let asset = self
            .assets
            .get_mut(wrapped_asset)
            .ok_or(TransferError::UnknownAsset { asset: *wrapped_asset })?;
        if refused {
            asset.authorize(caller)?;
            return Err(TransferError::ReceiverRejected {
                recipient: *to,
                asset: *wrapped_asset,
                asset_id,
            });
        }
        asset.mint(caller, to, asset_id)
    }

    pub fn burn(
        &mut self,
        caller: &Address,
        wrapped_asset: &Address,
        from: &Address,
        asset_id: AssetId,
    ) -> Result<(), TransferError> {
        self.assets
            .get_mut(wrapped_asset)
            .ok_or(TransferError::UnknownAsset { asset: *wrapped_asset })?
            .burn(caller, from, asset_id)
    }

    /// Make `account` reject every incoming mint
    pub fn refuse_receipts(&mut self, account: Address) {
        self.refusing.insert(account);
    }

    pub fn accept_receipts(&mut self, account: &Address) {
        self.refusing.remove(account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (WrappedAssetFactory, Address, Address) {
        let bridge = Address::derive(&[b"bridge"]);
        let mut factory = WrappedAssetFactory::new(bridge);
        let origin = Address::derive(&[b"kitties"]);
        let wrapped = factory
            .create(LedgerId(1), origin, "Wrapped Kitty", "wKITTY")
            .unwrap();
        (factory, bridge, wrapped)
    }

    #[test]
    fn test_create_once_per_origin_pair() {
        let (mut factory, _, wrapped) = setup();
        let origin = Address::derive(&[b"kitties"]);

        assert_eq!(factory.lookup(LedgerId(1), &origin), Some(wrapped));
        assert_eq!(factory.lookup(LedgerId(3), &origin), None);
        assert_eq!(
            factory.create(LedgerId(1), origin, "Again", "AGN"),
            Err(BridgeError::WrappedAssetExists {
                origin_ledger_id: LedgerId(1),
                origin_asset: origin,
                wrapped_asset: wrapped,
            })
        );

        // Same origin asset on another ledger is a distinct pair
        let other = factory.create(LedgerId(3), origin, "Kitty 3", "K3").unwrap();
        assert_ne!(other, wrapped);
        assert_eq!(factory.len(), 2);

        let meta = factory.get(&wrapped).unwrap();
        assert_eq!(meta.name(), "Wrapped Kitty");
        assert_eq!(meta.symbol(), "wKITTY");
        assert_eq!(meta.origin_ledger_id(), LedgerId(1));
        assert_eq!(meta.origin_asset(), origin);
    }

    #[test]
    fn test_empty_metadata_rejected() {
        let mut factory = WrappedAssetFactory::new(Address::derive(&[b"bridge"]));
        let origin = Address::derive(&[b"kitties"]);
        assert!(matches!(
            factory.create(LedgerId(1), origin, "", "K"),
            Err(BridgeError::InvalidMetadata(_))
        ));
        assert!(matches!(
            factory.create(LedgerId(1), origin, "Kitty", ""),
            Err(BridgeError::InvalidMetadata(_))
        ));
        assert!(factory.is_empty());
    }

    #[test]
    fn test_only_owner_mints_and_burns() {
        let (mut factory, bridge, wrapped) = setup();
        let alice = Address::derive(&[b"alice"]);

        assert_eq!(
            factory.mint(&alice, &wrapped, &alice, 7),
            Err(TransferError::Unauthorized { caller: alice, asset: wrapped })
        );

        factory.mint(&bridge, &wrapped, &alice, 7).unwrap();
        assert_eq!(factory.get(&wrapped).unwrap().balance_of(&alice, 7), 1);
        assert_eq!(factory.get(&wrapped).unwrap().total_supply(7), 1);

        assert!(factory.burn(&alice, &wrapped, &alice, 7).is_err());
        factory.burn(&bridge, &wrapped, &alice, 7).unwrap();
        assert_eq!(factory.get(&wrapped).unwrap().total_supply(7), 0);

        assert_eq!(
            factory.burn(&bridge, &wrapped, &alice, 7),
            Err(TransferError::InsufficientBalance {
                account: alice,
                asset: wrapped,
                asset_id: 7
            })
        );
    }

    #[test]
    fn test_refusing_recipient() {
        let (mut factory, bridge, wrapped) = setup();
        let vault = Address::derive(&[b"vault"]);
        factory.refuse_receipts(vault);

        assert!(matches!(
            factory.mint(&bridge, &wrapped, &vault, 1),
            Err(TransferError::ReceiverRejected { .. })
        ));
        assert_eq!(factory.get(&wrapped).unwrap().total_supply(1), 0);

        factory.accept_receipts(&vault);
        factory.mint(&bridge, &wrapped, &vault, 1).unwrap();
        assert_eq!(factory.get(&wrapped).unwrap().balance_of(&vault, 1), 1);
    }

    #[test]
    fn test_unknown_wrapped_asset() {
        let (mut factory, bridge, _) = setup();
        let bogus = Address::derive(&[b"bogus"]);
        assert_eq!(
            factory.mint(&bridge, &bogus, &bridge, 1),
            Err(TransferError::UnknownAsset { asset: bogus })
        );
    }
}
