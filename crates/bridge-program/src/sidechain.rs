//! Sidechain Bridge
//!
//! Mints wrapped assets for finalized mainchain deposits and burns them on
//! withdrawal. Deposits are finalized at most once per origin ledger and
//! index; withdrawals can be rejected once, re-minting to the withdrawer.

use std::collections::{BTreeMap, BTreeSet};

use bridge_types::{Address, AssetId, BridgeEvent, DepositFailure, LedgerId, RecordIndex};
use serde::{Deserialize, Serialize};
use signer_registry::SignerRegistry;

use crate::{
    control::{ensure_ledger, transfer_relayer},
    factory::WrappedAssetFactory,
    message::AuthorizedCall,
    state::{DepositSettlement, Settlement, WithdrawalRecord},
    BridgeError,
};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SidechainBridge {
    identity: Address,
    registry: SignerRegistry,
    factory: WrappedAssetFactory,
    withdrawals: Vec<WithdrawalRecord>,
    /// Finalized deposit indices per origin ledger
    finalized: BTreeMap<LedgerId, BTreeSet<RecordIndex>>,
    /// Latest origin deposit per wrapped token
    origin_deposits: BTreeMap<Address, BTreeMap<AssetId, RecordIndex>>,
    #[serde(skip)]
    events: Vec<BridgeEvent>,
}

impl SidechainBridge {
    pub fn new(identity: Address, registry: SignerRegistry) -> Self {
        Self {
            identity,
            registry,
            factory: WrappedAssetFactory::new(identity),
            withdrawals: Vec::new(),
            finalized: BTreeMap::new(),
            origin_deposits: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.registry.ledger_id()
    }

    pub fn registry(&self) -> &SignerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SignerRegistry {
        &mut self.registry
    }

    pub fn factory(&self) -> &WrappedAssetFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut WrappedAssetFactory {
        &mut self.factory
    }

    pub fn withdrawal_record(&self, index: RecordIndex) -> Option<&WithdrawalRecord> {
        usize::try_from(index).ok().and_then(|i| self.withdrawals.get(i))
    }

    pub fn withdrawal_count(&self) -> u64 {
        self.withdrawals.len() as u64
    }

    pub fn is_deposit_finalized(&self, origin_ledger_id: LedgerId, deposit_index: RecordIndex) -> bool {
        self.finalized
            .get(&origin_ledger_id)
            .is_some_and(|indices| indices.contains(&deposit_index))
    }

    /// Origin deposit that last minted `(wrapped_asset, asset_id)`
    pub fn origin_deposit(&self, wrapped_asset: &Address, asset_id: AssetId) -> Option<RecordIndex> {
        self.origin_deposits
            .get(wrapped_asset)?
            .get(&asset_id)
            .copied()
    }

    /// Register a wrapped asset for an origin pair (authorized)
    pub fn create_wrapped_asset(
        &mut self,
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        origin_asset: Address,
        name: &str,
        symbol: &str,
        bundle: &[u8],
    ) -> Result<Address, BridgeError> {
        ensure_ledger(self.ledger_id(), side_ledger_id)?;
        if origin_ledger_id == side_ledger_id {
            return Err(BridgeError::SameLedger(origin_ledger_id));
        }
        if name.is_empty() || symbol.is_empty() {
            return Err(BridgeError::InvalidMetadata("name and symbol must not be empty"));
        }
        if let Some(wrapped_asset) = self.factory.lookup(origin_ledger_id, &origin_asset) {
            return Err(BridgeError::WrappedAssetExists {
                origin_ledger_id,
                origin_asset,
                wrapped_asset,
            });
        }

        let call = AuthorizedCall::create_wrapped_asset(
            side_ledger_id,
            origin_ledger_id,
            &origin_asset,
            name,
            symbol,
        );
        let auth = call.authorize(&self.registry, &self.identity, bundle)?;
        self.registry.consume(auth)?;

        let wrapped_asset = self.factory.create(origin_ledger_id, origin_asset, name, symbol)?;

        tracing::info!(
            "Created wrapped asset {} ({}) for {} on ledger {}",
            wrapped_asset,
            symbol,
            origin_asset,
            origin_ledger_id
        );
        self.events.push(BridgeEvent::WrappedAssetCreated {
            side_ledger_id,
            origin_ledger_id,
            origin_asset,
            wrapped_asset,
            name: name.to_string(),
            symbol: symbol.to_string(),
        });
        Ok(wrapped_asset)
    }

    /// Mint the wrapped representation of a mainchain deposit (authorized)
    ///
    /// A missing wrapped asset consumes the authorization but leaves the
    /// deposit index open, so it can be finalized once the asset exists.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_deposit(
        &mut self,
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: Address,
        asset_id: AssetId,
        origin_from: Address,
        side_to: Address,
        bundle: &[u8],
    ) -> Result<DepositSettlement, BridgeError> {
        ensure_ledger(self.ledger_id(), side_ledger_id)?;
        if origin_ledger_id == side_ledger_id {
            return Err(BridgeError::SameLedger(origin_ledger_id));
        }
        if self.is_deposit_finalized(origin_ledger_id, deposit_index) {
            return Err(BridgeError::DepositAlreadyFinalized {
                origin_ledger_id,
                deposit_index,
            });
        }

        let call = AuthorizedCall::finalize_deposit(
            side_ledger_id,
            origin_ledger_id,
            deposit_index,
            &origin_asset,
            asset_id,
            &origin_from,
            &side_to,
        );
        let auth = call.authorize(&self.registry, &self.identity, bundle)?;
        self.registry.consume(auth)?;

        let Some(wrapped_asset) = self.factory.lookup(origin_ledger_id, &origin_asset) else {
            tracing::warn!(
                "Deposit {} from ledger {} arrived before a wrapped asset for {}",
                deposit_index,
                origin_ledger_id,
                origin_asset
            );
            self.events.push(BridgeEvent::DepositFailed {
                side_ledger_id,
                origin_ledger_id,
                deposit_index,
                origin_asset,
                asset_id,
                origin_from,
                side_to,
                reason: DepositFailure::WrappedAssetMissing,
            });
            return Ok(DepositSettlement::WrappedAssetMissing);
        };

        self.finalized
            .entry(origin_ledger_id)
            .or_default()
            .insert(deposit_index);
        self.origin_deposits
            .entry(wrapped_asset)
            .or_default()
            .insert(asset_id, deposit_index);

        let settlement = match self.factory.mint(&self.identity, &wrapped_asset, &side_to, asset_id) {
            Ok(()) => {
                tracing::info!(
                    "Deposit {} from ledger {} finalized: minted {} #{} to {}",
                    deposit_index,
                    origin_ledger_id,
                    wrapped_asset,
                    asset_id,
                    side_to
                );
                self.events.push(BridgeEvent::DepositFinalized {
                    side_ledger_id,
                    origin_ledger_id,
                    deposit_index,
                    origin_asset,
                    asset_id,
                    origin_from,
                    side_to,
                    wrapped_asset,
                });
                DepositSettlement::Minted { wrapped_asset }
            }
            Err(error) => {
                tracing::warn!(
                    "Deposit {} from ledger {} finalized but mint failed: {}",
                    deposit_index,
                    origin_ledger_id,
                    error
                );
                self.events.push(BridgeEvent::DepositFailed {
                    side_ledger_id,
                    origin_ledger_id,
                    deposit_index,
                    origin_asset,
                    asset_id,
                    origin_from,
                    side_to,
                    reason: DepositFailure::MintFailed(error.clone()),
                });
                DepositSettlement::MintFailed {
                    wrapped_asset,
                    error,
                }
            }
        };
        Ok(settlement)
    }

    /// Burn the caller's wrapped token and open a withdrawal record
    pub fn withdraw(
        &mut self,
        caller: &Address,
        wrapped_asset: Address,
        asset_id: AssetId,
        main_to: Address,
    ) -> Result<RecordIndex, BridgeError> {
        let meta = self
            .factory
            .get(&wrapped_asset)
            .ok_or(BridgeError::UnknownWrappedAsset(wrapped_asset))?;
        let (origin_ledger_id, origin_asset) = (meta.origin_ledger_id(), meta.origin_asset());
        let origin_deposit_index = self.origin_deposit(&wrapped_asset, asset_id).ok_or(
            BridgeError::UnknownOriginDeposit {
                wrapped_asset,
                asset_id,
            },
        )?;

        self.factory
            .burn(&self.identity, &wrapped_asset, caller, asset_id)?;

        let withdrawal_index = self.withdrawals.len() as RecordIndex;
        self.withdrawals.push(WithdrawalRecord {
            wrapped_asset,
            asset_id,
            burned_by: *caller,
            main_to,
            origin_ledger_id,
            origin_asset,
            origin_deposit_index,
            rejected: false,
        });

        tracing::info!(
            "Withdrawal {}: burned {} #{} from {} for {} on ledger {} (deposit {})",
            withdrawal_index,
            wrapped_asset,
            asset_id,
            caller,
            main_to,
            origin_ledger_id,
            origin_deposit_index
        );
        self.events.push(BridgeEvent::WithdrawalInitiated {
            side_ledger_id: self.ledger_id(),
            withdrawal_index,
            wrapped_asset,
            asset_id,
            origin_ledger_id,
            origin_asset,
            deposit_index: origin_deposit_index,
            side_from: *caller,
            main_to,
        });
        Ok(withdrawal_index)
    }

    /// Re-mint a burned token to its withdrawer (authorized)
    pub fn reject_withdrawal(
        &mut self,
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        bundle: &[u8],
    ) -> Result<Settlement, BridgeError> {
        ensure_ledger(self.ledger_id(), side_ledger_id)?;
        let record = self
            .withdrawal_record(withdrawal_index)
            .ok_or(BridgeError::WithdrawalNotFound(withdrawal_index))?;
        if record.rejected {
            return Err(BridgeError::WithdrawalAlreadyRejected(withdrawal_index));
        }

        let auth = AuthorizedCall::reject_withdrawal(withdrawal_index).authorize(
            &self.registry,
            &self.identity,
            bundle,
        )?;
        self.registry.consume(auth)?;

        let record = usize::try_from(withdrawal_index)
            .ok()
            .and_then(|i| self.withdrawals.get_mut(i))
            .ok_or(BridgeError::WithdrawalNotFound(withdrawal_index))?;
        record.rejected = true;
        let (wrapped_asset, asset_id, burned_by) = (record.wrapped_asset, record.asset_id, record.burned_by);

        let settlement: Settlement = self
            .factory
            .mint(&self.identity, &wrapped_asset, &burned_by, asset_id)
            .into();

        let event = match &settlement {
            Settlement::Transferred => {
                tracing::info!("Withdrawal {} rejected, re-minted to {}", withdrawal_index, burned_by);
                BridgeEvent::WithdrawalRejected {
                    side_ledger_id,
                    withdrawal_index,
                    wrapped_asset,
                    asset_id,
                    side_from: burned_by,
                }
            }
            Settlement::TransferFailed(error) => {
                tracing::warn!(
                    "Withdrawal {} rejected but re-mint failed: {}",
                    withdrawal_index,
                    error
                );
                BridgeEvent::WithdrawalRejectFailed {
                    side_ledger_id,
                    withdrawal_index,
                    wrapped_asset,
                    asset_id,
                    side_from: burned_by,
                    error: error.clone(),
                }
            }
        };
        self.events.push(event);
        Ok(settlement)
    }

    /// Hand control to a new signer registry (authorized by the current one)
    pub fn transfer_relayer(
        &mut self,
        side_ledger_id: LedgerId,
        new_registry: SignerRegistry,
        bundle: &[u8],
    ) -> Result<SignerRegistry, BridgeError> {
        let (previous, event) = transfer_relayer(
            self.identity,
            &mut self.registry,
            side_ledger_id,
            new_registry,
            bundle,
        )?;
        self.events.push(event);
        Ok(previous)
    }

    /// Events emitted since the last call, registry events included
    pub fn take_events(&mut self) -> Vec<BridgeEvent> {
        let mut events = self.registry.take_events();
        events.append(&mut self.events);
        events
    }
}
