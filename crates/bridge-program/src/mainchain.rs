//! Mainchain Bridge
//!
//! Locks origin assets on deposit and releases them on an authorized
//! reject or finalize-withdrawal. Each deposit index moves
//! `Locked -> Rejected | Released` exactly once.

use bridge_types::{Address, AssetId, BridgeEvent, LedgerId, RecordIndex};
use serde::{Deserialize, Serialize};
use signer_registry::SignerRegistry;

use crate::{
    assets::{AssetLedger, InMemoryAssets},
    control::{ensure_ledger, transfer_relayer},
    message::AuthorizedCall,
    state::{DepositRecord, Settlement},
    BridgeError,
};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MainchainBridge<A = InMemoryAssets> {
    identity: Address,
    registry: SignerRegistry,
    assets: A,
    deposits: Vec<DepositRecord>,
    #[serde(skip)]
    events: Vec<BridgeEvent>,
}

impl<A: AssetLedger> MainchainBridge<A> {
    /// Create a bridge controlled by `registry`, holding custody in `assets`
    pub fn new(identity: Address, registry: SignerRegistry, assets: A) -> Self {
        Self {
            identity,
            registry,
            assets,
            deposits: Vec::new(),
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

    /// Registry admin operations go through here
    pub fn registry_mut(&mut self) -> &mut SignerRegistry {
        &mut self.registry
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut A {
        &mut self.assets
    }

    pub fn deposit_record(&self, index: RecordIndex) -> Option<&DepositRecord> {
        usize::try_from(index).ok().and_then(|i| self.deposits.get(i))
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposits.len() as u64
    }

    /// Lock `asset_id` from the caller and open a deposit record
    pub fn deposit(
        &mut self,
        caller: &Address,
        origin_asset: Address,
        asset_id: AssetId,
        side_ledger_id: LedgerId,
        side_to: Address,
    ) -> Result<RecordIndex, BridgeError> {
        if side_ledger_id == self.ledger_id() {
            return Err(BridgeError::SameLedger(side_ledger_id));
        }

        self.assets
            .transfer(&origin_asset, asset_id, caller, &self.identity)?;

        let deposit_index = self.deposits.len() as RecordIndex;
        self.deposits.push(DepositRecord {
            origin_asset,
            asset_id,
            locked_from: *caller,
            side_ledger_id,
            side_to,
            released_to: None,
        });

        tracing::info!(
            "Deposit {}: locked {} #{} from {} for {} on ledger {}",
            deposit_index,
            origin_asset,
            asset_id,
            caller,
            side_to,
            side_ledger_id
        );
        self.events.push(BridgeEvent::DepositInitiated {
            ledger_id: self.ledger_id(),
            deposit_index,
            origin_asset,
            asset_id,
            locked_from: *caller,
            side_ledger_id,
            side_to,
        });
        Ok(deposit_index)
    }

    /// Return a locked asset to its depositor (authorized)
    pub fn reject_deposit(
        &mut self,
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        bundle: &[u8],
    ) -> Result<Settlement, BridgeError> {
        ensure_ledger(self.ledger_id(), ledger_id)?;
        self.pending_deposit(deposit_index)?;

        let auth = AuthorizedCall::reject_deposit(deposit_index).authorize(
            &self.registry,
            &self.identity,
            bundle,
        )?;
        self.registry.consume(auth)?;

        let record = self.deposit_mut(deposit_index)?;
        record.released_to = Some(record.locked_from);
        let record = record.clone();

        let settlement: Settlement = self
            .assets
            .transfer(&record.origin_asset, record.asset_id, &self.identity, &record.locked_from)
            .into();

        let event = match &settlement {
            Settlement::Transferred => {
                tracing::info!("Deposit {} rejected, returned to {}", deposit_index, record.locked_from);
                BridgeEvent::DepositRejected {
                    ledger_id,
                    deposit_index,
                    origin_asset: record.origin_asset,
                    asset_id: record.asset_id,
                    locked_from: record.locked_from,
                }
            }
            Settlement::TransferFailed(error) => {
                tracing::warn!("Deposit {} rejected but return failed: {}", deposit_index, error);
                BridgeEvent::DepositRejectFailed {
                    ledger_id,
                    deposit_index,
                    origin_asset: record.origin_asset,
                    asset_id: record.asset_id,
                    locked_from: record.locked_from,
                    error: error.clone(),
                }
            }
        };
        self.events.push(event);
        Ok(settlement)
    }

    /// Release a locked asset against a sidechain withdrawal (authorized)
    ///
    /// The record is marked released before the transfer is attempted; a
    /// failed transfer is reported, not rolled back.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_withdrawal(
        &mut self,
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        side_from: Address,
        main_to: Address,
        bundle: &[u8],
    ) -> Result<Settlement, BridgeError> {
        ensure_ledger(self.ledger_id(), ledger_id)?;
        self.pending_deposit(deposit_index)?;

        let call = AuthorizedCall::finalize_withdrawal(
            ledger_id,
            deposit_index,
            side_ledger_id,
            withdrawal_index,
            &side_from,
            &main_to,
        );
        let auth = call.authorize(&self.registry, &self.identity, bundle)?;
        self.registry.consume(auth)?;

        let record = self.deposit_mut(deposit_index)?;
        record.released_to = Some(main_to);
        let (origin_asset, asset_id) = (record.origin_asset, record.asset_id);

        let settlement: Settlement = self
            .assets
            .transfer(&origin_asset, asset_id, &self.identity, &main_to)
            .into();

        let event = match &settlement {
            Settlement::Transferred => {
                tracing::info!(
                    "Withdrawal {} from ledger {} finalized: deposit {} released to {}",
                    withdrawal_index,
                    side_ledger_id,
                    deposit_index,
                    main_to
                );
                BridgeEvent::WithdrawalFinalized {
                    ledger_id,
                    deposit_index,
                    side_ledger_id,
                    withdrawal_index,
                    side_from,
                    main_to,
                    origin_asset,
                    asset_id,
                }
            }
            Settlement::TransferFailed(error) => {
                tracing::warn!(
                    "Withdrawal {} from ledger {} finalized but release of deposit {} failed: {}",
                    withdrawal_index,
                    side_ledger_id,
                    deposit_index,
                    error
                );
                BridgeEvent::WithdrawalFailed {
                    ledger_id,
                    deposit_index,
                    side_ledger_id,
                    withdrawal_index,
                    side_from,
                    main_to,
                    origin_asset,
                    asset_id,
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
        ledger_id: LedgerId,
        new_registry: SignerRegistry,
        bundle: &[u8],
    ) -> Result<SignerRegistry, BridgeError> {
        let (previous, event) =
            transfer_relayer(self.identity, &mut self.registry, ledger_id, new_registry, bundle)?;
        self.events.push(event);
        Ok(previous)
    }

    /// Events emitted since the last call, registry events included
    pub fn take_events(&mut self) -> Vec<BridgeEvent> {
        let mut events = self.registry.take_events();
        events.append(&mut self.events);
        events
    }

    fn deposit_mut(&mut self, deposit_index: RecordIndex) -> Result<&mut DepositRecord, BridgeError> {
        usize::try_from(deposit_index)
            .ok()
            .and_then(|i| self.deposits.get_mut(i))
            .ok_or(BridgeError::DepositNotFound(deposit_index))
    }

    fn pending_deposit(&self, deposit_index: RecordIndex) -> Result<&DepositRecord, BridgeError> {
        let record = self
            .deposit_record(deposit_index)
            .ok_or(BridgeError::DepositNotFound(deposit_index))?;
        if let Some(released_to) = record.released_to {
            return Err(BridgeError::DepositAlreadyReleased {
                index: deposit_index,
                released_to,
            });
        }
        Ok(record)
    }
}
