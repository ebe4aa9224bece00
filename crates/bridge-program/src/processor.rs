//! Bridge Program Processor
//!
//! Decodes instruction bytes and dispatches them to a bridge. The ledger
//! runtime drives both bridges through [`BridgeProgram`] without knowing
//! which side it hosts.

use std::fmt;

use borsh::BorshDeserialize;
use bridge_types::{Address, BridgeEvent, LedgerId, RecordIndex};
use serde::{Deserialize, Serialize};
use signer_registry::SignerRegistry;

use crate::{
    assets::AssetLedger,
    instruction::{MainchainInstruction, RegistryInstruction, SidechainInstruction},
    mainchain::MainchainBridge,
    sidechain::SidechainBridge,
    state::{DepositSettlement, Settlement},
    BridgeError,
};

/// What a successfully executed instruction did
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// A deposit or withdrawal record was appended
    Recorded(RecordIndex),
    /// An authorized release committed; the transfer may still have failed
    Settled(Settlement),
    DepositSettled(DepositSettlement),
    WrappedAssetCreated(Address),
    RelayerTransferred { previous: Address, current: Address },
    RegistryUpdated,
    /// Accepted without any state change
    Unchanged,
}

/// A bridge hosted by a ledger
pub trait BridgeProgram {
    type Instruction: BorshDeserialize + fmt::Debug;

    fn ledger_id(&self) -> LedgerId;

    fn identity(&self) -> Address;

    fn registry(&self) -> &SignerRegistry;

    /// Apply one decoded instruction on behalf of `caller`
    fn execute(
        &mut self,
        caller: &Address,
        instruction: Self::Instruction,
    ) -> Result<ExecutionOutcome, BridgeError>;

    fn take_events(&mut self) -> Vec<BridgeEvent>;
}

/// Decode and execute instruction bytes
pub fn process<P: BridgeProgram>(
    program: &mut P,
    caller: &Address,
    instruction_data: &[u8],
) -> Result<ExecutionOutcome, BridgeError> {
    let instruction = P::Instruction::try_from_slice(instruction_data)
        .map_err(|_| BridgeError::InvalidInstructionData)?;

    tracing::debug!(
        "Ledger {}: executing {:?} from {}",
        program.ledger_id(),
        instruction,
        caller
    );
    program.execute(caller, instruction)
}

fn process_registry(
    registry: &mut SignerRegistry,
    instruction: RegistryInstruction,
) -> Result<ExecutionOutcome, BridgeError> {
    match instruction {
        RegistryInstruction::AddSigner { signer, signatures } => {
            registry.add_signer(signer, &signatures)?;
            Ok(ExecutionOutcome::RegistryUpdated)
        }
        RegistryInstruction::RemoveSigner { signer, signatures } => {
            registry.remove_signer(signer, &signatures)?;
            Ok(ExecutionOutcome::RegistryUpdated)
        }
        RegistryInstruction::UpdateThreshold {
            threshold,
            signatures,
        } => {
            if registry.update_threshold(threshold, &signatures)? {
                Ok(ExecutionOutcome::RegistryUpdated)
            } else {
                Ok(ExecutionOutcome::Unchanged)
            }
        }
    }
}

impl<A: AssetLedger> BridgeProgram for MainchainBridge<A> {
    type Instruction = MainchainInstruction;

    fn ledger_id(&self) -> LedgerId {
        MainchainBridge::ledger_id(self)
    }

    fn identity(&self) -> Address {
        MainchainBridge::identity(self)
    }

    fn registry(&self) -> &SignerRegistry {
        MainchainBridge::registry(self)
    }

    fn execute(
        &mut self,
        caller: &Address,
        instruction: MainchainInstruction,
    ) -> Result<ExecutionOutcome, BridgeError> {
        match instruction {
            MainchainInstruction::Deposit {
                origin_asset,
                asset_id,
                side_ledger_id,
                side_to,
            } => self
                .deposit(caller, origin_asset, asset_id, side_ledger_id, side_to)
                .map(ExecutionOutcome::Recorded),

            MainchainInstruction::RejectDeposit {
                ledger_id,
                deposit_index,
                signatures,
            } => self
                .reject_deposit(ledger_id, deposit_index, &signatures)
                .map(ExecutionOutcome::Settled),

            MainchainInstruction::FinalizeWithdrawal {
                ledger_id,
                deposit_index,
                side_ledger_id,
                withdrawal_index,
                side_from,
                main_to,
                signatures,
            } => self
                .finalize_withdrawal(
                    ledger_id,
                    deposit_index,
                    side_ledger_id,
                    withdrawal_index,
                    side_from,
                    main_to,
                    &signatures,
                )
                .map(ExecutionOutcome::Settled),

            MainchainInstruction::TransferRelayer {
                ledger_id,
                new_registry,
                signatures,
            } => {
                let new_registry = new_registry.build(MainchainBridge::ledger_id(self))?;
                let current = new_registry.identity();
                let previous = self.transfer_relayer(ledger_id, new_registry, &signatures)?;
                Ok(ExecutionOutcome::RelayerTransferred {
                    previous: previous.identity(),
                    current,
                })
            }

            MainchainInstruction::Registry(ix) => process_registry(self.registry_mut(), ix),
        }
    }

    fn take_events(&mut self) -> Vec<BridgeEvent> {
        MainchainBridge::take_events(self)
    }
}

impl BridgeProgram for SidechainBridge {
    type Instruction = SidechainInstruction;

    fn ledger_id(&self) -> LedgerId {
        SidechainBridge::ledger_id(self)
    }

    fn identity(&self) -> Address {
        SidechainBridge::identity(self)
    }

    fn registry(&self) -> &SignerRegistry {
        SidechainBridge::registry(self)
    }

    fn execute(
        &mut self,
        caller: &Address,
        instruction: SidechainInstruction,
    ) -> Result<ExecutionOutcome, BridgeError> {
        match instruction {
            SidechainInstruction::CreateWrappedAsset {
                side_ledger_id,
                origin_ledger_id,
                origin_asset,
                name,
                symbol,
                signatures,
            } => self
                .create_wrapped_asset(
                    side_ledger_id,
                    origin_ledger_id,
                    origin_asset,
                    &name,
                    &symbol,
                    &signatures,
                )
                .map(ExecutionOutcome::WrappedAssetCreated),

            SidechainInstruction::FinalizeDeposit {
                side_ledger_id,
                origin_ledger_id,
                deposit_index,
                origin_asset,
                asset_id,
                origin_from,
                side_to,
                signatures,
            } => self
                .finalize_deposit(
                    side_ledger_id,
                    origin_ledger_id,
                    deposit_index,
                    origin_asset,
                    asset_id,
                    origin_from,
                    side_to,
                    &signatures,
                )
                .map(ExecutionOutcome::DepositSettled),

            SidechainInstruction::Withdraw {
                wrapped_asset,
                asset_id,
                main_to,
            } => self
                .withdraw(caller, wrapped_asset, asset_id, main_to)
                .map(ExecutionOutcome::Recorded),

            SidechainInstruction::RejectWithdrawal {
                side_ledger_id,
                withdrawal_index,
                signatures,
            } => self
                .reject_withdrawal(side_ledger_id, withdrawal_index, &signatures)
                .map(ExecutionOutcome::Settled),

            SidechainInstruction::TransferRelayer {
                side_ledger_id,
                new_registry,
                signatures,
            } => {
                let new_registry = new_registry.build(SidechainBridge::ledger_id(self))?;
                let current = new_registry.identity();
                let previous = self.transfer_relayer(side_ledger_id, new_registry, &signatures)?;
                Ok(ExecutionOutcome::RelayerTransferred {
                    previous: previous.identity(),
                    current,
                })
            }

            SidechainInstruction::Registry(ix) => process_registry(self.registry_mut(), ix),
        }
    }

    fn take_events(&mut self) -> Vec<BridgeEvent> {
        SidechainBridge::take_events(self)
    }
}
