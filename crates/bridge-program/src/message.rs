//! Authorized call messages
//!
//! Selector and encoded arguments for every operation gated by a signer
//! registry. Bridges use these to check bundles; relayers use the same
//! constructors to produce the hash they sign, so both sides always agree
//! on the encoding.

use bridge_types::{AbiEncoder, Address, AssetId, LedgerId, RecordIndex};
use signer_registry::{
    authorization_hash, constants as registry_constants, Authorization, RegistryError,
    SignerRegistry,
};

use crate::constants;

/// An operation as seen by the signers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizedCall {
    pub selector: [u8; 4],
    pub args: Vec<u8>,
}

impl AuthorizedCall {
    fn new(selector: [u8; 4], args: AbiEncoder) -> Self {
        Self {
            selector,
            args: args.finish(),
        }
    }

    // Mainchain

    pub fn reject_deposit(deposit_index: RecordIndex) -> Self {
        Self::new(
            constants::REJECT_DEPOSIT,
            AbiEncoder::new().uint(u128::from(deposit_index)),
        )
    }

    pub fn finalize_withdrawal(
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        side_from: &Address,
        main_to: &Address,
    ) -> Self {
        Self::new(
            constants::FINALIZE_WITHDRAWAL,
            AbiEncoder::new()
                .ledger(ledger_id)
                .uint(u128::from(deposit_index))
                .ledger(side_ledger_id)
                .uint(u128::from(withdrawal_index))
                .address(side_from)
                .address(main_to),
        )
    }

    // Sidechain

    pub fn create_wrapped_asset(
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        origin_asset: &Address,
        name: &str,
        symbol: &str,
    ) -> Self {
        Self::new(
            constants::CREATE_WRAPPED_ASSET,
            AbiEncoder::new()
                .ledger(side_ledger_id)
                .ledger(origin_ledger_id)
                .address(origin_asset)
                .string(name)
                .string(symbol),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn finalize_deposit(
        side_ledger_id: LedgerId,
        origin_ledger_id: LedgerId,
        deposit_index: RecordIndex,
        origin_asset: &Address,
        asset_id: AssetId,
        origin_from: &Address,
        side_to: &Address,
    ) -> Self {
        Self::new(
            constants::FINALIZE_DEPOSIT,
            AbiEncoder::new()
                .ledger(side_ledger_id)
                .ledger(origin_ledger_id)
                .uint(u128::from(deposit_index))
                .address(origin_asset)
                .uint(asset_id)
                .address(origin_from)
                .address(side_to),
        )
    }

    pub fn reject_withdrawal(withdrawal_index: RecordIndex) -> Self {
        Self::new(
            constants::REJECT_WITHDRAWAL,
            AbiEncoder::new().uint(u128::from(withdrawal_index)),
        )
    }

    // Both sides

    /// Hand control to `new_registry`, binding its address and full configuration
    pub fn transfer_relayer(new_registry: &SignerRegistry) -> Self {
        Self::new(
            constants::TRANSFER_RELAYER,
            AbiEncoder::new()
                .address(&new_registry.identity())
                .word(&new_registry.commitment()),
        )
    }

    // Registry administration (target is the registry itself)

    pub fn add_signer(signer: &Address) -> Self {
        Self::new(registry_constants::ADD_SIGNER, AbiEncoder::new().address(signer))
    }

    pub fn remove_signer(signer: &Address) -> Self {
        Self::new(registry_constants::REMOVE_SIGNER, AbiEncoder::new().address(signer))
    }

    pub fn update_threshold(threshold: u32) -> Self {
        Self::new(
            registry_constants::UPDATE_THRESHOLD,
            AbiEncoder::new().uint(u128::from(threshold)),
        )
    }

    /// Hash to sign against `registry` at its current nonce
    pub fn hash(&self, registry: &SignerRegistry, target: &Address) -> [u8; 32] {
        registry.authorization_hash(target, self.selector, &self.args)
    }

    /// Hash to sign at an explicit nonce
    pub fn hash_at(&self, nonce: u64, target: &Address) -> [u8; 32] {
        authorization_hash(nonce, target, self.selector, &self.args)
    }

    /// Check a bundle for this call against `registry`
    pub fn authorize(
        &self,
        registry: &SignerRegistry,
        target: &Address,
        bundle: &[u8],
    ) -> Result<Authorization, RegistryError> {
        registry.authorize(target, self.selector, &self.args, bundle)
    }
}
