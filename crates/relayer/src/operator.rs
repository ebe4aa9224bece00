//! Operator actions
//!
//! Authorized calls that are not triggered by an observed event: wrapped
//! asset registration and the two reject paths used for manual recovery.

use bridge_program::{
    AuthorizedCall, ExecutionOutcome, MainchainBridge, MainchainInstruction, Settlement,
    SidechainBridge, SidechainInstruction,
};
use bridge_types::{Address, RecordIndex};
use ledger_runtime::TransactionResult;

use crate::committer::Committer;

/// Signs and submits operator calls on both ledgers
#[derive(Clone)]
pub struct Operator {
    mainchain: Committer<MainchainBridge>,
    sidechain: Committer<SidechainBridge>,
}

impl Operator {
    pub fn new(mainchain: Committer<MainchainBridge>, sidechain: Committer<SidechainBridge>) -> Self {
        Self {
            mainchain,
            sidechain,
        }
    }

    /// Register the sidechain representation of a mainchain asset
    pub async fn create_wrapped_asset(
        &self,
        origin_asset: Address,
        name: &str,
        symbol: &str,
    ) -> anyhow::Result<Address> {
        let side_ledger_id = self.sidechain.ledger_id();
        let origin_ledger_id = self.mainchain.ledger_id();
        let call = AuthorizedCall::create_wrapped_asset(
            side_ledger_id,
            origin_ledger_id,
            &origin_asset,
            name,
            symbol,
        );
        let result = self
            .sidechain
            .commit(&call, |signatures| SidechainInstruction::CreateWrappedAsset {
                side_ledger_id,
                origin_ledger_id,
                origin_asset,
                name: name.to_string(),
                symbol: symbol.to_string(),
                signatures,
            })
            .await?;

        match accepted("createWrappedAsset", result)? {
            ExecutionOutcome::WrappedAssetCreated(wrapped_asset) => Ok(wrapped_asset),
            other => anyhow::bail!("createWrappedAsset: unexpected outcome {:?}", other),
        }
    }

    /// Return a locked deposit to its depositor
    pub async fn reject_deposit(&self, deposit_index: RecordIndex) -> anyhow::Result<Settlement> {
        let ledger_id = self.mainchain.ledger_id();
        let call = AuthorizedCall::reject_deposit(deposit_index);
        let result = self
            .mainchain
            .commit(&call, |signatures| MainchainInstruction::RejectDeposit {
                ledger_id,
                deposit_index,
                signatures,
            })
            .await?;
        settled("rejectDeposit", result)
    }

    /// Re-mint a burned withdrawal to its withdrawer
    pub async fn reject_withdrawal(&self, withdrawal_index: RecordIndex) -> anyhow::Result<Settlement> {
        let side_ledger_id = self.sidechain.ledger_id();
        let call = AuthorizedCall::reject_withdrawal(withdrawal_index);
        let result = self
            .sidechain
            .commit(&call, |signatures| SidechainInstruction::RejectWithdrawal {
                side_ledger_id,
                withdrawal_index,
                signatures,
            })
            .await?;
        settled("rejectWithdrawal", result)
    }
}

fn accepted(operation: &str, result: TransactionResult) -> anyhow::Result<ExecutionOutcome> {
    if !result.success {
        anyhow::bail!(
            "{} rejected at slot {}: {}",
            operation,
            result.slot,
            result.error.unwrap_or_default()
        );
    }
    result
        .outcome
        .ok_or_else(|| anyhow::anyhow!("{}: receipt without outcome", operation))
}

fn settled(operation: &str, result: TransactionResult) -> anyhow::Result<Settlement> {
    match accepted(operation, result)? {
        ExecutionOutcome::Settled(settlement) => {
            if let Settlement::TransferFailed(error) = &settlement {
                tracing::warn!("{} committed but the transfer failed: {}", operation, error);
            }
            Ok(settlement)
        }
        other => anyhow::bail!("{}: unexpected outcome {:?}", operation, other),
    }
}
