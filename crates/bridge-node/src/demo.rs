//! Scripted round trip against the running devnet
//!
//! Mints a collectible on the mainchain, deposits it, waits for the relayer
//! to mint the wrapped copy, withdraws it again and waits for the release.

use std::time::Duration;

use anyhow::Context;
use bridge_program::{
    ExecutionOutcome, MainchainBridge, MainchainInstruction, SidechainBridge, SidechainInstruction,
};
use bridge_types::{Address, AssetId};
use ledger_runtime::{LedgerProcessor, Transaction, TransactionResult, TransactionSender};
use relayer::Operator;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Handles the demo needs on both ledgers
pub struct DemoLedgers {
    pub main: LedgerProcessor<MainchainBridge>,
    pub side: LedgerProcessor<SidechainBridge>,
    pub main_tx: TransactionSender,
    pub side_tx: TransactionSender,
}

pub async fn run(ledgers: DemoLedgers, operator: Operator) -> anyhow::Result<()> {
    let user = Address::derive(&[b"demo-user"]);
    let collectible = Address::derive(&[b"demo-collectible"]);
    let main_ledger_id = ledgers.main.ledger_id();
    let side_ledger_id = ledgers.side.ledger_id();

    // One new token id per run
    let (asset_id, minted) = {
        let program = ledgers.main.program();
        let mut bridge = program.write();
        let asset_id = AssetId::from(bridge.deposit_count());
        let minted = bridge.assets_mut().mint(collectible, asset_id, user);
        (asset_id, minted)
    };
    anyhow::ensure!(minted, "{} #{} already exists", collectible, asset_id);
    tracing::info!("Demo: minted {} #{} to {}", collectible, asset_id, user);

    let existing = ledgers
        .side
        .program()
        .read()
        .factory()
        .lookup(main_ledger_id, &collectible);
    let wrapped_asset = match existing {
        Some(wrapped_asset) => wrapped_asset,
        None => operator
            .create_wrapped_asset(collectible, "Demo Collectible", "DEMO")
            .await
            .context("registering the wrapped asset")?,
    };
    tracing::info!("Demo: wrapped asset is {}", wrapped_asset);

    let deposit = MainchainInstruction::Deposit {
        origin_asset: collectible,
        asset_id,
        side_ledger_id,
        side_to: user,
    };
    let deposit_index = match recorded(ledgers.main_tx.submit(Transaction::new(user, deposit.to_bytes())).await?)? {
        ExecutionOutcome::Recorded(index) => index,
        other => anyhow::bail!("deposit: unexpected outcome {:?}", other),
    };
    tracing::info!("Demo: deposit {} submitted", deposit_index);

    let side = ledgers.side.clone();
    wait_until("deposit finalization", move || {
        side.program()
            .read()
            .is_deposit_finalized(main_ledger_id, deposit_index)
    })
    .await?;
    tracing::info!("Demo: deposit {} finalized on ledger {}", deposit_index, side_ledger_id);

    let withdraw = SidechainInstruction::Withdraw {
        wrapped_asset,
        asset_id,
        main_to: user,
    };
    let withdrawal_index = match recorded(ledgers.side_tx.submit(Transaction::new(user, withdraw.to_bytes())).await?)? {
        ExecutionOutcome::Recorded(index) => index,
        other => anyhow::bail!("withdraw: unexpected outcome {:?}", other),
    };
    tracing::info!("Demo: withdrawal {} submitted", withdrawal_index);

    let main = ledgers.main.clone();
    wait_until("withdrawal release", move || {
        main.program()
            .read()
            .deposit_record(deposit_index)
            .and_then(|record| record.released_to)
            == Some(user)
    })
    .await?;
    tracing::info!("Demo: {} #{} released back to {}", collectible, asset_id, user);

    Ok(())
}

fn recorded(result: TransactionResult) -> anyhow::Result<ExecutionOutcome> {
    if !result.success {
        anyhow::bail!("rejected: {}", result.error.unwrap_or_default());
    }
    result.outcome.context("receipt without outcome")
}

/// Poll `done` until it holds or the step times out
async fn wait_until<F>(step: &str, done: F) -> anyhow::Result<()>
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while !done() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for {}", step);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}
