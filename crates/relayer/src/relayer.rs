//! Relayer main loop
//!
//! Follows both ledgers and turns each initiated transfer into the matching
//! finalize call on the counterpart ledger:
//! - `DepositInitiated` on the mainchain becomes `finalizeDeposit`
//! - `WithdrawalInitiated` on the sidechain becomes `finalizeWithdrawal`
//!
//! Deposits that reach the sidechain before their wrapped asset exists are
//! parked and resubmitted when the matching `WrappedAssetCreated` shows up.
//! A transfer the origin ledger has since rejected is never relayed, so a
//! replay of the full event history leaves both ledgers as they are.
//! Committed-but-failed settlements are logged for manual recovery only.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bridge_program::{
    AuthorizedCall, DepositSettlement, ExecutionOutcome, MainchainBridge, MainchainInstruction,
    Settlement, SidechainBridge, SidechainInstruction,
};
use bridge_types::{Address, AssetId, BridgeEvent, ErrorKind, LedgerId, RecordIndex};
use ledger_runtime::{BlockProducer, RecordedEvent, TransactionResult};
use serde::{Deserialize, Serialize};
use signer_registry::SignerKey;
use tokio::sync::watch;

use crate::{collector::SignatureCollector, committer::Committer, operator::Operator, watcher::EventWatcher};

/// Relayer configuration
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RelayerConfig {
    /// Caller address on submitted transactions
    pub address: Address,
    /// Sign with every held key instead of stopping at the threshold
    pub over_collect: bool,
    /// Submissions per call before giving up on a moving nonce
    pub max_attempts: u32,
    /// First event sequence number to process on each ledger
    pub start_seq: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            address: Address::derive(&[b"relayer"]),
            over_collect: false,
            max_attempts: 3,
            start_seq: 0,
        }
    }
}

/// Relayer counters
#[derive(Default)]
pub struct RelayerStats {
    deposits_finalized: AtomicU64,
    withdrawals_finalized: AtomicU64,
    deposits_deferred: AtomicU64,
    redundant: AtomicU64,
    settlement_failures: AtomicU64,
    submit_errors: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`RelayerStats`]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub deposits_finalized: u64,
    pub withdrawals_finalized: u64,
    pub deposits_deferred: u64,
    /// Submissions rejected as already applied
    pub redundant: u64,
    /// Failed-transfer events observed on either ledger
    pub settlement_failures: u64,
    pub submit_errors: u64,
    /// Transfers not relayed because the origin ledger already settled them
    pub abandoned: u64,
}

impl RelayerStats {
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            deposits_finalized: self.deposits_finalized.load(Ordering::Relaxed),
            withdrawals_finalized: self.withdrawals_finalized.load(Ordering::Relaxed),
            deposits_deferred: self.deposits_deferred.load(Ordering::Relaxed),
            redundant: self.redundant.load(Ordering::Relaxed),
            settlement_failures: self.settlement_failures.load(Ordering::Relaxed),
            submit_errors: self.submit_errors.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A mainchain deposit waiting to be finalized on the sidechain
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingDeposit {
    origin_ledger_id: LedgerId,
    deposit_index: RecordIndex,
    origin_asset: Address,
    asset_id: AssetId,
    origin_from: Address,
    side_to: Address,
}

/// Off-ledger relayer between one mainchain and one sidechain
pub struct Relayer {
    mainchain: Committer<MainchainBridge>,
    sidechain: Committer<SidechainBridge>,
    main_events: EventWatcher,
    side_events: EventWatcher,
    /// Deposits parked until their wrapped asset is registered
    deferred: Vec<PendingDeposit>,
    stats: Arc<RelayerStats>,
}

impl Relayer {
    pub fn new(
        config: RelayerConfig,
        keys: Vec<SignerKey>,
        mainchain: &BlockProducer<MainchainBridge>,
        sidechain: &BlockProducer<SidechainBridge>,
    ) -> Self {
        let collector = Arc::new(SignatureCollector::new(keys, config.over_collect));
        tracing::info!(
            "Relayer {} holds {} signer keys (over-collect: {})",
            config.address,
            collector.len(),
            config.over_collect
        );

        Self {
            mainchain: Committer::new(mainchain, collector.clone(), config.address, config.max_attempts),
            sidechain: Committer::new(sidechain, collector, config.address, config.max_attempts),
            main_events: EventWatcher::new(
                "mainchain",
                mainchain.subscribe(),
                mainchain.processor().event_store().clone(),
                config.start_seq,
            ),
            side_events: EventWatcher::new(
                "sidechain",
                sidechain.subscribe(),
                sidechain.processor().event_store().clone(),
                config.start_seq,
            ),
            deferred: Vec::new(),
            stats: Arc::new(RelayerStats::default()),
        }
    }

    /// Shared counters, readable while the relayer runs
    pub fn stats(&self) -> Arc<RelayerStats> {
        self.stats.clone()
    }

    /// Handle for operator calls using the same signer keys
    pub fn operator(&self) -> Operator {
        Operator::new(self.mainchain.clone(), self.sidechain.clone())
    }

    /// Relay until `shutdown` flips to true or either ledger goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Relayer started: ledger {} <-> ledger {}",
            self.mainchain.ledger_id(),
            self.sidechain.ledger_id()
        );

        loop {
            tokio::select! {
                events = self.main_events.next_events() => {
                    let Some(events) = events else { break };
                    for recorded in events {
                        self.on_mainchain_event(recorded).await;
                    }
                }
                events = self.side_events.next_events() => {
                    let Some(events) = events else { break };
                    for recorded in events {
                        self.on_sidechain_event(recorded).await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            "Relayer stopped at mainchain seq {}, sidechain seq {} ({} deposits parked): {:?}",
            self.main_events.cursor(),
            self.side_events.cursor(),
            self.deferred.len(),
            self.stats.summary()
        );
    }

    async fn on_mainchain_event(&mut self, recorded: RecordedEvent) {
        if let BridgeEvent::DepositRejected { ledger_id, deposit_index, .. }
        | BridgeEvent::DepositRejectFailed { ledger_id, deposit_index, .. } = &recorded.event
        {
            self.forget_deposit(*ledger_id, *deposit_index);
        }

        match recorded.event {
            BridgeEvent::DepositInitiated {
                ledger_id,
                deposit_index,
                origin_asset,
                asset_id,
                locked_from,
                side_ledger_id,
                side_to,
            } => {
                if side_ledger_id != self.sidechain.ledger_id() {
                    tracing::debug!(
                        "Deposit {} targets ledger {}, not ours",
                        deposit_index,
                        side_ledger_id
                    );
                    return;
                }
                self.relay_deposit(PendingDeposit {
                    origin_ledger_id: ledger_id,
                    deposit_index,
                    origin_asset,
                    asset_id,
                    origin_from: locked_from,
                    side_to,
                })
                .await;
            }
            event => self.observe(event),
        }
    }

    async fn on_sidechain_event(&mut self, recorded: RecordedEvent) {
        match recorded.event {
            BridgeEvent::WithdrawalInitiated {
                side_ledger_id,
                withdrawal_index,
                origin_ledger_id,
                deposit_index,
                side_from,
                main_to,
                ..
            } => {
                if origin_ledger_id != self.mainchain.ledger_id() {
                    tracing::debug!(
                        "Withdrawal {} targets ledger {}, not ours",
                        withdrawal_index,
                        origin_ledger_id
                    );
                    return;
                }
                self.relay_withdrawal(
                    origin_ledger_id,
                    deposit_index,
                    side_ledger_id,
                    withdrawal_index,
                    side_from,
                    main_to,
                )
                .await;
            }
            BridgeEvent::WrappedAssetCreated {
                origin_ledger_id,
                origin_asset,
                wrapped_asset,
                ..
            } => {
                let (ready, parked): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
                    .into_iter()
                    .partition(|d| d.origin_ledger_id == origin_ledger_id && d.origin_asset == origin_asset);
                self.deferred = parked;
                if !ready.is_empty() {
                    tracing::info!(
                        "Wrapped asset {} registered, resubmitting {} parked deposits",
                        wrapped_asset,
                        ready.len()
                    );
                }
                for deposit in ready {
                    self.relay_deposit(deposit).await;
                }
            }
            event => self.observe(event),
        }
    }

    /// Events that need no submission
    fn observe(&self, event: BridgeEvent) {
        if event.is_settlement_failure() {
            bump(&self.stats.settlement_failures);
            tracing::warn!("Settlement failed, manual recovery needed: {:?}", event);
        } else {
            tracing::trace!("Observed {}", event.name());
        }
    }

    /// Drop a parked deposit whose origin ledger returned the asset
    fn forget_deposit(&mut self, origin_ledger_id: LedgerId, deposit_index: RecordIndex) {
        let before = self.deferred.len();
        self.deferred
            .retain(|d| !(d.origin_ledger_id == origin_ledger_id && d.deposit_index == deposit_index));
        if self.deferred.len() < before {
            bump(&self.stats.abandoned);
            tracing::info!("Deposit {} rejected on ledger {}, no longer parked", deposit_index, origin_ledger_id);
        }
    }

    async fn relay_deposit(&mut self, deposit: PendingDeposit) {
        let released = {
            let program = self.mainchain.ledger().program();
            let bridge = program.read();
            bridge
                .deposit_record(deposit.deposit_index)
                .is_some_and(|record| record.is_released())
        };
        if released {
            bump(&self.stats.abandoned);
            tracing::info!(
                "Deposit {} already released on ledger {}, not relaying",
                deposit.deposit_index,
                deposit.origin_ledger_id
            );
            return;
        }

        let side_ledger_id = self.sidechain.ledger_id();
        let call = AuthorizedCall::finalize_deposit(
            side_ledger_id,
            deposit.origin_ledger_id,
            deposit.deposit_index,
            &deposit.origin_asset,
            deposit.asset_id,
            &deposit.origin_from,
            &deposit.side_to,
        );
        let submitted = self
            .sidechain
            .commit(&call, |signatures| SidechainInstruction::FinalizeDeposit {
                side_ledger_id,
                origin_ledger_id: deposit.origin_ledger_id,
                deposit_index: deposit.deposit_index,
                origin_asset: deposit.origin_asset,
                asset_id: deposit.asset_id,
                origin_from: deposit.origin_from,
                side_to: deposit.side_to,
                signatures,
            })
            .await;

        let label = format!("finalizeDeposit({})", deposit.deposit_index);
        let Some(outcome) = self.receipt(&label, submitted) else {
            return;
        };
        match outcome {
            ExecutionOutcome::DepositSettled(DepositSettlement::Minted { wrapped_asset }) => {
                bump(&self.stats.deposits_finalized);
                tracing::info!(
                    "Relayed deposit {} -> {} #{} for {}",
                    deposit.deposit_index,
                    wrapped_asset,
                    deposit.asset_id,
                    deposit.side_to
                );
            }
            ExecutionOutcome::DepositSettled(DepositSettlement::WrappedAssetMissing) => {
                bump(&self.stats.deposits_deferred);
                tracing::info!(
                    "Deposit {} parked until {} has a wrapped asset",
                    deposit.deposit_index,
                    deposit.origin_asset
                );
                if !self.deferred.contains(&deposit) {
                    self.deferred.push(deposit);
                }
            }
            // Reported by the DepositFailed event on the sidechain
            ExecutionOutcome::DepositSettled(DepositSettlement::MintFailed { .. }) => {}
            other => tracing::warn!("{}: unexpected outcome {:?}", label, other),
        }
    }

    async fn relay_withdrawal(
        &mut self,
        ledger_id: LedgerId,
        deposit_index: RecordIndex,
        side_ledger_id: LedgerId,
        withdrawal_index: RecordIndex,
        side_from: Address,
        main_to: Address,
    ) {
        let rejected = {
            let program = self.sidechain.ledger().program();
            let bridge = program.read();
            bridge
                .withdrawal_record(withdrawal_index)
                .is_some_and(|record| record.rejected)
        };
        if rejected {
            bump(&self.stats.abandoned);
            tracing::info!(
                "Withdrawal {} already rejected on ledger {}, not relaying",
                withdrawal_index,
                side_ledger_id
            );
            return;
        }

        let call = AuthorizedCall::finalize_withdrawal(
            ledger_id,
            deposit_index,
            side_ledger_id,
            withdrawal_index,
            &side_from,
            &main_to,
        );
        let submitted = self
            .mainchain
            .commit(&call, |signatures| MainchainInstruction::FinalizeWithdrawal {
                ledger_id,
                deposit_index,
                side_ledger_id,
                withdrawal_index,
                side_from,
                main_to,
                signatures,
            })
            .await;

        let label = format!("finalizeWithdrawal({})", withdrawal_index);
        match self.receipt(&label, submitted) {
            Some(ExecutionOutcome::Settled(Settlement::Transferred)) => {
                bump(&self.stats.withdrawals_finalized);
                tracing::info!(
                    "Relayed withdrawal {}: deposit {} released to {}",
                    withdrawal_index,
                    deposit_index,
                    main_to
                );
            }
            // Reported by the WithdrawalFailed event on the mainchain
            Some(ExecutionOutcome::Settled(Settlement::TransferFailed(_))) | None => {}
            Some(other) => tracing::warn!("{}: unexpected outcome {:?}", label, other),
        }
    }

    /// Outcome of an accepted submission; rejections are counted and logged
    fn receipt(
        &self,
        label: &str,
        submitted: anyhow::Result<TransactionResult>,
    ) -> Option<ExecutionOutcome> {
        let result = match submitted {
            Ok(result) => result,
            Err(e) => {
                bump(&self.stats.submit_errors);
                tracing::warn!("{}: submission failed: {:#}", label, e);
                return None;
            }
        };
        if result.success {
            return result.outcome;
        }

        let reason = result.error.unwrap_or_default();
        if result.error_kind == Some(ErrorKind::StateConflict) {
            bump(&self.stats.redundant);
            tracing::debug!("{}: already applied ({})", label, reason);
        } else {
            bump(&self.stats.submit_errors);
            tracing::warn!("{}: rejected at slot {}: {}", label, result.slot, reason);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_program::{AssetLedger, InMemoryAssets};
    use ledger_runtime::{BlockProducerConfig, LedgerProcessor, Transaction, TransactionSender};
    use signer_registry::SignerRegistry;
    use std::time::Duration;

    const MAIN: LedgerId = LedgerId(1);
    const SIDE: LedgerId = LedgerId(2);

    struct Devnet {
        keys: Vec<SignerKey>,
        main: BlockProducer<MainchainBridge>,
        side: BlockProducer<SidechainBridge>,
        kitties: Address,
        alice: Address,
        bob: Address,
    }

    fn devnet() -> Devnet {
        let keys: Vec<SignerKey> = (0..3).map(|_| SignerKey::generate()).collect();
        let kitties = Address::derive(&[b"kitties"]);
        let alice = Address::derive(&[b"alice"]);
        let registry = |name: &[u8], ledger_id| {
            SignerRegistry::new(Address::derive(&[name]), ledger_id, keys.iter().map(|k| k.address()), 2)
                .unwrap()
        };

        let mut assets = InMemoryAssets::new();
        assets.mint(kitties, 7, alice);
        assets.mint(kitties, 8, alice);
        let main = MainchainBridge::new(Address::derive(&[b"main-bridge"]), registry(b"main-registry", MAIN), assets);
        let side = SidechainBridge::new(Address::derive(&[b"side-bridge"]), registry(b"side-registry", SIDE));

        let config = BlockProducerConfig {
            block_time_ms: 5,
            ..Default::default()
        };
        Devnet {
            main: BlockProducer::new(LedgerProcessor::new(main), config.clone()),
            side: BlockProducer::new(LedgerProcessor::new(side), config),
            keys,
            kitties,
            alice,
            bob: Address::derive(&[b"bob"]),
        }
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn deposit(sender: &TransactionSender, kitties: Address, asset_id: AssetId, alice: Address, bob: Address) {
        let ix = MainchainInstruction::Deposit {
            origin_asset: kitties,
            asset_id,
            side_ledger_id: SIDE,
            side_to: bob,
        };
        let receipt = sender
            .submit(Transaction::new(alice, ix.to_bytes()))
            .await
            .unwrap();
        assert!(receipt.success, "{:?}", receipt.error);
    }

    #[tokio::test]
    async fn test_relayer_round_trip() {
        let env = devnet();
        let relayer = Relayer::new(RelayerConfig::default(), env.keys.clone(), &env.main, &env.side);
        let stats = relayer.stats();
        let operator = relayer.operator();
        let main_state = env.main.processor().program();
        let side_state = env.side.processor().program();
        let main_tx = env.main.transaction_sender();
        let side_tx = env.side.transaction_sender();
        let (kitties, alice, bob) = (env.kitties, env.alice, env.bob);
        let (main_stop, side_stop) = (env.main.running_flag(), env.side.running_flag());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let main_task = tokio::spawn(env.main.run_async());
        let side_task = tokio::spawn(env.side.run_async());
        let relayer_task = tokio::spawn(relayer.run(shutdown_rx));

        // Deposit lands before the wrapped asset exists, so it gets parked
        deposit(&main_tx, kitties, 7, alice, bob).await;
        wait_for(|| stats.summary().deposits_deferred == 1).await;

        let wrapped = operator
            .create_wrapped_asset(kitties, "Kitties", "KIT")
            .await
            .unwrap();
        wait_for(|| stats.summary().deposits_finalized == 1).await;
        assert_eq!(
            side_state.read().factory().get(&wrapped).unwrap().balance_of(&bob, 7),
            1
        );

        // Bob withdraws; the relayer finalizes on the mainchain
        let withdraw = SidechainInstruction::Withdraw {
            wrapped_asset: wrapped,
            asset_id: 7,
            main_to: bob,
        };
        let receipt = side_tx
            .submit(Transaction::new(bob, withdraw.to_bytes()))
            .await
            .unwrap();
        assert!(receipt.success, "{:?}", receipt.error);
        wait_for(|| stats.summary().withdrawals_finalized == 1).await;
        assert_eq!(main_state.read().assets().owner_of(&kitties, 7), Some(bob));

        // A second deposit goes straight through now
        deposit(&main_tx, kitties, 8, alice, bob).await;
        wait_for(|| stats.summary().deposits_finalized == 2).await;
        assert_eq!(stats.summary().submit_errors, 0);

        shutdown_tx.send(true).unwrap();
        relayer_task.await.unwrap();
        main_stop.store(false, Ordering::SeqCst);
        side_stop.store(false, Ordering::SeqCst);
        main_task.await.unwrap();
        side_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_settlement_is_reported() {
        let env = devnet();
        let relayer = Relayer::new(RelayerConfig::default(), env.keys.clone(), &env.main, &env.side);
        let stats = relayer.stats();
        let operator = relayer.operator();
        let main_state = env.main.processor().program();
        let main_tx = env.main.transaction_sender();
        let (kitties, alice, bob) = (env.kitties, env.alice, env.bob);
        let (main_stop, side_stop) = (env.main.running_flag(), env.side.running_flag());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let main_task = tokio::spawn(env.main.run_async());
        let side_task = tokio::spawn(env.side.run_async());
        let relayer_task = tokio::spawn(relayer.run(shutdown_rx));

        deposit(&main_tx, kitties, 7, alice, bob).await;
        wait_for(|| stats.summary().deposits_deferred == 1).await;

        // Alice's account starts refusing receipts, so the reject commits but cannot pay out
        main_state.write().assets_mut().refuse_receipts(alice);
        let settlement = operator.reject_deposit(0).await.unwrap();
        assert!(!settlement.is_transferred());
        wait_for(|| stats.summary().settlement_failures == 1).await;
        assert!(main_state.read().deposit_record(0).unwrap().is_released());

        // A second reject is redundant and leaves everything as it was
        assert!(operator.reject_deposit(0).await.is_err());
        assert_eq!(main_state.read().registry().nonce(), 1);

        shutdown_tx.send(true).unwrap();
        relayer_task.await.unwrap();
        main_stop.store(false, Ordering::SeqCst);
        side_stop.store(false, Ordering::SeqCst);
        main_task.await.unwrap();
        side_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_deposit_leaves_parking() {
        let env = devnet();
        let relayer = Relayer::new(RelayerConfig::default(), env.keys.clone(), &env.main, &env.side);
        let stats = relayer.stats();
        let operator = relayer.operator();
        let main_state = env.main.processor().program();
        let side_state = env.side.processor().program();
        let main_tx = env.main.transaction_sender();
        let side_tx = env.side.transaction_sender();
        let (kitties, alice, bob) = (env.kitties, env.alice, env.bob);
        let (main_stop, side_stop) = (env.main.running_flag(), env.side.running_flag());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let main_task = tokio::spawn(env.main.run_async());
        let side_task = tokio::spawn(env.side.run_async());
        let relayer_task = tokio::spawn(relayer.run(shutdown_rx));

        deposit(&main_tx, kitties, 7, alice, bob).await;
        wait_for(|| stats.summary().deposits_deferred == 1).await;

        assert!(operator.reject_deposit(0).await.unwrap().is_transferred());
        wait_for(|| stats.summary().abandoned == 1).await;
        assert_eq!(main_state.read().assets().owner_of(&kitties, 7), Some(alice));

        // Registering the wrapped asset must not resurrect deposit 0
        let wrapped = operator
            .create_wrapped_asset(kitties, "Kitties", "KIT")
            .await
            .unwrap();
        deposit(&main_tx, kitties, 8, alice, bob).await;
        wait_for(|| stats.summary().deposits_finalized == 1).await;

        // The withdrawal is relayed after WrappedAssetCreated on the same log
        let withdraw = SidechainInstruction::Withdraw {
            wrapped_asset: wrapped,
            asset_id: 8,
            main_to: bob,
        };
        let receipt = side_tx
            .submit(Transaction::new(bob, withdraw.to_bytes()))
            .await
            .unwrap();
        assert!(receipt.success, "{:?}", receipt.error);
        wait_for(|| stats.summary().withdrawals_finalized == 1).await;

        let summary = stats.summary();
        assert_eq!(summary.deposits_finalized, 1);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.submit_errors, 0);
        assert_eq!(
            side_state.read().factory().get(&wrapped).unwrap().balance_of(&bob, 7),
            0
        );
        assert!(!side_state.read().is_deposit_finalized(MAIN, 0));
        assert_eq!(main_state.read().assets().owner_of(&kitties, 7), Some(alice));

        shutdown_tx.send(true).unwrap();
        relayer_task.await.unwrap();
        main_stop.store(false, Ordering::SeqCst);
        side_stop.store(false, Ordering::SeqCst);
        main_task.await.unwrap();
        side_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_skips_rejected_transfers() {
        let env = devnet();
        let mut first = Relayer::new(RelayerConfig::default(), env.keys.clone(), &env.main, &env.side);
        let operator = first.operator();
        let main_state = env.main.processor().program();
        let side_state = env.side.processor().program();
        let main_tx = env.main.transaction_sender();
        let side_tx = env.side.transaction_sender();
        let main_bridge = main_state.read().identity();
        let (kitties, alice, bob) = (env.kitties, env.alice, env.bob);

        let (main_stop, side_stop) = (env.main.running_flag(), env.side.running_flag());

        // Started only once the history below exists
        let second = Relayer::new(
            RelayerConfig {
                start_seq: 0,
                ..Default::default()
            },
            env.keys.clone(),
            &env.main,
            &env.side,
        );
        let stats = second.stats();

        // `first` never runs its loop; the history is built by hand
        let main_task = tokio::spawn(env.main.run_async());
        let side_task = tokio::spawn(env.side.run_async());

        // Deposit 0 is rejected on the mainchain before anyone relays it
        deposit(&main_tx, kitties, 7, alice, bob).await;
        deposit(&main_tx, kitties, 8, alice, bob).await;
        assert!(operator.reject_deposit(0).await.unwrap().is_transferred());

        // Deposit 1 is relayed, withdrawn and the withdrawal rejected on the sidechain
        let wrapped = operator
            .create_wrapped_asset(kitties, "Kitties", "KIT")
            .await
            .unwrap();
        first
            .relay_deposit(PendingDeposit {
                origin_ledger_id: MAIN,
                deposit_index: 1,
                origin_asset: kitties,
                asset_id: 8,
                origin_from: alice,
                side_to: bob,
            })
            .await;
        assert_eq!(first.stats().summary().deposits_finalized, 1);
        let withdraw = SidechainInstruction::Withdraw {
            wrapped_asset: wrapped,
            asset_id: 8,
            main_to: bob,
        };
        let receipt = side_tx
            .submit(Transaction::new(bob, withdraw.to_bytes()))
            .await
            .unwrap();
        assert!(receipt.success, "{:?}", receipt.error);
        assert!(operator.reject_withdrawal(0).await.unwrap().is_transferred());
        drop(first);

        // A relayer started from seq 0 walks the whole history
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let relayer_task = tokio::spawn(second.run(shutdown_rx));
        wait_for(|| {
            let summary = stats.summary();
            summary.abandoned == 2 && summary.redundant == 1
        })
        .await;

        let summary = stats.summary();
        assert_eq!(summary.deposits_finalized, 0);
        assert_eq!(summary.withdrawals_finalized, 0);
        assert_eq!(summary.submit_errors, 0);
        assert_eq!(main_state.read().assets().owner_of(&kitties, 7), Some(alice));
        assert_eq!(main_state.read().assets().owner_of(&kitties, 8), Some(main_bridge));
        assert!(!main_state.read().deposit_record(1).unwrap().is_released());
        let side = side_state.read();
        let wrapped_kitties = side.factory().get(&wrapped).unwrap();
        assert_eq!(wrapped_kitties.balance_of(&bob, 7), 0);
        assert_eq!(wrapped_kitties.balance_of(&bob, 8), 1);
        drop(side);

        shutdown_tx.send(true).unwrap();
        relayer_task.await.unwrap();
        main_stop.store(false, Ordering::SeqCst);
        side_stop.store(false, Ordering::SeqCst);
        main_task.await.unwrap();
        side_task.await.unwrap();
    }
}
