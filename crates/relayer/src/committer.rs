//! Committer - submits authorized calls to one ledger
//!
//! Reads the target registry's current nonce, collects a bundle over the
//! resulting hash and submits the instruction. If the nonce moved between
//! signing and execution the ledger rejects the bundle; the committer then
//! re-reads the nonce and signs again.

use std::sync::Arc;

use borsh::BorshSerialize;
use bridge_program::{AuthorizedCall, BridgeProgram};
use bridge_types::{Address, LedgerId};
use ledger_runtime::{BlockProducer, LedgerProcessor, Transaction, TransactionResult, TransactionSender};

use crate::collector::SignatureCollector;

/// Submits signed instructions to one ledger
pub struct Committer<P> {
    ledger: LedgerProcessor<P>,
    sender: TransactionSender,
    collector: Arc<SignatureCollector>,
    /// Caller address on submitted transactions
    relayer: Address,
    max_attempts: u32,
}

impl<P> Clone for Committer<P> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            sender: self.sender.clone(),
            collector: self.collector.clone(),
            relayer: self.relayer,
            max_attempts: self.max_attempts,
        }
    }
}

impl<P> Committer<P>
where
    P: BridgeProgram,
    P::Instruction: BorshSerialize,
{
    pub fn new(
        producer: &BlockProducer<P>,
        collector: Arc<SignatureCollector>,
        relayer: Address,
        max_attempts: u32,
    ) -> Self {
        Self {
            ledger: producer.processor().clone(),
            sender: producer.transaction_sender(),
            collector,
            relayer,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger.ledger_id()
    }

    /// Read access to the ledger this committer targets
    pub fn ledger(&self) -> &LedgerProcessor<P> {
        &self.ledger
    }

    /// Sign `call` at the current nonce and submit `build(bundle)`
    ///
    /// Returns the receipt of the last attempt. A rejection is retried only
    /// if the registry nonce moved after signing.
    pub async fn commit<F>(&self, call: &AuthorizedCall, build: F) -> anyhow::Result<TransactionResult>
    where
        F: Fn(Vec<u8>) -> P::Instruction,
    {
        let mut attempt = 1;
        loop {
            let (signed_nonce, bundle) = {
                let program = self.ledger.program();
                let program = program.read();
                let registry = program.registry();
                let hash = call.hash(registry, &program.identity());
                (registry.nonce(), self.collector.collect(registry, &hash)?)
            };

            let data = borsh::to_vec(&build(bundle))?;
            let result = self
                .sender
                .submit(Transaction::new(self.relayer, data))
                .await?;

            let current_nonce = self.ledger.program().read().registry().nonce();
            if result.success || current_nonce == signed_nonce || attempt >= self.max_attempts {
                return Ok(result);
            }

            tracing::warn!(
                "Ledger {}: bundle signed at nonce {} went stale (now {}), re-signing (attempt {}/{})",
                self.ledger_id(),
                signed_nonce,
                current_nonce,
                attempt + 1,
                self.max_attempts
            );
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_program::{
        AssetLedger, ExecutionOutcome, InMemoryAssets, MainchainBridge, MainchainInstruction,
        Settlement,
    };
    use bridge_types::ErrorKind;
    use ledger_runtime::BlockProducerConfig;
    use signer_registry::{SignerKey, SignerRegistry};

    const MAIN: LedgerId = LedgerId(1);

    fn producer(keys: &[SignerKey]) -> BlockProducer<MainchainBridge> {
        let registry = SignerRegistry::new(
            Address::derive(&[b"registry"]),
            MAIN,
            keys.iter().map(|k| k.address()),
            2,
        )
        .unwrap();
        let mut assets = InMemoryAssets::new();
        let alice = Address::derive(&[b"alice"]);
        let kitties = Address::derive(&[b"kitties"]);
        for id in 0..2 {
            assets.mint(kitties, id, alice);
        }
        let mut bridge = MainchainBridge::new(Address::derive(&[b"bridge"]), registry, assets);
        for id in 0..2 {
            bridge
                .deposit(&alice, kitties, id, LedgerId(2), Address::derive(&[b"bob"]))
                .unwrap();
        }
        bridge.take_events();
        let config = BlockProducerConfig {
            block_time_ms: 5,
            ..Default::default()
        };
        BlockProducer::new(LedgerProcessor::new(bridge), config)
    }

    async fn reject(
        committer: &Committer<MainchainBridge>,
        deposit_index: u64,
    ) -> anyhow::Result<TransactionResult> {
        let call = AuthorizedCall::reject_deposit(deposit_index);
        committer
            .commit(&call, |signatures| MainchainInstruction::RejectDeposit {
                ledger_id: MAIN,
                deposit_index,
                signatures,
            })
            .await
    }

    #[tokio::test]
    async fn test_commit_resigns_after_nonce_moves() {
        let keys: Vec<SignerKey> = (0..3).map(|_| SignerKey::generate()).collect();
        let producer = producer(&keys);
        let collector = Arc::new(SignatureCollector::new(keys, false));
        let committer = Committer::new(&producer, collector, Address::derive(&[b"relayer"]), 3);
        let stop = producer.running_flag();
        let handle = tokio::spawn(producer.run_async());

        // Both bundles are signed at nonce 0; whichever lands second re-signs
        let (first, second) = tokio::join!(reject(&committer, 0), reject(&committer, 1));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(first.success, "{:?}", first.error);
        assert!(second.success, "{:?}", second.error);
        assert_eq!(first.outcome, Some(ExecutionOutcome::Settled(Settlement::Transferred)));

        let program = committer.ledger().program();
        {
            let bridge = program.read();
            assert_eq!(bridge.registry().nonce(), 2);
            let alice = Address::derive(&[b"alice"]);
            let kitties = Address::derive(&[b"kitties"]);
            assert_eq!(bridge.assets().owner_of(&kitties, 1), Some(alice));
        }

        stop.store(false, std::sync::atomic::Ordering::SeqCst);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_does_not_retry_state_conflicts() {
        let keys: Vec<SignerKey> = (0..3).map(|_| SignerKey::generate()).collect();
        let producer = producer(&keys);
        let collector = Arc::new(SignatureCollector::new(keys, true));
        let committer = Committer::new(&producer, collector, Address::derive(&[b"relayer"]), 3);
        let stop = producer.running_flag();
        let handle = tokio::spawn(producer.run_async());

        assert!(reject(&committer, 0).await.unwrap().success);
        let again = reject(&committer, 0).await.unwrap();
        assert!(!again.success);
        assert_eq!(again.error_kind, Some(ErrorKind::StateConflict));
        assert_eq!(committer.ledger().program().read().registry().nonce(), 1);

        stop.store(false, std::sync::atomic::Ordering::SeqCst);
        handle.await.unwrap();
    }
}
