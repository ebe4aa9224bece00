//! Ledger Transaction Processor
//!
//! Applies transactions one at a time to the hosted bridge program and
//! records the events each successful transaction emits.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bridge_program::{process, BridgeProgram, ExecutionOutcome};
use bridge_types::{Address, ErrorKind, LedgerId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::event_store::{EventStore, RecordedEvent};

/// Block height
pub type Slot = u64;

/// Instruction bytes submitted by a caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub caller: Address,
    pub data: Vec<u8>,
}

impl Transaction {
    pub fn new(caller: Address, data: Vec<u8>) -> Self {
        Self { caller, data }
    }
}

/// Transaction execution result
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TransactionResult {
    /// Slot the transaction was included in
    pub slot: Slot,
    pub caller: Address,
    /// Whether the instruction committed
    pub success: bool,
    pub outcome: Option<ExecutionOutcome>,
    /// Rejection reason
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Events emitted by this transaction
    pub events: Vec<RecordedEvent>,
}

/// Sequential processor for one ledger
///
/// Cloning yields another handle to the same program, log and slot; only
/// the block producer should call the processing methods.
pub struct LedgerProcessor<P> {
    program: Arc<RwLock<P>>,
    events: EventStore,
    current_slot: Arc<AtomicU64>,
}

impl<P> Clone for LedgerProcessor<P> {
    fn clone(&self) -> Self {
        Self {
            program: self.program.clone(),
            events: self.events.clone(),
            current_slot: self.current_slot.clone(),
        }
    }
}

impl<P: BridgeProgram> LedgerProcessor<P> {
    /// Create a processor for a freshly initialized program
    pub fn new(program: P) -> Self {
        Self::with_state(program, EventStore::new(), 0)
    }

    /// Resume from restored state
    pub fn with_state(program: P, events: EventStore, slot: Slot) -> Self {
        Self {
            program: Arc::new(RwLock::new(program)),
            events,
            current_slot: Arc::new(AtomicU64::new(slot)),
        }
    }

    /// Shared handle to the program state
    pub fn program(&self) -> Arc<RwLock<P>> {
        self.program.clone()
    }

    pub fn event_store(&self) -> &EventStore {
        &self.events
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.program.read().ledger_id()
    }

    pub fn current_slot(&self) -> Slot {
        self.current_slot.load(Ordering::SeqCst)
    }

    /// Advance to the next slot
    pub fn advance_slot(&self) {
        let slot = self.current_slot.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!("Advanced to slot {}", slot);
    }

    /// Execute one transaction at the current slot
    pub fn process_transaction(&self, tx: &Transaction) -> TransactionResult {
        let slot = self.current_slot();
        let mut program = self.program.write();

        match process(&mut *program, &tx.caller, &tx.data) {
            Ok(outcome) => {
                let events: Vec<RecordedEvent> = program
                    .take_events()
                    .into_iter()
                    .map(|event| self.events.append(slot, event))
                    .collect();
                TransactionResult {
                    slot,
                    caller: tx.caller,
                    success: true,
                    outcome: Some(outcome),
                    error: None,
                    error_kind: None,
                    events,
                }
            }
            Err(e) => {
                // A rejected instruction leaves no events behind
                program.take_events();
                tracing::debug!("Ledger {}: transaction from {} rejected: {}", program.ledger_id(), tx.caller, e);
                TransactionResult {
                    slot,
                    caller: tx.caller,
                    success: false,
                    outcome: None,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                    events: Vec::new(),
                }
            }
        }
    }

    /// Execute a batch in order
    pub fn process_transactions(&self, txs: &[Transaction]) -> Vec<TransactionResult> {
        txs.iter().map(|tx| self.process_transaction(tx)).collect()
    }
}
