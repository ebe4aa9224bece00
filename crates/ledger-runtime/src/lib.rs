//! Ledger Runtime - hosts one bridge program as a ledger
//!
//! This crate provides the runtime both bridge sides run on:
//! - Sequential instruction processing against a single program instance
//! - Append-only event log with sequence numbers
//! - Fixed-interval block production with per-block broadcast
//! - sled persistence of program snapshots and events

pub mod block_producer;
pub mod event_store;
pub mod persistence;
pub mod processor;

#[cfg(test)]
mod tests;

pub use block_producer::{BlockProducer, BlockProducerConfig, BlockUpdate, TransactionSender};
pub use event_store::{EventStore, RecordedEvent};
pub use persistence::{EventStorePersistence, LedgerMetadata, LedgerPersistence, PersistentStore};
pub use processor::{LedgerProcessor, Slot, Transaction, TransactionResult};

/// Block time in milliseconds
pub const BLOCK_TIME_MS: u64 = 400;

/// Maximum transactions per block
pub const MAX_TXS_PER_BLOCK: usize = 64;

/// Capacity of the pending transaction queue
pub const TX_QUEUE_CAPACITY: usize = 1024;
