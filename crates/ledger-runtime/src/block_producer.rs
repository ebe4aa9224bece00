//! Block Producer - fixed-interval ledger loop
//!
//! Drains the submission queue once per block, applies the transactions in
//! arrival order and broadcasts the block to subscribers. Submitters that
//! asked for a receipt get their `TransactionResult` back directly.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bridge_program::BridgeProgram;
use bridge_types::LedgerId;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tokio::sync::{broadcast, oneshot};

use crate::{
    event_store::RecordedEvent,
    processor::{LedgerProcessor, Slot, Transaction, TransactionResult},
    BLOCK_TIME_MS, MAX_TXS_PER_BLOCK, TX_QUEUE_CAPACITY,
};

/// Block update event sent to subscribers
#[derive(Clone, Debug)]
pub struct BlockUpdate {
    pub ledger_id: LedgerId,
    /// Slot (block height)
    pub slot: Slot,
    /// Number of transactions processed
    pub transaction_count: usize,
    /// Transaction results
    pub transaction_results: Vec<TransactionResult>,
    /// Events emitted in this block, in log order
    pub events: Vec<RecordedEvent>,
    /// Block production time in microseconds
    pub processing_time_us: u64,
    /// Wall-clock time the block was sealed (unix millis)
    pub timestamp_ms: i64,
}

/// Block producer configuration
#[derive(Clone, Debug)]
pub struct BlockProducerConfig {
    /// Block time in milliseconds
    pub block_time_ms: u64,
    /// Maximum transactions per block
    pub max_txs_per_block: usize,
    /// Pending transaction queue capacity
    pub queue_capacity: usize,
    /// Log every block, not only non-empty ones
    pub verbose: bool,
}

impl Default for BlockProducerConfig {
    fn default() -> Self {
        Self {
            block_time_ms: BLOCK_TIME_MS,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            queue_capacity: TX_QUEUE_CAPACITY,
            verbose: false,
        }
    }
}

type Submission = (Transaction, Option<oneshot::Sender<TransactionResult>>);

/// Handle for submitting transactions to the block producer
#[derive(Clone)]
pub struct TransactionSender {
    sender: Sender<Submission>,
}

impl TransactionSender {
    /// Queue a transaction without waiting for its result
    pub fn send(&self, tx: Transaction) -> anyhow::Result<()> {
        self.sender
            .try_send((tx, None))
            .map_err(|e| anyhow::anyhow!("Failed to submit transaction: {}", e))
    }

    /// Queue a transaction and wait until its block is produced
    pub async fn submit(&self, tx: Transaction) -> anyhow::Result<TransactionResult> {
        let (reply, receipt) = oneshot::channel();
        self.sender
            .try_send((tx, Some(reply)))
            .map_err(|e| anyhow::anyhow!("Failed to submit transaction: {}", e))?;
        receipt
            .await
            .map_err(|_| anyhow::anyhow!("Block producer dropped the transaction"))
    }
}

/// Block Producer
pub struct BlockProducer<P> {
    /// Transaction processor
    processor: LedgerProcessor<P>,
    /// Transaction receiver
    tx_receiver: Receiver<Submission>,
    /// Transaction sender (for cloning)
    tx_sender: Sender<Submission>,
    /// Block update broadcaster
    update_sender: broadcast::Sender<BlockUpdate>,
    /// Configuration
    config: BlockProducerConfig,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl<P: BridgeProgram> BlockProducer<P> {
    /// Create a new block producer
    pub fn new(processor: LedgerProcessor<P>, config: BlockProducerConfig) -> Self {
        let (tx_sender, tx_receiver) = bounded(config.queue_capacity);
        let (update_sender, _) = broadcast::channel(64);

        Self {
            processor,
            tx_receiver,
            tx_sender,
            update_sender,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a sender for submitting transactions
    pub fn transaction_sender(&self) -> TransactionSender {
        TransactionSender {
            sender: self.tx_sender.clone(),
        }
    }

    /// Subscribe to block updates
    pub fn subscribe(&self) -> broadcast::Receiver<BlockUpdate> {
        self.update_sender.subscribe()
    }

    /// Processor handle (program state, event log, slot)
    pub fn processor(&self) -> &LedgerProcessor<P> {
        &self.processor
    }

    /// Shared flag; storing `false` stops `run_async` after the current block
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Check if the block producer is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the block producer
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get current slot
    pub fn current_slot(&self) -> Slot {
        self.processor.current_slot()
    }

    /// Produce one block from whatever is queued
    ///
    /// Returns `None` if the submission queue is disconnected.
    pub fn produce_block(&mut self) -> Option<BlockUpdate> {
        let tick_start = Instant::now();
        let mut pending: Vec<Submission> = Vec::with_capacity(self.config.max_txs_per_block);

        // Drain transaction queue
        loop {
            match self.tx_receiver.try_recv() {
                Ok(submission) => {
                    pending.push(submission);
                    if pending.len() >= self.config.max_txs_per_block {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("Transaction channel disconnected");
                    return None;
                }
            }
        }

        let slot = self.processor.current_slot();
        let mut transaction_results = Vec::with_capacity(pending.len());
        let mut events = Vec::new();

        for (tx, reply) in pending {
            let result = self.processor.process_transaction(&tx);
            events.extend(result.events.iter().cloned());
            if let Some(reply) = reply {
                // Submitter may have stopped waiting
                let _ = reply.send(result.clone());
            }
            transaction_results.push(result);
        }

        self.processor.advance_slot();
        let processing_time = tick_start.elapsed();

        let update = BlockUpdate {
            ledger_id: self.processor.ledger_id(),
            slot,
            transaction_count: transaction_results.len(),
            transaction_results,
            events,
            processing_time_us: processing_time.as_micros() as u64,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };

        if update.transaction_count > 0 || self.config.verbose {
            tracing::debug!(
                "Ledger {} slot {} | {} txs | {} events | {:.2}ms",
                update.ledger_id,
                slot,
                update.transaction_count,
                update.events.len(),
                processing_time.as_secs_f64() * 1000.0
            );
        }

        // Broadcast to subscribers (ignore errors if no subscribers)
        let _ = self.update_sender.send(update.clone());
        Some(update)
    }

    /// Run the block producer asynchronously (tokio)
    pub async fn run_async(mut self) {
        self.running.store(true, Ordering::SeqCst);

        let block_duration = Duration::from_millis(self.config.block_time_ms);
        let mut interval = tokio::time::interval(block_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Block producer for ledger {} started ({}ms blocks)",
            self.processor.ledger_id(),
            self.config.block_time_ms
        );

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            let Some(update) = self.produce_block() else {
                break;
            };

            // Warn if we're falling behind
            if update.processing_time_us > block_duration.as_micros() as u64 {
                tracing::warn!(
                    "Block {} took {:.2}ms (target: {}ms)",
                    update.slot,
                    update.processing_time_us as f64 / 1000.0,
                    self.config.block_time_ms
                );
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!(
            "Block producer for ledger {} stopped at slot {}",
            self.processor.ledger_id(),
            self.processor.current_slot()
        );
    }
}
