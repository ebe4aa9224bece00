//! Event Watcher - follows one ledger's event log
//!
//! Block broadcasts are the fast path. The event store is the source of
//! truth: whenever the watcher falls behind (startup, lagged receiver,
//! gap in sequence numbers) it reads the missing range from the store.

use ledger_runtime::{BlockUpdate, EventStore, RecordedEvent};
use tokio::sync::broadcast::{self, error::RecvError};

pub struct EventWatcher {
    label: &'static str,
    updates: broadcast::Receiver<BlockUpdate>,
    store: EventStore,
    /// Next sequence number to deliver
    cursor: u64,
}

impl EventWatcher {
    /// Watch from `start_seq`; events already in the store are delivered first
    pub fn new(
        label: &'static str,
        updates: broadcast::Receiver<BlockUpdate>,
        store: EventStore,
        start_seq: u64,
    ) -> Self {
        Self {
            label,
            updates,
            store,
            cursor: start_seq,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Wait for events not yet delivered
    ///
    /// Returns `None` once the ledger's block producer is gone. Cancel safe.
    pub async fn next_events(&mut self) -> Option<Vec<RecordedEvent>> {
        if self.store.next_seq() > self.cursor {
            return Some(self.catch_up());
        }

        loop {
            match self.updates.recv().await {
                Ok(update) => {
                    let fresh: Vec<RecordedEvent> = update
                        .events
                        .into_iter()
                        .filter(|e| e.seq >= self.cursor)
                        .collect();
                    match fresh.first() {
                        None => continue,
                        Some(first) if first.seq == self.cursor => {
                            self.advance(&fresh);
                            return Some(fresh);
                        }
                        Some(first) => {
                            tracing::debug!(
                                "{} watcher: gap before seq {} (expected {})",
                                self.label,
                                first.seq,
                                self.cursor
                            );
                            return Some(self.catch_up());
                        }
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        "{} watcher lagged by {} blocks, resyncing from seq {}",
                        self.label,
                        missed,
                        self.cursor
                    );
                    return Some(self.catch_up());
                }
                Err(RecvError::Closed) => {
                    tracing::info!("{} watcher: ledger closed at seq {}", self.label, self.cursor);
                    return None;
                }
            }
        }
    }

    fn catch_up(&mut self) -> Vec<RecordedEvent> {
        let events = self.store.events_since(self.cursor);
        self.advance(&events);
        events
    }

    fn advance(&mut self, delivered: &[RecordedEvent]) {
        if let Some(last) = delivered.last() {
            self.cursor = last.seq + 1;
        }
    }
}
