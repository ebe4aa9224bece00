//! In-memory event log using DashMap for concurrent access

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bridge_types::BridgeEvent;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::Slot;

/// An event with its position in the ledger's log
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Dense sequence number, starting at 0
    pub seq: u64,
    /// Slot of the block that emitted it
    pub slot: Slot,
    pub event: BridgeEvent,
}

/// Thread-safe append-only event log
///
/// The block producer appends; watchers read concurrently to catch up
/// after missing broadcasts.
#[derive(Clone, Default)]
pub struct EventStore {
    events: Arc<DashMap<u64, RecordedEvent>>,
    next_seq: Arc<AtomicU64>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, assigning the next sequence number
    pub fn append(&self, slot: Slot, event: BridgeEvent) -> RecordedEvent {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let recorded = RecordedEvent { seq, slot, event };
        self.events.insert(seq, recorded.clone());
        recorded
    }

    /// Re-insert a previously recorded event (loading from disk)
    pub fn restore(&self, recorded: RecordedEvent) {
        self.next_seq.fetch_max(recorded.seq + 1, Ordering::SeqCst);
        self.events.insert(recorded.seq, recorded);
    }

    pub fn get(&self, seq: u64) -> Option<RecordedEvent> {
        self.events.get(&seq).map(|r| r.value().clone())
    }

    /// All events with `seq >= from`, in order
    pub fn events_since(&self, from: u64) -> Vec<RecordedEvent> {
        let mut events: Vec<RecordedEvent> = self
            .events
            .iter()
            .filter(|r| *r.key() >= from)
            .map(|r| r.value().clone())
            .collect();
        events.sort_by_key(|e| e.seq);
        events
    }

    /// Sequence number the next event will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::Address;

    fn event(nonce: u64) -> BridgeEvent {
        BridgeEvent::ThresholdUpdated {
            registry: Address::derive(&[b"registry"]),
            threshold: 2,
            nonce,
        }
    }

    #[test]
    fn test_append_assigns_sequence() {
        let store = EventStore::new();
        assert!(store.is_empty());
        let a = store.append(3, event(0));
        let b = store.append(3, event(1));
        assert_eq!((a.seq, b.seq), (0, 1));
        assert_eq!(store.next_seq(), 2);
        assert_eq!(store.get(1).unwrap().event, event(1));
    }

    #[test]
    fn test_events_since_is_ordered() {
        let store = EventStore::new();
        for i in 0..10 {
            store.append(i, event(i));
        }
        let tail = store.events_since(7);
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![7, 8, 9]);
        assert!(store.events_since(10).is_empty());
    }

    #[test]
    fn test_restore_advances_sequence() {
        let store = EventStore::new();
        store.restore(RecordedEvent { seq: 4, slot: 1, event: event(4) });
        assert_eq!(store.next_seq(), 5);
        assert_eq!(store.append(2, event(5)).seq, 5);
    }
}
