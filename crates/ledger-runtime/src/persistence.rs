//! Persistence Layer for Ledger State
//!
//! Uses sled embedded database to persist the program snapshot and the
//! event log across restarts. State is saved periodically and on shutdown.

use std::path::Path;

use bridge_program::BridgeProgram;
use bridge_types::LedgerId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::Db;

use crate::{
    event_store::{EventStore, RecordedEvent},
    processor::{LedgerProcessor, Slot},
};

const SNAPSHOT_KEY: &str = "program";
const METADATA_KEY: &str = "ledger";

/// Metadata about the ledger state
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerMetadata {
    pub ledger_id: LedgerId,
    /// Next slot to produce
    pub slot: Slot,
    /// Events in the log
    pub event_count: u64,
    /// Last save timestamp (unix seconds)
    pub last_save_ts: i64,
}

/// Persistent storage for one ledger
pub struct PersistentStore {
    /// Sled database instance
    db: Db,
    /// Events keyed by big-endian sequence number
    events: sled::Tree,
    /// Program snapshot
    snapshot: sled::Tree,
    /// Metadata tree
    metadata: sled::Tree,
}

impl PersistentStore {
    /// Open or create a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let events = db.open_tree("events")?;
        let snapshot = db.open_tree("snapshot")?;
        let metadata = db.open_tree("metadata")?;

        tracing::info!("Opened persistent store at {:?}", path.as_ref());

        Ok(Self {
            db,
            events,
            snapshot,
            metadata,
        })
    }

    /// Store an event
    pub fn store_event(&self, recorded: &RecordedEvent) -> anyhow::Result<()> {
        let bytes = bincode::serialize(recorded)?;
        self.events.insert(recorded.seq.to_be_bytes(), bytes)?;
        Ok(())
    }

    /// Get all events in sequence order
    pub fn get_all_events(&self) -> anyhow::Result<Vec<RecordedEvent>> {
        let mut events = Vec::with_capacity(self.events.len());
        for result in self.events.iter() {
            let (_, value) = result?;
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }

    /// Save the program snapshot
    pub fn save_snapshot<T: Serialize>(&self, program: &T) -> anyhow::Result<()> {
        let bytes = bincode::serialize(program)?;
        self.snapshot.insert(SNAPSHOT_KEY, bytes)?;
        Ok(())
    }

    /// Load the program snapshot
    pub fn load_snapshot<T: DeserializeOwned>(&self) -> anyhow::Result<Option<T>> {
        match self.snapshot.get(SNAPSHOT_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Save ledger metadata
    pub fn save_metadata(&self, metadata: &LedgerMetadata) -> anyhow::Result<()> {
        let bytes = bincode::serialize(metadata)?;
        self.metadata.insert(METADATA_KEY, bytes)?;
        Ok(())
    }

    /// Load ledger metadata
    pub fn load_metadata(&self) -> anyhow::Result<Option<LedgerMetadata>> {
        match self.metadata.get(METADATA_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the number of stored events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) -> anyhow::Result<()> {
        self.events.clear()?;
        self.snapshot.clear()?;
        self.metadata.clear()?;
        Ok(())
    }
}

/// Extension trait to add persistence to EventStore
pub trait EventStorePersistence {
    /// Save events not yet on disk
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize>;

    /// Load all events from persistent storage
    fn load_from_disk(&self, store: &PersistentStore) -> anyhow::Result<usize>;
}

impl EventStorePersistence for EventStore {
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize> {
        // The log is append-only, so everything past the stored count is new
        let from = store.event_count() as u64;
        let mut count = 0;
        for recorded in self.events_since(from) {
            store.store_event(&recorded)?;
            count += 1;
        }
        Ok(count)
    }

    fn load_from_disk(&self, store: &PersistentStore) -> anyhow::Result<usize> {
        let events = store.get_all_events()?;
        let count = events.len();
        for recorded in events {
            self.restore(recorded);
        }
        tracing::info!("Loaded {} events from disk", count);
        Ok(count)
    }
}

/// Save and restore a whole ledger: program snapshot, event log, slot
pub trait LedgerPersistence: Sized {
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<LedgerMetadata>;

    /// `None` if the store holds no ledger yet
    fn load_from_disk(store: &PersistentStore) -> anyhow::Result<Option<Self>>;
}

impl<P> LedgerPersistence for LedgerProcessor<P>
where
    P: BridgeProgram + Serialize + DeserializeOwned,
{
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<LedgerMetadata> {
        let program = self.program();
        // Hold the read lock so the snapshot, log and slot agree
        let program = program.read();
        store.save_snapshot(&*program)?;
        let new_events = EventStorePersistence::save_to_disk(self.event_store(), store)?;

        let metadata = LedgerMetadata {
            ledger_id: program.ledger_id(),
            slot: self.current_slot(),
            event_count: self.event_store().next_seq(),
            last_save_ts: chrono::Utc::now().timestamp(),
        };
        store.save_metadata(&metadata)?;
        store.flush()?;

        tracing::info!(
            "Saved ledger {} at slot {} ({} new events)",
            metadata.ledger_id,
            metadata.slot,
            new_events
        );
        Ok(metadata)
    }

    fn load_from_disk(store: &PersistentStore) -> anyhow::Result<Option<Self>> {
        let Some(metadata) = store.load_metadata()? else {
            return Ok(None);
        };
        let program: P = store
            .load_snapshot()?
            .ok_or_else(|| anyhow::anyhow!("Ledger {} has metadata but no snapshot", metadata.ledger_id))?;

        let events = EventStore::new();
        EventStorePersistence::load_from_disk(&events, store)?;

        tracing::info!(
            "Restored ledger {} at slot {}",
            metadata.ledger_id,
            metadata.slot
        );
        Ok(Some(LedgerProcessor::with_state(program, events, metadata.slot)))
    }
}
