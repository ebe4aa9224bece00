//! Relayer - carries messages between the two bridge ledgers
//!
//! Handles everything that happens off-ledger:
//! - Watching both ledgers' event logs
//! - Collecting signer signatures over authorization hashes
//! - Submitting finalize calls to the counterpart ledger
//! - Operator actions (wrapped asset registration, rejects)
//!
//! The relayer holds no authority of its own. A bundle it submits is only
//! as good as the signer keys that produced it.

pub mod collector;
pub mod committer;
pub mod operator;
pub mod relayer;
pub mod watcher;

pub use collector::SignatureCollector;
pub use committer::Committer;
pub use operator::Operator;
pub use relayer::{Relayer, RelayerConfig, RelayerStats, StatsSummary};
pub use watcher::EventWatcher;
