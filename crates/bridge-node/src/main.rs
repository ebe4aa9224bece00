//! Bridge Node
//!
//! Runs a two-ledger bridge devnet in one process: a mainchain ledger, a
//! sidechain ledger and the relayer carrying messages between them.
//! Ledger state is persisted to disk and survives restarts.

use std::{path::PathBuf, sync::atomic::Ordering, sync::Arc};

use anyhow::Result;
use bridge_program::{BridgeProgram, InMemoryAssets, MainchainBridge, SidechainBridge};
use clap::Parser;
use ledger_runtime::{
    BlockProducer, BlockProducerConfig, BlockUpdate, LedgerPersistence, LedgerProcessor,
    PersistentStore,
};
use relayer::Relayer;
use serde::{de::DeserializeOwned, Serialize};
use signer_registry::{SignerKey, SignerRegistry};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod demo;

use config::NodeConfig;

/// Two-ledger asset bridge devnet
#[derive(Parser, Debug)]
#[command(name = "bridge-node")]
#[command(about = "Mainchain/sidechain asset bridge with a threshold-signed relayer", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Block time in milliseconds (overrides the config file)
    #[arg(long)]
    block_time_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run a scripted deposit and withdrawal once the ledgers are up
    #[arg(long)]
    demo: bool,

    /// Save state every N slots, 0 = only on shutdown (overrides the config file)
    #[arg(long)]
    save_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(data_dir) = args.data_dir.clone() {
        config.data_dir = data_dir;
    }
    if let Some(block_time_ms) = args.block_time_ms {
        config.block_time_ms = block_time_ms;
    }
    if let Some(save_interval) = args.save_interval {
        config.save_interval = save_interval;
    }
    config.validate()?;

    run_node(config, args.verbose, args.demo).await
}

async fn run_node(config: NodeConfig, verbose: bool, run_demo: bool) -> Result<()> {
    tracing::info!("Starting bridge devnet");
    tracing::info!("  Mainchain ledger: {}", config.main_ledger_id);
    tracing::info!("  Sidechain ledger: {}", config.side_ledger_id);
    tracing::info!("  Block time: {}ms", config.block_time_ms);
    tracing::info!("  Data directory: {:?}", config.data_dir);
    tracing::info!("  Save interval: {} slots", config.save_interval);

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&config.data_dir)?;

    let keys = config.signer_keys()?;
    let main_store = Arc::new(PersistentStore::open(config.data_dir.join("mainchain"))?);
    let side_store = Arc::new(PersistentStore::open(config.data_dir.join("sidechain"))?);

    let main_ledger = match LedgerProcessor::<MainchainBridge>::load_from_disk(&main_store)? {
        Some(ledger) => ledger,
        None => LedgerProcessor::new(fresh_mainchain(&config, &keys)?),
    };
    let side_ledger = match LedgerProcessor::<SidechainBridge>::load_from_disk(&side_store)? {
        Some(ledger) => ledger,
        None => LedgerProcessor::new(fresh_sidechain(&config, &keys)?),
    };
    ensure_ledger_id("mainchain", &main_ledger, config.main_ledger_id)?;
    ensure_ledger_id("sidechain", &side_ledger, config.side_ledger_id)?;

    let block_config = BlockProducerConfig {
        block_time_ms: config.block_time_ms,
        verbose,
        ..Default::default()
    };
    let main_producer = BlockProducer::new(main_ledger.clone(), block_config.clone());
    let side_producer = BlockProducer::new(side_ledger.clone(), block_config);

    let relayer = Relayer::new(config.relayer.clone(), keys, &main_producer, &side_producer);
    let stats = relayer.stats();
    let operator = relayer.operator();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let main_saver = spawn_saver(
        "mainchain",
        main_ledger.clone(),
        main_store.clone(),
        main_producer.subscribe(),
        config.save_interval,
    );
    let side_saver = spawn_saver(
        "sidechain",
        side_ledger.clone(),
        side_store.clone(),
        side_producer.subscribe(),
        config.save_interval,
    );

    let demo_ledgers = demo::DemoLedgers {
        main: main_ledger.clone(),
        side: side_ledger.clone(),
        main_tx: main_producer.transaction_sender(),
        side_tx: side_producer.transaction_sender(),
    };

    let main_running = main_producer.running_flag();
    let side_running = side_producer.running_flag();
    let main_handle = tokio::spawn(main_producer.run_async());
    let side_handle = tokio::spawn(side_producer.run_async());
    let relayer_handle = tokio::spawn(relayer.run(shutdown_rx));

    let demo_handle = run_demo.then(|| {
        tokio::spawn(async move {
            match demo::run(demo_ledgers, operator).await {
                Ok(()) => tracing::info!("Demo round trip complete"),
                Err(e) => tracing::error!("Demo failed: {:#}", e),
            }
        })
    });

    tracing::info!("Bridge devnet running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    if let Some(handle) = demo_handle {
        handle.abort();
    }

    // Stop the relayer before the ledgers
    let _ = shutdown_tx.send(true);
    if let Err(e) = relayer_handle.await {
        tracing::error!("Relayer task failed: {}", e);
    }
    main_running.store(false, Ordering::SeqCst);
    side_running.store(false, Ordering::SeqCst);
    let _ = main_handle.await;
    let _ = side_handle.await;
    main_saver.abort();
    side_saver.abort();

    tracing::info!("Relayer totals: {:?}", stats.summary());

    // Save state before exit
    for (label, result) in [
        ("mainchain", main_ledger.save_to_disk(&main_store)),
        ("sidechain", side_ledger.save_to_disk(&side_store)),
    ] {
        match result {
            Ok(metadata) => tracing::info!(
                "Final {} state saved: slot {}, {} events",
                label,
                metadata.slot,
                metadata.event_count
            ),
            Err(e) => tracing::error!("Failed to save final {} state: {}", label, e),
        }
    }

    tracing::info!("Bridge devnet stopped");

    Ok(())
}

fn fresh_mainchain(config: &NodeConfig, keys: &[SignerKey]) -> Result<MainchainBridge> {
    let registry = SignerRegistry::new(
        config.mainchain_registry(),
        config.main_ledger_id,
        keys.iter().map(|k| k.address()),
        config.threshold,
    )?;
    tracing::info!(
        "No existing mainchain state, starting fresh with {} signers (threshold {})",
        keys.len(),
        config.threshold
    );
    Ok(MainchainBridge::new(config.mainchain_bridge(), registry, InMemoryAssets::new()))
}

fn fresh_sidechain(config: &NodeConfig, keys: &[SignerKey]) -> Result<SidechainBridge> {
    let registry = SignerRegistry::new(
        config.sidechain_registry(),
        config.side_ledger_id,
        keys.iter().map(|k| k.address()),
        config.threshold,
    )?;
    tracing::info!("No existing sidechain state, starting fresh");
    Ok(SidechainBridge::new(config.sidechain_bridge(), registry))
}

fn ensure_ledger_id<P: BridgeProgram>(
    label: &str,
    ledger: &LedgerProcessor<P>,
    expected: bridge_types::LedgerId,
) -> Result<()> {
    let actual = ledger.ledger_id();
    if actual != expected {
        anyhow::bail!(
            "{} data is for ledger {}, but the config says {}",
            label,
            actual,
            expected
        );
    }
    tracing::info!("{} ready at slot {}", label, ledger.current_slot());
    Ok(())
}

/// Save a ledger every `interval` slots
fn spawn_saver<P>(
    label: &'static str,
    ledger: LedgerProcessor<P>,
    store: Arc<PersistentStore>,
    mut updates: broadcast::Receiver<BlockUpdate>,
    interval: u64,
) -> JoinHandle<()>
where
    P: BridgeProgram + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    tokio::spawn(async move {
        if interval == 0 {
            return;
        }
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if update.slot > 0 && update.slot % interval == 0 {
                        if let Err(e) = ledger.save_to_disk(&store) {
                            tracing::error!("Failed to save {} state: {}", label, e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!("{} saver skipped {} blocks", label, missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
