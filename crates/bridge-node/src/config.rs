//! Node Configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use bridge_types::{Address, LedgerId};
use relayer::RelayerConfig;
use serde::{Deserialize, Serialize};
use signer_registry::SignerKey;

/// File holding generated signer keys inside the data directory
const GENERATED_KEYS_FILE: &str = "signer-keys.json";

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub main_ledger_id: LedgerId,
    pub side_ledger_id: LedgerId,
    /// Block time in milliseconds (both ledgers)
    pub block_time_ms: u64,
    /// Hex-encoded secp256k1 secret keys of the signer set
    pub signer_keys: Vec<String>,
    /// Number of keys to generate when `signer_keys` is empty
    pub generate_signers: usize,
    /// Signatures required per authorized call
    pub threshold: u32,
    pub relayer: RelayerConfig,
    /// Data directory for persistent state
    pub data_dir: PathBuf,
    /// Save state every N slots (0 = only on shutdown)
    pub save_interval: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            main_ledger_id: LedgerId(1),
            side_ledger_id: LedgerId(2),
            block_time_ms: ledger_runtime::BLOCK_TIME_MS,
            signer_keys: Vec::new(),
            generate_signers: 3,
            threshold: 2,
            relayer: RelayerConfig::default(),
            data_dir: PathBuf::from("./data"),
            save_interval: 300,
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.main_ledger_id == self.side_ledger_id {
            anyhow::bail!("mainchain and sidechain share ledger id {}", self.main_ledger_id);
        }
        if self.block_time_ms == 0 {
            anyhow::bail!("block_time_ms must be positive");
        }
        Ok(())
    }

    pub fn mainchain_bridge(&self) -> Address {
        Address::derive(&[b"mainchain-bridge", &self.main_ledger_id.0.to_be_bytes()])
    }

    pub fn mainchain_registry(&self) -> Address {
        Address::derive(&[b"mainchain-registry", &self.main_ledger_id.0.to_be_bytes()])
    }

    pub fn sidechain_bridge(&self) -> Address {
        Address::derive(&[b"sidechain-bridge", &self.side_ledger_id.0.to_be_bytes()])
    }

    pub fn sidechain_registry(&self) -> Address {
        Address::derive(&[b"sidechain-registry", &self.side_ledger_id.0.to_be_bytes()])
    }

    /// Signer keys from the config, or generated ones kept in the data directory
    ///
    /// Generated keys are written out on first start so a restarted node can
    /// still sign for the registries it restored.
    pub fn signer_keys(&self) -> anyhow::Result<Vec<SignerKey>> {
        if !self.signer_keys.is_empty() {
            return self
                .signer_keys
                .iter()
                .map(|hex| SignerKey::from_hex(hex).map_err(anyhow::Error::from))
                .collect();
        }

        let path = self.data_dir.join(GENERATED_KEYS_FILE);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let secrets: Vec<String> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {:?}", path))?;
            tracing::info!("Loaded {} signer keys from {:?}", secrets.len(), path);
            return secrets
                .iter()
                .map(|hex| SignerKey::from_hex(hex).map_err(anyhow::Error::from))
                .collect();
        }

        let keys: Vec<SignerKey> = (0..self.generate_signers).map(|_| SignerKey::generate()).collect();
        let secrets: Vec<String> = keys.iter().map(|k| k.secret_hex()).collect();
        std::fs::write(&path, serde_json::to_string_pretty(&secrets)?)?;
        tracing::warn!(
            "Generated {} signer keys and stored them in {:?} (devnet only)",
            keys.len(),
            path
        );
        Ok(keys)
    }
}
