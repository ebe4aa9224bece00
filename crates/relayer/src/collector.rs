//! Signature Collector
//!
//! Stands in for the out-of-band round where every signer signs the
//! authorization hash on its own machine and hands back one bundle entry.

use bridge_types::Address;
use signer_registry::{assemble_bundle, SignerKey, SignerRegistry};

/// Signer keys reachable by this relayer
pub struct SignatureCollector {
    keys: Vec<SignerKey>,
    /// Sign with every key instead of stopping at the threshold
    over_collect: bool,
}

impl SignatureCollector {
    pub fn new(keys: Vec<SignerKey>, over_collect: bool) -> Self {
        Self { keys, over_collect }
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.keys.iter().map(|k| k.address())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Produce a sorted bundle over `hash` for `registry`
    ///
    /// Fails without signing anything if fewer than `threshold` of the
    /// held keys are current members.
    pub fn collect(&self, registry: &SignerRegistry, hash: &[u8; 32]) -> anyhow::Result<Vec<u8>> {
        let required = registry.threshold() as usize;
        let members: Vec<&SignerKey> = self
            .keys
            .iter()
            .filter(|k| registry.is_signer(&k.address()))
            .collect();
        if members.len() < required {
            anyhow::bail!(
                "Only {} of {} required signers available for registry {}",
                members.len(),
                required,
                registry.identity()
            );
        }

        let signers: Vec<&SignerKey> = if self.over_collect {
            self.keys.iter().collect()
        } else {
            members.into_iter().take(required).collect()
        };
        let entries = signers
            .into_iter()
            .map(|k| (k.address(), k.sign(registry.ledger_id(), hash)))
            .collect();
        Ok(assemble_bundle(entries))
    }
}
