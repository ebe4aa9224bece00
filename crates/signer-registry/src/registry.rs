//! Signer Registry State
//!
//! Holds the signer set, threshold and nonce for one ledger. Bridges gate
//! every authorized transition through `authorize` + `consume`; the
//! registry's own admin operations use the same pair internally.

use std::collections::BTreeSet;

use bridge_types::{AbiEncoder, Address, BridgeEvent, LedgerId};
use serde::{Deserialize, Serialize};

use crate::{bundle::recover_bundle, constants, RegistryError};

/// Proof that a bundle met the threshold at a given nonce
///
/// Returned by [`SignerRegistry::authorize`] and spent by
/// [`SignerRegistry::consume`]. Holding one changes nothing; only
/// consuming it advances the nonce.
#[must_use = "an authorization does nothing until consumed"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    registry: Address,
    nonce: u64,
    members: usize,
}

impl Authorization {
    /// Registry the bundle was checked against
    pub fn registry(&self) -> Address {
        self.registry
    }

    /// Nonce the authorization hash committed to
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Number of member signatures found in the bundle
    pub fn members(&self) -> usize {
        self.members
    }
}

/// Threshold signer set for one ledger
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SignerRegistry {
    identity: Address,
    ledger_id: LedgerId,
    signers: BTreeSet<Address>,
    threshold: u32,
    nonce: u64,
    #[serde(skip)]
    events: Vec<BridgeEvent>,
}

impl PartialEq for SignerRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.ledger_id == other.ledger_id
            && self.signers == other.signers
            && self.threshold == other.threshold
            && self.nonce == other.nonce
    }
}

impl Eq for SignerRegistry {}

impl SignerRegistry {
    /// Create a registry with an initial signer set
    ///
    /// Rejects the zero address, duplicate signers, a zero threshold and a
    /// threshold larger than the set.
    pub fn new(
        identity: Address,
        ledger_id: LedgerId,
        signers: impl IntoIterator<Item = Address>,
        threshold: u32,
    ) -> Result<Self, RegistryError> {
        let mut set = BTreeSet::new();
        for signer in signers {
            if signer.is_zero() {
                return Err(RegistryError::InvalidSigner(signer));
            }
            if !set.insert(signer) {
                return Err(RegistryError::SignerAlreadyExists(signer));
            }
        }

        if threshold == 0 {
            return Err(RegistryError::InvalidThreshold { threshold });
        }
        if set.len() < threshold as usize {
            return Err(RegistryError::SignerShortage {
                signers: set.len(),
                threshold,
            });
        }

        tracing::info!(
            "Signer registry {} on ledger {}: {} signers, threshold {}",
            identity,
            ledger_id,
            set.len(),
            threshold
        );

        Ok(Self {
            identity,
            ledger_id,
            signers: set,
            threshold,
            nonce: 0,
            events: Vec::new(),
        })
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn signers(&self) -> &BTreeSet<Address> {
        &self.signers
    }

    pub fn is_signer(&self, account: &Address) -> bool {
        self.signers.contains(account)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Digest of identity, ledger, threshold, nonce and signer set
    ///
    /// Two registries with the same identity but different membership
    /// commit differently, so handing control to a registry can bind its
    /// full configuration rather than just its address.
    pub fn commitment(&self) -> [u8; 32] {
        let mut encoder = AbiEncoder::new()
            .address(&self.identity)
            .ledger(self.ledger_id)
            .uint(u128::from(self.threshold))
            .uint(u128::from(self.nonce));
        for signer in &self.signers {
            encoder = encoder.address(signer);
        }
        bridge_types::keccak256(&encoder.finish())
    }

    /// Hash signers sign for an operation at the current nonce
    pub fn authorization_hash(&self, target: &Address, selector: [u8; 4], args: &[u8]) -> [u8; 32] {
        authorization_hash(self.nonce, target, selector, args)
    }

    /// Count member signatures in a bundle, failing below threshold
    pub fn check(&self, hash: &[u8; 32], bundle: &[u8]) -> Result<usize, RegistryError> {
        let recovered = recover_bundle(self.ledger_id, hash, bundle)?;
        let members = recovered
            .iter()
            .filter(|signer| self.signers.contains(signer))
            .count();

        let required = self.threshold as usize;
        if members < required {
            return Err(RegistryError::InsufficientSignatures {
                provided: members,
                required,
            });
        }
        Ok(members)
    }

    /// True iff the bundle carries at least `threshold` sorted member signatures over `hash`
    pub fn verify(&self, hash: &[u8; 32], bundle: &[u8]) -> bool {
        self.check(hash, bundle).is_ok()
    }

    /// Check a bundle for an operation at the current nonce without mutating anything
    pub fn authorize(
        &self,
        target: &Address,
        selector: [u8; 4],
        args: &[u8],
        bundle: &[u8],
    ) -> Result<Authorization, RegistryError> {
        let hash = self.authorization_hash(target, selector, args);
        let members = self.check(&hash, bundle)?;
        Ok(Authorization {
            registry: self.identity,
            nonce: self.nonce,
            members,
        })
    }

    /// Spend an authorization, advancing the nonce
    ///
    /// Fails if the token was issued by another registry or the nonce has
    /// moved since it was issued. Returns the nonce that was consumed.
    pub fn consume(&mut self, authorization: Authorization) -> Result<u64, RegistryError> {
        if authorization.registry != self.identity || authorization.nonce != self.nonce {
            return Err(RegistryError::StaleAuthorization {
                expected: self.nonce,
                actual: authorization.nonce,
            });
        }
        self.nonce += 1;
        Ok(authorization.nonce)
    }

    /// Add a signer (authorized)
    pub fn add_signer(&mut self, signer: Address, bundle: &[u8]) -> Result<(), RegistryError> {
        if signer.is_zero() {
            return Err(RegistryError::InvalidSigner(signer));
        }
        if self.signers.contains(&signer) {
            return Err(RegistryError::SignerAlreadyExists(signer));
        }

        let args = AbiEncoder::new().address(&signer).finish();
        let auth = self.authorize(&self.identity, constants::ADD_SIGNER, &args, bundle)?;
        let nonce = self.consume(auth)?;

        self.signers.insert(signer);
        tracing::info!("Registry {}: added signer {} (nonce {})", self.identity, signer, nonce);
        self.events.push(BridgeEvent::SignerAdded {
            registry: self.identity,
            signer,
            nonce,
        });
        Ok(())
    }

    /// Remove a signer (authorized); fails if the set would fall below threshold
    pub fn remove_signer(&mut self, signer: Address, bundle: &[u8]) -> Result<(), RegistryError> {
        if !self.signers.contains(&signer) {
            return Err(RegistryError::SignerNotFound(signer));
        }
        let remaining = self.signers.len() - 1;
        if remaining < self.threshold as usize {
            return Err(RegistryError::SignerShortage {
                signers: remaining,
                threshold: self.threshold,
            });
        }

        let args = AbiEncoder::new().address(&signer).finish();
        let auth = self.authorize(&self.identity, constants::REMOVE_SIGNER, &args, bundle)?;
        let nonce = self.consume(auth)?;

        self.signers.remove(&signer);
        tracing::info!("Registry {}: removed signer {} (nonce {})", self.identity, signer, nonce);
        self.events.push(BridgeEvent::SignerRemoved {
            registry: self.identity,
            signer,
            nonce,
        });
        Ok(())
    }

    /// Change the threshold (authorized)
    ///
    /// Setting the current value returns `Ok(false)` without looking at the
    /// bundle and without consuming a nonce.
    pub fn update_threshold(&mut self, threshold: u32, bundle: &[u8]) -> Result<bool, RegistryError> {
        if threshold == self.threshold {
            return Ok(false);
        }
        if threshold == 0 {
            return Err(RegistryError::InvalidThreshold { threshold });
        }
        if self.signers.len() < threshold as usize {
            return Err(RegistryError::SignerShortage {
                signers: self.signers.len(),
                threshold,
            });
        }

        let args = AbiEncoder::new().uint(u128::from(threshold)).finish();
        let auth = self.authorize(&self.identity, constants::UPDATE_THRESHOLD, &args, bundle)?;
        let nonce = self.consume(auth)?;

        self.threshold = threshold;
        tracing::info!("Registry {}: threshold set to {} (nonce {})", self.identity, threshold, nonce);
        self.events.push(BridgeEvent::ThresholdUpdated {
            registry: self.identity,
            threshold,
            nonce,
        });
        Ok(true)
    }

    /// Events emitted since the last call
    pub fn take_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Authorization hash for an operation at an explicit nonce
///
/// Off-ledger signers use this when they read the nonce separately from
/// the registry.
pub fn authorization_hash(nonce: u64, target: &Address, selector: [u8; 4], args: &[u8]) -> [u8; 32] {
    bridge_types::keccak256(
        &AbiEncoder::new()
            .uint(u128::from(nonce))
            .address(target)
            .selector(selector)
            .raw(args)
            .finish(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assemble_bundle, SignerKey};
    use bridge_types::ErrorKind;

    const LEDGER: LedgerId = LedgerId(1);

    fn keys(n: u8) -> Vec<SignerKey> {
        let mut keys: Vec<SignerKey> = (1..=n)
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[31] = i;
                bytes[0] = 0x10;
                SignerKey::from_bytes(&bytes).unwrap()
            })
            .collect();
        keys.sort_by_key(|k| k.address());
        keys
    }

    fn registry(keys: &[SignerKey], threshold: u32) -> SignerRegistry {
        SignerRegistry::new(
            Address::derive(&[b"registry"]),
            LEDGER,
            keys.iter().map(|k| k.address()),
            threshold,
        )
        .unwrap()
    }

    fn sign_all(keys: &[&SignerKey], ledger: LedgerId, hash: &[u8; 32]) -> Vec<u8> {
        assemble_bundle(keys.iter().map(|k| (k.address(), k.sign(ledger, hash))).collect())
    }

    fn admin_bundle(reg: &SignerRegistry, selector: [u8; 4], args: &[u8], keys: &[&SignerKey]) -> Vec<u8> {
        let hash = reg.authorization_hash(&reg.identity(), selector, args);
        sign_all(keys, reg.ledger_id(), &hash)
    }

    fn address_args(addr: &Address) -> Vec<u8> {
        AbiEncoder::new().address(addr).finish()
    }

    // ============================================================
    // Construction
    // ============================================================

    #[test]
    fn test_new_validates_inputs() {
        let k = keys(2);
        let id = Address::derive(&[b"r"]);
        let (a, b) = (k[0].address(), k[1].address());

        assert_eq!(
            SignerRegistry::new(id, LEDGER, [a, b], 0).unwrap_err(),
            RegistryError::InvalidThreshold { threshold: 0 }
        );
        assert_eq!(
            SignerRegistry::new(id, LEDGER, [a, b], 3).unwrap_err(),
            RegistryError::SignerShortage { signers: 2, threshold: 3 }
        );
        assert_eq!(
            SignerRegistry::new(id, LEDGER, [a, a], 1).unwrap_err(),
            RegistryError::SignerAlreadyExists(a)
        );
        assert_eq!(
            SignerRegistry::new(id, LEDGER, [Address::ZERO], 1).unwrap_err(),
            RegistryError::InvalidSigner(Address::ZERO)
        );

        let reg = SignerRegistry::new(id, LEDGER, [b, a], 2).unwrap();
        assert_eq!(reg.nonce(), 0);
        assert_eq!(reg.signers().len(), 2);
    }

    // ============================================================
    // Verification
    // ============================================================

    #[test]
    fn test_two_of_three_scenario() {
        let k = keys(3);
        let (x, y, z) = (&k[0], &k[1], &k[2]);
        let mut reg = registry(&k, 2);
        let hash = [0x11; 32];

        // Y alone is not enough
        assert!(!reg.verify(&hash, &y.sign(LEDGER, &hash)));
        // X and Y in increasing order are
        assert!(reg.verify(&hash, &sign_all(&[x, y], LEDGER, &hash)));

        // Remove Y: {X, Z} still meets threshold 2
        let args = address_args(&y.address());
        let bundle = admin_bundle(&reg, constants::REMOVE_SIGNER, &args, &[x, y]);
        reg.remove_signer(y.address(), &bundle).unwrap();
        assert_eq!(reg.signers().len(), 2);
        assert_eq!(reg.nonce(), 1);

        // Removing Z would leave {X} under threshold 2
        let args = address_args(&z.address());
        let bundle = admin_bundle(&reg, constants::REMOVE_SIGNER, &args, &[x, z]);
        let err = reg.remove_signer(z.address(), &bundle).unwrap_err();
        assert_eq!(err, RegistryError::SignerShortage { signers: 1, threshold: 2 });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(reg.nonce(), 1);
        assert!(reg.is_signer(&z.address()));
    }

    #[test]
    fn test_insufficient_signatures_reports_counts() {
        let k = keys(3);
        let reg = registry(&k, 3);
        let hash = [0x22; 32];
        let bundle = sign_all(&[&k[0], &k[2]], LEDGER, &hash);
        let err = reg.check(&hash, &bundle).unwrap_err();
        assert_eq!(err, RegistryError::InsufficientSignatures { provided: 2, required: 3 });
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_mixed_member_and_non_member_bundle() {
        let k = keys(5);
        // Members are every other key; outsiders interleave in address order
        let members = vec![k[0].clone(), k[2].clone(), k[4].clone()];
        let reg = registry(&members, 2);
        let hash = [0x33; 32];

        let all: Vec<&SignerKey> = k.iter().collect();
        let bundle = sign_all(&all, LEDGER, &hash);
        assert_eq!(reg.check(&hash, &bundle), Ok(3));

        // One member plus outsiders is still short
        let bundle = sign_all(&[&k[0], &k[1], &k[3]], LEDGER, &hash);
        assert_eq!(
            reg.check(&hash, &bundle),
            Err(RegistryError::InsufficientSignatures { provided: 1, required: 2 })
        );

        // Outsiders must respect ordering too
        let mut unsorted = k[3].sign(LEDGER, &hash).to_vec();
        unsorted.extend_from_slice(&sign_all(&[&k[0], &k[2]], LEDGER, &hash));
        assert_eq!(
            reg.check(&hash, &unsorted),
            Err(RegistryError::UnsortedSigners { index: 1 })
        );
    }

    #[test]
    fn test_duplicate_signer_rejected_regardless_of_count() {
        let k = keys(3);
        let reg = registry(&k, 1);
        let hash = [0x44; 32];
        let mut bundle = sign_all(&[&k[0], &k[1]], LEDGER, &hash);
        bundle.extend_from_slice(&k[1].sign(LEDGER, &hash));
        assert!(!reg.verify(&hash, &bundle));
        assert_eq!(reg.check(&hash, &bundle), Err(RegistryError::UnsortedSigners { index: 2 }));
    }

    #[test]
    fn test_malformed_bundles() {
        let k = keys(2);
        let reg = registry(&k, 1);
        let hash = [0x55; 32];
        assert_eq!(reg.check(&hash, &[]), Err(RegistryError::EmptyBundle));

        let mut bundle = k[0].sign(LEDGER, &hash).to_vec();
        bundle.push(0);
        assert_eq!(
            reg.check(&hash, &bundle),
            Err(RegistryError::MalformedBundle { len: 66 })
        );
    }

    #[test]
    fn test_cross_ledger_replay_rejected() {
        let k = keys(2);
        let main = registry(&k, 2);
        let side = SignerRegistry::new(
            main.identity(),
            LedgerId(2),
            k.iter().map(|k| k.address()),
            2,
        )
        .unwrap();

        let hash = [0x66; 32];
        let bundle = sign_all(&[&k[0], &k[1]], LEDGER, &hash);
        assert!(main.verify(&hash, &bundle));
        assert!(!side.verify(&hash, &bundle));
    }

    // ============================================================
    // Nonce discipline
    // ============================================================

    #[test]
    fn test_failed_authorization_leaves_state_untouched() {
        let k = keys(3);
        let mut reg = registry(&k, 2);
        let before = reg.clone();
        let newcomer = SignerKey::generate().address();

        let args = address_args(&newcomer);
        let bundle = admin_bundle(&reg, constants::ADD_SIGNER, &args, &[&k[0]]);
        assert!(reg.add_signer(newcomer, &bundle).is_err());
        assert_eq!(reg, before);
        assert!(reg.take_events().is_empty());
    }

    #[test]
    fn test_stale_bundle_rejected_after_nonce_moves() {
        let k = keys(3);
        let mut reg = registry(&k, 2);
        let newcomer = SignerKey::generate().address();

        let args = address_args(&newcomer);
        let bundle = admin_bundle(&reg, constants::ADD_SIGNER, &args, &[&k[0], &k[1]]);
        reg.add_signer(newcomer, &bundle).unwrap();
        assert_eq!(reg.nonce(), 1);

        // Replay the same bundle for a different op at the next nonce
        let other = SignerKey::generate().address();
        assert!(matches!(
            reg.add_signer(other, &bundle),
            Err(RegistryError::InsufficientSignatures { .. })
        ));

        // A corrected bundle at the current nonce succeeds
        let args = address_args(&other);
        let bundle = admin_bundle(&reg, constants::ADD_SIGNER, &args, &[&k[1], &k[2]]);
        reg.add_signer(other, &bundle).unwrap();
        assert_eq!(reg.nonce(), 2);

        let events = reg.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BridgeEvent::SignerAdded { nonce: 0, .. }));
        assert!(matches!(events[1], BridgeEvent::SignerAdded { nonce: 1, .. }));
    }

    #[test]
    fn test_consume_rejects_stale_token() {
        let k = keys(2);
        let mut reg = registry(&k, 1);
        let target = Address::derive(&[b"bridge"]);
        let sel = bridge_types::selector("noop()");
        let hash = reg.authorization_hash(&target, sel, &[]);
        let bundle = sign_all(&[&k[0]], LEDGER, &hash);

        let first = reg.authorize(&target, sel, &[], &bundle).unwrap();
        let second = reg.authorize(&target, sel, &[], &bundle).unwrap();
        assert_eq!(first.nonce(), 0);
        assert_eq!(reg.consume(first), Ok(0));
        assert_eq!(
            reg.consume(second),
            Err(RegistryError::StaleAuthorization { expected: 1, actual: 0 })
        );
        assert_eq!(reg.nonce(), 1);
    }

    // ============================================================
    // Admin operations
    // ============================================================

    #[test]
    fn test_add_signer_guards() {
        let k = keys(2);
        let mut reg = registry(&k, 1);
        assert_eq!(
            reg.add_signer(Address::ZERO, &[]),
            Err(RegistryError::InvalidSigner(Address::ZERO))
        );
        let err = reg.add_signer(k[0].address(), &[]).unwrap_err();
        assert_eq!(err, RegistryError::SignerAlreadyExists(k[0].address()));
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(
            reg.remove_signer(Address::derive(&[b"nobody"]), &[]),
            Err(RegistryError::SignerNotFound(Address::derive(&[b"nobody"])))
        );
        assert_eq!(reg.nonce(), 0);
    }

    #[test]
    fn test_update_threshold() {
        let k = keys(3);
        let mut reg = registry(&k, 2);

        // Same value: no verification at all
        assert_eq!(reg.update_threshold(2, &[]), Ok(false));
        assert_eq!(reg.nonce(), 0);

        assert_eq!(
            reg.update_threshold(0, &[]),
            Err(RegistryError::InvalidThreshold { threshold: 0 })
        );
        assert_eq!(
            reg.update_threshold(4, &[]),
            Err(RegistryError::SignerShortage { signers: 3, threshold: 4 })
        );

        let args = AbiEncoder::new().uint(3).finish();
        let bundle = admin_bundle(&reg, constants::UPDATE_THRESHOLD, &args, &[&k[0], &k[2]]);
        assert_eq!(reg.update_threshold(3, &bundle), Ok(true));
        assert_eq!(reg.threshold(), 3);
        assert_eq!(reg.nonce(), 1);
        assert!(matches!(
            reg.take_events().as_slice(),
            [BridgeEvent::ThresholdUpdated { threshold: 3, nonce: 0, .. }]
        ));
    }

    #[test]
    fn test_selector_binding() {
        let k = keys(2);
        let mut reg = registry(&k, 1);
        let target = k[1].address();

        // Signed as an add, submitted as a remove
        let args = address_args(&target);
        let bundle = admin_bundle(&reg, constants::ADD_SIGNER, &args, &[&k[0]]);
        assert!(matches!(
            reg.remove_signer(target, &bundle),
            Err(RegistryError::InsufficientSignatures { .. })
        ));
        assert_eq!(reg.nonce(), 0);
    }

    #[test]
    fn test_admin_selectors_follow_signatures() {
        use alloy_sol_types::SolCall;

        assert_eq!(crate::calls::addSignerCall::SIGNATURE, "addSigner(address,bytes)");
        assert_eq!(crate::calls::removeSignerCall::SIGNATURE, "removeSigner(address,bytes)");
        assert_eq!(crate::calls::updateThresholdCall::SIGNATURE, "updateThreshold(uint256,bytes)");
        assert_eq!(constants::ADD_SIGNER, bridge_types::selector("addSigner(address,bytes)"));
    }

    #[test]
    fn test_commitment_tracks_membership() {
        let k = keys(3);
        let id = Address::derive(&[b"registry"]);
        let a = SignerRegistry::new(id, LEDGER, k.iter().map(|k| k.address()), 2).unwrap();
        let b = SignerRegistry::new(id, LEDGER, k[..2].iter().map(|k| k.address()), 2).unwrap();
        let c = SignerRegistry::new(id, LEDGER, k.iter().map(|k| k.address()), 3).unwrap();
        assert_eq!(a.commitment(), a.clone().commitment());
        assert_ne!(a.commitment(), b.commitment());
        assert_ne!(a.commitment(), c.commitment());
    }

    #[test]
    fn test_serde_skips_pending_events() {
        let k = keys(2);
        let mut reg = registry(&k, 1);
        let args = AbiEncoder::new().uint(2).finish();
        let bundle = admin_bundle(&reg, constants::UPDATE_THRESHOLD, &args, &[&k[0]]);
        reg.update_threshold(2, &bundle).unwrap();

        let bytes = bincode::serialize(&reg).unwrap();
        let mut restored: SignerRegistry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, reg);
        assert!(restored.take_events().is_empty());
    }
}
