//! Signer keys
//!
//! Held by relayer operators off-ledger. Produces the 65-byte entries that
//! make up a signature bundle.

use std::fmt;

use bridge_types::{Address, LedgerId};
use rand::RngCore;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::{bundle::ledger_bound_digest, RegistryError, SIGNATURE_LEN};

/// A secp256k1 signing key and the address it recovers to
#[derive(Clone)]
pub struct SignerKey {
    secret: SecretKey,
    address: Address,
}

impl SignerKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| RegistryError::InvalidSecretKey)?;
        Ok(Self::from_secret(secret))
    }

    /// Parse a 32-byte hex secret, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, RegistryError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| RegistryError::InvalidSecretKey)?;
        Self::from_bytes(&bytes)
    }

    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        loop {
            rng.fill_bytes(&mut bytes);
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Self::from_secret(secret);
            }
        }
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        let uncompressed = public.serialize_uncompressed();
        let mut point = [0u8; 64];
        point.copy_from_slice(&uncompressed[1..]);
        Self {
            secret,
            address: Address::from_public_key(&point),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Hex-encoded secret, for writing config files
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// Sign an authorization hash for the given ledger
    pub fn sign(&self, ledger_id: LedgerId, hash: &[u8; 32]) -> [u8; SIGNATURE_LEN] {
        let message = Message::from_digest(ledger_bound_digest(ledger_id, hash));
        let (recovery_id, compact) = SECP256K1
            .sign_ecdsa_recoverable(&message, &self.secret)
            .serialize_compact();

        let mut entry = [0u8; SIGNATURE_LEN];
        entry[..64].copy_from_slice(&compact);
        entry[64] = 27 + recovery_id.to_i32() as u8;
        entry
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerKey")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
