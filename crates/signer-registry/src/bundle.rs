//! Signature bundle decoding and signer recovery.
//!
//! A bundle is a flat concatenation of 65-byte `r || s || v` entries, sorted
//! by the address each entry recovers to.

use bridge_types::{keccak256, AbiEncoder, Address, LedgerId};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, SECP256K1,
};

use crate::RegistryError;

/// Size of one signature entry
pub const SIGNATURE_LEN: usize = 65;

/// Bind a message hash to a ledger so signatures cannot cross deployments.
pub fn ledger_bound_digest(ledger_id: LedgerId, hash: &[u8; 32]) -> [u8; 32] {
    keccak256(&AbiEncoder::new().ledger(ledger_id).word(hash).finish())
}

/// Recover every signer in a bundle, in bundle order.
///
/// Fails on an empty or ragged bundle, on an undecodable entry, and on any
/// entry whose signer does not sort strictly after the previous one. Members
/// and non-members are treated alike here; membership is the registry's call.
pub fn recover_bundle(
    ledger_id: LedgerId,
    hash: &[u8; 32],
    bundle: &[u8],
) -> Result<Vec<Address>, RegistryError> {
    if bundle.is_empty() {
        return Err(RegistryError::EmptyBundle);
    }
    if bundle.len() % SIGNATURE_LEN != 0 {
        return Err(RegistryError::MalformedBundle { len: bundle.len() });
    }

    let digest = ledger_bound_digest(ledger_id, hash);
    let message = Message::from_digest(digest);

    let mut recovered: Vec<Address> = Vec::with_capacity(bundle.len() / SIGNATURE_LEN);
    for (index, entry) in bundle.chunks_exact(SIGNATURE_LEN).enumerate() {
        let signer = recover_entry(&message, entry, index)?;
        if let Some(previous) = recovered.last() {
            if signer <= *previous {
                return Err(RegistryError::UnsortedSigners { index });
            }
        }
        recovered.push(signer);
    }

    Ok(recovered)
}

fn recover_entry(message: &Message, entry: &[u8], index: usize) -> Result<Address, RegistryError> {
    let v = match entry[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        _ => return Err(RegistryError::InvalidSignature { index }),
    };

    let recovery_id = RecoveryId::from_i32(i32::from(v))
        .map_err(|_| RegistryError::InvalidSignature { index })?;
    let signature = RecoverableSignature::from_compact(&entry[..64], recovery_id)
        .map_err(|_| RegistryError::InvalidSignature { index })?;
    let pubkey = SECP256K1
        .recover_ecdsa(message, &signature)
        .map_err(|_| RegistryError::InvalidSignature { index })?;

    let uncompressed = pubkey.serialize_uncompressed();
    let mut point = [0u8; 64];
    point.copy_from_slice(&uncompressed[1..]);
    Ok(Address::from_public_key(&point))
}

/// Concatenate signatures into a bundle sorted by signer address.
///
/// Duplicate signers keep only their first entry.
pub fn assemble_bundle(mut entries: Vec<(Address, [u8; SIGNATURE_LEN])>) -> Vec<u8> {
    entries.sort_by_key(|(signer, _)| *signer);
    entries.dedup_by_key(|(signer, _)| *signer);
    entries
        .into_iter()
        .flat_map(|(_, signature)| signature)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignerKey;

    fn key(seed: u8) -> SignerKey {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        SignerKey::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_recover_sorted_bundle() {
        let hash = [0xAB; 32];
        let ledger = LedgerId(1);
        let (a, b) = (key(1), key(2));

        let bundle = assemble_bundle(vec![
            (a.address(), a.sign(ledger, &hash)),
            (b.address(), b.sign(ledger, &hash)),
        ]);
        let recovered = recover_bundle(ledger, &hash, &bundle).unwrap();

        let mut expected = vec![a.address(), b.address()];
        expected.sort();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_length_checks() {
        let hash = [0u8; 32];
        assert_eq!(
            recover_bundle(LedgerId(1), &hash, &[]),
            Err(RegistryError::EmptyBundle)
        );
        assert_eq!(
            recover_bundle(LedgerId(1), &hash, &[0u8; 64]),
            Err(RegistryError::MalformedBundle { len: 64 })
        );
        assert_eq!(
            recover_bundle(LedgerId(1), &hash, &[0u8; 131]),
            Err(RegistryError::MalformedBundle { len: 131 })
        );
    }

    #[test]
    fn test_bad_recovery_byte_rejected() {
        let hash = [1u8; 32];
        let mut sig = key(3).sign(LedgerId(1), &hash);
        sig[64] = 35;
        assert_eq!(
            recover_bundle(LedgerId(1), &hash, &sig),
            Err(RegistryError::InvalidSignature { index: 0 })
        );
    }

    #[test]
    fn test_zero_signature_rejected() {
        assert_eq!(
            recover_bundle(LedgerId(1), &[1u8; 32], &[0u8; SIGNATURE_LEN]),
            Err(RegistryError::InvalidSignature { index: 0 })
        );
    }

    #[test]
    fn test_unsorted_and_duplicate_entries_rejected() {
        let hash = [7u8; 32];
        let ledger = LedgerId(9);
        let (a, b) = (key(1), key(2));
        let (low, high) = if a.address() < b.address() { (a, b) } else { (b, a) };

        let mut reversed = high.sign(ledger, &hash).to_vec();
        reversed.extend_from_slice(&low.sign(ledger, &hash));
        assert_eq!(
            recover_bundle(ledger, &hash, &reversed),
            Err(RegistryError::UnsortedSigners { index: 1 })
        );

        let mut duplicated = low.sign(ledger, &hash).to_vec();
        duplicated.extend_from_slice(&low.sign(ledger, &hash));
        assert_eq!(
            recover_bundle(ledger, &hash, &duplicated),
            Err(RegistryError::UnsortedSigners { index: 1 })
        );
    }

    #[test]
    fn test_ledger_binding_changes_recovered_signer() {
        let hash = [5u8; 32];
        let signer = key(4);
        let sig = signer.sign(LedgerId(1), &hash);

        let same = recover_bundle(LedgerId(1), &hash, &sig).unwrap();
        assert_eq!(same, vec![signer.address()]);

        // Replayed on another ledger the entry recovers to some unrelated account
        let other = recover_bundle(LedgerId(2), &hash, &sig);
        assert!(other.map(|signers| signers != vec![signer.address()]).unwrap_or(true));
    }

    #[test]
    fn test_assemble_dedups() {
        let hash = [2u8; 32];
        let a = key(1);
        let sig = a.sign(LedgerId(1), &hash);
        let bundle = assemble_bundle(vec![(a.address(), sig), (a.address(), sig)]);
        assert_eq!(bundle.len(), SIGNATURE_LEN);
    }
}
