//! Shared types for mainchain/sidechain integration
//!
//! Everything that crosses the ledger boundary lives here: account
//! addresses, ledger identifiers, the argument encoding signers sign over,
//! and the event payloads the relayer watches for.

use std::{fmt, str::FromStr};

use alloy_primitives::{hex, Keccak256};
use borsh::{
    io::{Read, Result as IoResult, Write},
    BorshDeserialize, BorshSerialize,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod abi;
pub mod events;

pub use abi::AbiEncoder;
pub use events::{BridgeEvent, DepositFailure};

/// Token id within an asset contract
pub type AssetId = u128;

/// Dense, append-only index of a deposit or withdrawal record
pub type RecordIndex = u64;

/// Address length in bytes
pub const ADDRESS_LEN: usize = 20;

/// 20-byte account identifier, used for users, bridges, registries and assets
///
/// Displays as an EIP-55 checksummed hex string and serializes as hex.
#[derive(Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Address(pub alloy_primitives::Address);

impl Address {
    pub const ZERO: Address = Address(alloy_primitives::Address::ZERO);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(alloy_primitives::Address::new(bytes))
    }

    /// Build an address from a 20-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let arr: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self::new(arr))
    }

    /// Derive a deterministic address from arbitrary seed material
    ///
    /// Used for contract-like identities (bridges, registries, wrapped assets).
    pub fn derive(parts: &[&[u8]]) -> Self {
        let mut hasher = Keccak256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(alloy_primitives::Address::from_word(hasher.finalize()))
    }

    /// Address of a secp256k1 key given its 64-byte uncompressed point (no prefix)
    pub fn from_public_key(uncompressed: &[u8; 64]) -> Self {
        Self(alloy_primitives::Address::from_raw_public_key(uncompressed))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0 .0 .0
    }
}

impl From<alloy_primitives::Address> for Address {
    fn from(address: alloy_primitives::Address) -> Self {
        Self(address)
    }
}

impl From<Address> for alloy_primitives::Address {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

// Raw 20 bytes on the wire, same layout as `[u8; 20]`
impl BorshSerialize for Address {
    fn serialize<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        writer.write_all(self.as_bytes())
    }
}

impl BorshDeserialize for Address {
    fn deserialize_reader<R: Read>(reader: &mut R) -> IoResult<Self> {
        <[u8; ADDRESS_LEN]>::deserialize_reader(reader).map(Self::new)
    }
}

/// Address parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid address hex: {0}")]
    InvalidHex(String),
}

/// Identifier of one ledger (mainchain or sidechain deployment)
#[derive(
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[serde(transparent)]
pub struct LedgerId(pub u64);

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LedgerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    alloy_primitives::keccak256(data).0
}

/// 4-byte selector for a function signature such as `transfer(address,uint256)`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = alloy_primitives::keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Coarse classification of a rejected call
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input or a violated invariant; nothing was applied
    Validation,
    /// Not enough valid member signatures for the current nonce
    Authorization,
    /// The operation was already applied; the message was redundant
    StateConflict,
}

/// Failure of an external asset movement (transfer, mint or burn)
#[derive(Error, BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TransferError {
    #[error("asset {asset} is not known to this ledger")]
    UnknownAsset { asset: Address },

    #[error("asset {asset} has no token {asset_id}")]
    UnknownToken { asset: Address, asset_id: AssetId },

    #[error("{account} does not own {asset} token {asset_id}")]
    NotOwner {
        account: Address,
        asset: Address,
        asset_id: AssetId,
    },

    #[error("{account} holds no {asset} token {asset_id}")]
    InsufficientBalance {
        account: Address,
        asset: Address,
        asset_id: AssetId,
    },

    #[error("{recipient} refused {asset} token {asset_id}")]
    ReceiverRejected {
        recipient: Address,
        asset: Address,
        asset_id: AssetId,
    },

    #[error("{caller} may not mint or burn {asset}")]
    Unauthorized { caller: Address, asset: Address },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_selector_matches_erc20_transfer() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_address_parse_and_display() {
        let addr: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        assert_eq!(addr.as_bytes()[19], 0xff);
        assert_eq!(
            addr.to_string().to_lowercase(),
            "0x00000000000000000000000000000000000000ff"
        );
        assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);

        let no_prefix: Address = "00000000000000000000000000000000000000ff".parse().unwrap();
        assert_eq!(addr, no_prefix);

        assert_eq!(
            "0x1234".parse::<Address>(),
            Err(AddressError::InvalidLength(2))
        );
        assert!(matches!("0xzz".parse::<Address>(), Err(AddressError::InvalidHex(_))));
    }

    #[test]
    fn test_address_serde_as_hex_string() {
        let addr = Address::derive(&[b"alice"]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json.to_lowercase(), format!("\"{}\"", addr).to_lowercase());
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_derive_is_deterministic() {
        assert_eq!(Address::derive(&[b"a", b"b"]), Address::derive(&[b"ab"]));
        assert_ne!(Address::derive(&[b"a"]), Address::derive(&[b"b"]));
        assert!(!Address::derive(&[b"a"]).is_zero());
    }
}
