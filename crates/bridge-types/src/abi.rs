//! ABI-style argument encoding for authorization messages
//!
//! Every argument occupies one 32-byte word, encoded the way Solidity's
//! `abi.encode` lays out static types. Strings are committed to by their
//! keccak hash so the encoding stays fixed-width.

use alloy_primitives::{FixedBytes, B256, U256};
use alloy_sol_types::SolValue;

use crate::{keccak256, Address, LedgerId};

/// Width of one encoded argument
pub const WORD_LEN: usize = 32;

/// Builder for encoded argument lists
#[derive(Debug, Clone, Default)]
pub struct AbiEncoder {
    buf: Vec<u8>,
}

impl AbiEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push<T: SolValue>(mut self, value: &T) -> Self {
        self.buf.extend_from_slice(&value.abi_encode());
        self
    }

    /// Append an unsigned integer
    pub fn uint(self, value: u128) -> Self {
        self.push(&U256::from(value))
    }

    /// Append a ledger identifier (encoded as uint)
    pub fn ledger(self, id: LedgerId) -> Self {
        self.push(&U256::from(id.0))
    }

    /// Append an address
    pub fn address(self, address: &Address) -> Self {
        self.push(&address.0)
    }

    /// Append a 4-byte selector (`bytes4`, right-padded)
    pub fn selector(self, selector: [u8; 4]) -> Self {
        self.push(&FixedBytes::<4>::from(selector))
    }

    /// Append a raw 32-byte word
    pub fn word(self, word: &[u8; WORD_LEN]) -> Self {
        self.push(&B256::from(*word))
    }

    /// Append a string, committed to by its hash
    pub fn string(self, value: &str) -> Self {
        self.word(&keccak256(value.as_bytes()))
    }

    /// Append already-encoded arguments
    pub fn raw(mut self, encoded: &[u8]) -> Self {
        self.buf.extend_from_slice(encoded);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
