//! 32-byte SHA3-256 digests.

use crate::types::encoding::{Encode, EncodeSink};
use sha3::{Digest, Sha3_256};
use std::fmt;
use syncledger_derive::BinaryCodec;

/// SHA3-256 digest length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size digest used for block hashes, Merkle nodes and transaction ids.
///
/// `Copy` on purpose: digests are passed around constantly during validation
/// and fit comfortably on the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// The all-zero digest.
    ///
    /// Stands in for "no value": the Merkle root of an empty transaction list
    /// and the parent of the genesis block.
    pub const fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Starts an incremental SHA3-256 computation.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// Hashes raw bytes in one call.
    pub fn digest(data: &[u8]) -> Hash {
        let mut h = Self::sha3();
        h.update(data);
        h.finalize()
    }

    /// Hashes the canonical encoding of `value`.
    pub fn of<T: Encode + ?Sized>(value: &T) -> Hash {
        let mut h = Self::sha3();
        value.encode(&mut h);
        h.finalize()
    }

    /// Number of leading `'0'` characters in the hex rendering.
    pub fn leading_zero_digits(&self) -> u32 {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte < 0x10 {
                count += 1;
            }
            break;
        }
        count
    }

    /// True when the hex rendering starts with at least `difficulty` zeros.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zero_digits() >= difficulty
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(text: &str) -> Option<Hash> {
        if text.len() != HASH_LEN * 2 || !text.is_ascii() {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Hash(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental SHA3-256 hasher.
///
/// Implements [`EncodeSink`] so encodable values can be hashed without an
/// intermediate buffer, and `Clone` so a hashed prefix can be reused.
#[derive(Clone, Default)]
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Builder-style variant of [`update`](Self::update).
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.update(data);
        self
    }

    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}
