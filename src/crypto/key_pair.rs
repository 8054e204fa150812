//! ECDSA key pairs on secp256k1.
//!
//! Public keys and signatures leave this module as opaque [`Bytes`]: the
//! ledger stores and compares them but never interprets them. Public keys use
//! the 33-byte SEC1 compressed form, signatures the 64-byte `r ‖ s` form.

use crate::types::bytes::Bytes;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use std::fmt;
use zeroize::Zeroizing;

/// Length of a compressed SEC1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length of a fixed-size ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;

/// Private key used for transaction multisig and block signature proofs.
///
/// Never serialized by the ledger. `Debug` prints only the public half.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Creates a private key from a 32-byte big-endian scalar.
    ///
    /// Returns `None` if the bytes are not a valid non-zero scalar.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        SigningKey::from_slice(bytes).ok().map(|key| Self { key })
    }

    /// Raw scalar bytes, wiped from memory when dropped.
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.key.to_bytes().into())
    }

    /// Compressed SEC1 encoding of the matching public key.
    pub fn public_key(&self) -> Bytes {
        let point = self.key.verifying_key().to_encoded_point(true);
        Bytes::new(point.as_bytes())
    }

    /// Signs `data` (SHA-256 prehash) and returns the 64-byte signature.
    pub fn sign(&self, data: &[u8]) -> Bytes {
        let signature: Signature = self.key.sign(data);
        Bytes::new(&signature.to_bytes()[..])
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Generates a fresh key pair, returning the private key and its public bytes.
pub fn generate_keypair() -> (PrivateKey, Bytes) {
    let key = PrivateKey::new();
    let public = key.public_key();
    (key, public)
}

/// Checks `signature` over `data` against a SEC1-encoded public key.
///
/// Any malformed key or signature yields `false`.
pub fn verify(public_key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(data, &signature).is_ok()
}
