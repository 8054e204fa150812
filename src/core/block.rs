//! Blocks, block proofs and the proof-supplying [`Prover`] seam.

use crate::core::transaction::Transaction;
use crate::core::validator::BlockValidatorError;
use crate::crypto::key_pair::{PrivateKey, verify};
use crate::types::bytes::Bytes;
use crate::types::encoding::Encode;
use crate::types::hash::{Hash, HashBuilder};
use crate::types::merkle_tree::MerkleTree;
use std::collections::BTreeMap;
use syncledger_derive::BinaryCodec;

/// Free-form key/value annotations carried by a block.
///
/// A `BTreeMap` so annotations hash identically whatever order they were
/// inserted in.
pub type Metadata = BTreeMap<String, String>;

/// Artifact a miner must supply for a block to be accepted.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub enum BlockProof {
    /// Signature over the header digest (see [`ProofHeader::message`]).
    Signature { public_key: Bytes, signature: Bytes },
    /// A claimed hash output with a leading-zero prefix.
    ///
    /// Only the claim is inspected; no work is recomputed.
    HashChallenge { output_hash: String, difficulty: u32 },
    /// Attestation of a kind the ledger does not understand. Never validates.
    Opaque(Bytes),
}

impl BlockProof {
    /// True when no usable artifact was supplied.
    pub fn is_missing(&self) -> bool {
        match self {
            BlockProof::Signature {
                public_key,
                signature,
            } => public_key.is_empty() || signature.is_empty(),
            BlockProof::HashChallenge { output_hash, .. } => output_hash.is_empty(),
            BlockProof::Opaque(label) => label.is_empty(),
        }
    }

    /// Checks the proof against the block it is attached to.
    pub fn validate(&self, header: &ProofHeader) -> bool {
        match self {
            BlockProof::Signature {
                public_key,
                signature,
            } => verify(public_key, &header.message(), signature),
            BlockProof::HashChallenge {
                output_hash,
                difficulty,
            } => {
                let zeros = output_hash.chars().take_while(|c| *c == '0').count();
                zeros >= *difficulty as usize
            }
            BlockProof::Opaque(_) => false,
        }
    }
}

/// A bare attestation label.
impl From<&str> for BlockProof {
    fn from(label: &str) -> Self {
        BlockProof::Opaque(Bytes::from(label))
    }
}

/// The header fields a block proof commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct ProofHeader {
    pub index: u64,
    pub previous_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u64,
}

impl ProofHeader {
    /// Canonical message signed by a signature proof.
    pub fn message(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"PROOF");
        self.encode(&mut buf);
        buf
    }
}

/// Supplies the proof for a candidate block.
///
/// The proof may depend on the Merkle root, which only exists once the
/// candidate transaction set is fixed, so mining asks for it late.
pub trait Prover {
    fn prove(&self, header: &ProofHeader) -> BlockProof;
}

impl Prover for BlockProof {
    fn prove(&self, _header: &ProofHeader) -> BlockProof {
        self.clone()
    }
}

impl Prover for PrivateKey {
    fn prove(&self, header: &ProofHeader) -> BlockProof {
        BlockProof::Signature {
            public_key: self.public_key(),
            signature: self.sign(&header.message()),
        }
    }
}

/// A block of the ledger.
///
/// `merkle_root` and `hash` are derived from the other fields at construction
/// and must be recomputable from them at any later point. A stored value that
/// disagrees with its recomputation indicates corruption.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Block {
    pub index: u64,
    pub previous_hash: Hash,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub proof: BlockProof,
    pub transactions: Vec<Transaction>,
    pub metadata: Metadata,
    pub nonce: u64,
    pub merkle_root: Hash,
    pub hash: Hash,
}

impl Block {
    pub fn new(
        index: u64,
        previous_hash: Hash,
        proof: BlockProof,
        transactions: Vec<Transaction>,
        metadata: Metadata,
        nonce: u64,
        timestamp: u64,
    ) -> Self {
        let mut block = Self {
            index,
            previous_hash,
            timestamp,
            proof,
            merkle_root: MerkleTree::from_transactions(&transactions),
            transactions,
            metadata,
            nonce,
            hash: Hash::zero(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The first block: no parent, no transactions, no proof requirement.
    pub fn genesis(timestamp: u64) -> Self {
        Self::new(
            0,
            Hash::zero(),
            BlockProof::Opaque(Bytes::from("genesis")),
            Vec::new(),
            Metadata::new(),
            0,
            timestamp,
        )
    }

    /// Hasher primed with every hashed field except the trailing nonce.
    pub fn header_prefix(&self) -> HashBuilder {
        let mut h = Hash::sha3();
        h.update(b"BLOCK");
        self.index.encode(&mut h);
        self.previous_hash.encode(&mut h);
        self.timestamp.encode(&mut h);
        self.proof.encode(&mut h);
        self.merkle_root.encode(&mut h);
        self.metadata.encode(&mut h);
        h
    }

    /// Finishes a [`header_prefix`](Self::header_prefix) with `nonce`.
    pub fn hash_with_nonce(prefix: &HashBuilder, nonce: u64) -> Hash {
        let mut h = prefix.clone();
        nonce.encode(&mut h);
        h.finalize()
    }

    /// Recomputes the block hash from the current field values.
    pub fn calculate_hash(&self) -> Hash {
        Self::hash_with_nonce(&self.header_prefix(), self.nonce)
    }

    /// Recomputes the Merkle root from the current transaction list.
    pub fn calculate_merkle_root(&self) -> Hash {
        MerkleTree::from_transactions(&self.transactions)
    }

    /// Swaps the transaction set and refreshes the derived fields.
    pub fn replace_transactions(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions;
        self.merkle_root = self.calculate_merkle_root();
        self.hash = self.calculate_hash();
    }

    pub fn proof_header(&self) -> ProofHeader {
        ProofHeader {
            index: self.index,
            previous_hash: self.previous_hash,
            merkle_root: self.merkle_root,
            timestamp: self.timestamp,
        }
    }

    /// Amount issued by reward transactions in this block.
    pub fn reward(&self) -> u128 {
        self.transactions
            .iter()
            .filter(|tx| tx.is_reward())
            .filter_map(|tx| tx.transfer.total_amount())
            .sum()
    }

    /// Sum of fees paid by the block's transactions.
    pub fn fees(&self) -> u128 {
        self.transactions.iter().map(|tx| tx.fee).sum()
    }

    /// Full self-consistency check.
    ///
    /// In order: stored Merkle root, stored hash, multisig authorization of
    /// every transaction, and the block proof.
    pub fn verify_integrity(&self) -> Result<(), BlockValidatorError> {
        let computed = self.calculate_merkle_root();
        if computed != self.merkle_root {
            return Err(BlockValidatorError::MerkleRootMismatch {
                stored: self.merkle_root,
                computed,
            });
        }

        let computed = self.calculate_hash();
        if computed != self.hash {
            return Err(BlockValidatorError::HashMismatch {
                stored: self.hash,
                computed,
            });
        }

        if let Some(tx) = self.transactions.iter().find(|tx| !tx.verify_authorization()) {
            return Err(BlockValidatorError::Unauthorized(tx.id));
        }

        if !self.proof.validate(&self.proof_header()) {
            return Err(BlockValidatorError::InvalidProof);
        }

        Ok(())
    }
}
