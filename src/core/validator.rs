//! Block and chain validation rules.
//!
//! [`Validator`] checks one block against its parent; [`validate_chain`]
//! walks a whole block sequence with it. Validation only reports; it never
//! repairs.

use crate::core::block::Block;
use crate::types::hash::Hash;
use syncledger_derive::Error;

/// Why a single block failed its self-consistency check.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockValidatorError {
    #[error("merkle root mismatch: stored {stored}, computed {computed}")]
    MerkleRootMismatch { stored: Hash, computed: Hash },

    #[error("block hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: Hash, computed: Hash },

    #[error("transaction {0} is not authorized by its multisig threshold")]
    Unauthorized(Hash),

    #[error("block proof does not validate")]
    InvalidProof,

    #[error("block hash {hash} does not meet difficulty {difficulty}")]
    InsufficientWork { hash: Hash, difficulty: u32 },
}

/// First defect found while walking the chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainValidationError {
    #[error("chain has no genesis block")]
    Empty,

    #[error("genesis block is malformed")]
    InvalidGenesis,

    #[error("block at position {position} carries index {index}")]
    IndexGap { position: u64, index: u64 },

    #[error("block {index} stored hash differs from its recomputation")]
    HashMismatch { index: u64 },

    #[error("block {index} merkle root differs from its transactions")]
    MerkleMismatch { index: u64 },

    #[error("block {index} does not link to its parent")]
    BrokenLink { index: u64 },

    #[error("block {index} failed integrity check: {source}")]
    Integrity {
        index: u64,
        source: BlockValidatorError,
    },
}

/// Validates a block against its parent.
pub trait Validator {
    type Error;

    fn validate_block(&self, parent: &Block, block: &Block) -> Result<(), Self::Error>;
}

/// Default rules.
///
/// Shallow mode checks position, recomputed hash, Merkle root and parent
/// link. Deep mode adds [`Block::verify_integrity`] and the proof-of-work
/// difficulty predicate.
#[derive(Debug, Clone, Copy)]
pub struct BlockValidator {
    pub pow_difficulty: u32,
    pub deep: bool,
}

impl BlockValidator {
    pub fn shallow(pow_difficulty: u32) -> Self {
        Self {
            pow_difficulty,
            deep: false,
        }
    }

    pub fn deep(pow_difficulty: u32) -> Self {
        Self {
            pow_difficulty,
            deep: true,
        }
    }

    fn validate_genesis(&self, genesis: &Block) -> Result<(), ChainValidationError> {
        if genesis.index != 0
            || !genesis.previous_hash.is_zero()
            || !genesis.transactions.is_empty()
            || !genesis.merkle_root.is_zero()
        {
            return Err(ChainValidationError::InvalidGenesis);
        }
        if genesis.calculate_hash() != genesis.hash {
            return Err(ChainValidationError::HashMismatch { index: 0 });
        }
        Ok(())
    }
}

impl Validator for BlockValidator {
    type Error = ChainValidationError;

    fn validate_block(&self, parent: &Block, block: &Block) -> Result<(), Self::Error> {
        let expected = parent.index + 1;
        if block.index != expected {
            return Err(ChainValidationError::IndexGap {
                position: expected,
                index: block.index,
            });
        }

        let index = block.index;
        if block.calculate_hash() != block.hash {
            return Err(ChainValidationError::HashMismatch { index });
        }
        if block.calculate_merkle_root() != block.merkle_root {
            return Err(ChainValidationError::MerkleMismatch { index });
        }
        if block.previous_hash != parent.hash {
            return Err(ChainValidationError::BrokenLink { index });
        }

        if self.deep {
            block
                .verify_integrity()
                .map_err(|source| ChainValidationError::Integrity { index, source })?;
            if !block.hash.meets_difficulty(self.pow_difficulty) {
                return Err(ChainValidationError::Integrity {
                    index,
                    source: BlockValidatorError::InsufficientWork {
                        hash: block.hash,
                        difficulty: self.pow_difficulty,
                    },
                });
            }
        }

        Ok(())
    }
}

/// Validates every block of `blocks` in order, returning the first defect.
pub fn validate_chain(blocks: &[Block], validator: &BlockValidator) -> Result<(), ChainValidationError> {
    let Some(genesis) = blocks.first() else {
        return Err(ChainValidationError::Empty);
    };
    validator.validate_genesis(genesis)?;

    for pair in blocks.windows(2) {
        validator.validate_block(&pair[0], &pair[1])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{BlockProof, Metadata, Prover};
    use crate::core::consensus::{Interrupt, mine};
    use crate::crypto::key_pair::PrivateKey;

    const DIFFICULTY: u32 = 1;

    fn child(parent: &Block, key: &PrivateKey) -> Block {
        let mut template = Block::new(
            parent.index + 1,
            parent.hash,
            BlockProof::Opaque(Default::default()),
            vec![],
            Metadata::new(),
            0,
            parent.timestamp + 1,
        );
        template.proof = key.prove(&template.proof_header());
        mine(template, DIFFICULTY, &Interrupt::never()).unwrap()
    }

    fn chain(len: usize) -> Vec<Block> {
        let key = PrivateKey::new();
        let mut blocks = vec![Block::genesis(0)];
        while blocks.len() < len {
            let next = child(blocks.last().unwrap(), &key);
            blocks.push(next);
        }
        blocks
    }

    #[test]
    fn valid_chain_passes_both_modes() {
        let blocks = chain(4);
        assert_eq!(validate_chain(&blocks, &BlockValidator::shallow(DIFFICULTY)), Ok(()));
        assert_eq!(validate_chain(&blocks, &BlockValidator::deep(DIFFICULTY)), Ok(()));
    }

    #[test]
    fn empty_chain_rejected() {
        assert_eq!(
            validate_chain(&[], &BlockValidator::shallow(DIFFICULTY)),
            Err(ChainValidationError::Empty)
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut blocks = chain(3);
        blocks[2].previous_hash = Hash::digest(b"elsewhere");
        blocks[2].hash = blocks[2].calculate_hash();
        assert_eq!(
            validate_chain(&blocks, &BlockValidator::shallow(DIFFICULTY)),
            Err(ChainValidationError::BrokenLink { index: 2 })
        );
    }

    #[test]
    fn stale_hash_detected() {
        let mut blocks = chain(3);
        blocks[1].timestamp += 10;
        assert_eq!(
            validate_chain(&blocks, &BlockValidator::shallow(DIFFICULTY)),
            Err(ChainValidationError::HashMismatch { index: 1 })
        );
    }

    #[test]
    fn index_gap_detected() {
        let mut blocks = chain(3);
        blocks.remove(1);
        assert_eq!(
            validate_chain(&blocks, &BlockValidator::shallow(DIFFICULTY)),
            Err(ChainValidationError::IndexGap {
                position: 1,
                index: 2
            })
        );
    }

    #[test]
    fn malformed_genesis_detected() {
        let mut blocks = chain(2);
        blocks[0].previous_hash = Hash::digest(b"not zero");
        assert_eq!(
            validate_chain(&blocks, &BlockValidator::shallow(DIFFICULTY)),
            Err(ChainValidationError::InvalidGenesis)
        );
    }

    #[test]
    fn deep_mode_rejects_failing_proof() {
        let mut blocks = chain(2);
        blocks[1].proof = BlockProof::Opaque("label".into());
        blocks[1].hash = blocks[1].calculate_hash();

        assert_eq!(validate_chain(&blocks, &BlockValidator::shallow(DIFFICULTY)), Ok(()));
        assert_eq!(
            validate_chain(&blocks, &BlockValidator::deep(0)),
            Err(ChainValidationError::Integrity {
                index: 1,
                source: BlockValidatorError::InvalidProof
            })
        );
    }

    #[test]
    fn deep_mode_checks_difficulty() {
        let blocks = chain(2);
        let hash = blocks[1].hash;
        let too_hard = hash.leading_zero_digits() + 1;
        assert!(matches!(
            validate_chain(&blocks, &BlockValidator::deep(too_hard)),
            Err(ChainValidationError::Integrity {
                index: 1,
                source: BlockValidatorError::InsufficientWork { .. }
            })
        ));
    }
}
