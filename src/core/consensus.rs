//! Proof-of-work nonce search.
//!
//! The search is a pure function of an immutable header prefix: it returns
//! the first `(nonce, hash)` whose hex rendering starts with `difficulty`
//! zeros. It runs on the caller's thread and polls an [`Interrupt`] so a
//! deadline or an external cancel can stop it.

use crate::core::block::Block;
use crate::types::hash::{Hash, HashBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use syncledger_derive::Error;

/// Nonces tried between two interrupt polls.
const POLL_INTERVAL: u64 = 1024;

/// Largest meaningful difficulty: every nibble of a 32-byte digest.
pub const MAX_DIFFICULTY: u32 = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PowError {
    #[error("nonce search was cancelled")]
    Interrupted,
    #[error("nonce search exceeded its deadline")]
    DeadlineExceeded,
    #[error("nonce space exhausted without meeting difficulty {0}")]
    Exhausted(u32),
    #[error("difficulty {0} exceeds the digest length")]
    Unreachable(u32),
}

/// Cooperative cancellation for a running search.
///
/// Clones share the same flag, so one clone can be handed to the search and
/// another kept to [`raise`](Self::raise) it.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Interrupt {
    /// An interrupt that is only ever raised explicitly.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), PowError> {
        if self.is_raised() {
            return Err(PowError::Interrupted);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(PowError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Finds the first nonce from zero whose hash meets `difficulty`.
pub fn search(
    prefix: &HashBuilder,
    difficulty: u32,
    interrupt: &Interrupt,
) -> Result<(u64, Hash), PowError> {
    if difficulty > MAX_DIFFICULTY {
        return Err(PowError::Unreachable(difficulty));
    }
    interrupt.check()?;

    let mut nonce: u64 = 0;
    loop {
        let hash = Block::hash_with_nonce(prefix, nonce);
        if hash.meets_difficulty(difficulty) {
            return Ok((nonce, hash));
        }
        nonce = nonce
            .checked_add(1)
            .ok_or(PowError::Exhausted(difficulty))?;
        if nonce % POLL_INTERVAL == 0 {
            interrupt.check()?;
        }
    }
}

/// Runs [`search`] over `block`'s header and returns it sealed with the
/// winning nonce and hash.
pub fn mine(mut block: Block, difficulty: u32, interrupt: &Interrupt) -> Result<Block, PowError> {
    let (nonce, hash) = search(&block.header_prefix(), difficulty, interrupt)?;
    block.nonce = nonce;
    block.hash = hash;
    Ok(block)
}
