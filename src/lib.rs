//! Single-writer append-only ledger.
//!
//! Blocks commit to their transactions through a Merkle root, carry a
//! pluggable authorization proof and pass a leading-zero proof-of-work gate.
//! Issuance follows a halving schedule capped by a total supply.

pub mod config;
pub mod core;
pub mod crypto;
pub mod server;
pub mod storage;
pub mod types;
pub mod utils;
