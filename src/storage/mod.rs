//! In-memory holding area for transactions awaiting a block.

pub mod txpool;
