//! Ledger core: transactions, blocks, validation and the chain itself.

pub mod block;
pub mod blockchain;
pub mod consensus;
pub mod ledger;
pub mod reward;
pub mod transaction;
pub mod validator;
