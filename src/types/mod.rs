pub mod account_id;
pub mod amount;
pub mod bytes;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
