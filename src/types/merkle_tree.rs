//! Merkle roots over ordered transaction lists.
//!
//! - An empty list yields the all-zero sentinel (`Hash::zero()`).
//! - Leaf `i` is the digest of the canonical encoding of transaction `i`.
//! - A parent is the digest of `left ‖ right`. On a level with an odd node
//!   count the last node is paired with itself.
//! - Reduction happens in place, one level at a time.

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;

const EMPTY_ROOT: Hash = Hash::zero();

pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        let mut h = Hash::sha3();
        h.update(left.as_slice());
        h.update(right.as_slice());
        h.finalize()
    }

    /// Reduces leaf digests to a single root.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return EMPTY_ROOT;
        }

        let mut len = nodes.len();
        while len > 1 {
            let mut write = 0;
            let mut read = 0;

            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len { nodes[read + 1] } else { left };
                nodes[write] = Self::hash_pair(left, right);
                write += 1;
                read += 2;
            }

            len = write;
        }

        nodes[0]
    }

    /// Digest of one leaf.
    pub fn leaf(tx: &Transaction) -> Hash {
        Hash::of(tx)
    }

    /// Root of an ordered transaction list.
    pub fn from_transactions(txs: &[Transaction]) -> Hash {
        if txs.is_empty() {
            return EMPTY_ROOT;
        }
        Self::from_raw(txs.iter().map(Self::leaf).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::Transfer;
    use crate::types::account_id::AccountId;

    fn tx(to: &str, amount: u128) -> Transaction {
        Transaction::builder(
            AccountId::from("alice"),
            Transfer::Single {
                to: AccountId::from(to),
                amount,
            },
        )
        .timestamp(1_700_000_000)
        .build()
    }

    fn concat(left: Hash, right: Hash) -> Hash {
        let mut buf = left.as_slice().to_vec();
        buf.extend_from_slice(right.as_slice());
        Hash::digest(&buf)
    }

    #[test]
    fn empty_list_is_zero_sentinel() {
        assert_eq!(MerkleTree::from_transactions(&[]), Hash::zero());
        assert_eq!(MerkleTree::from_raw(Vec::new()), Hash::zero());
    }

    #[test]
    fn single_transaction_root_is_its_leaf() {
        let a = tx("bob", 1);
        assert_eq!(
            MerkleTree::from_transactions(std::slice::from_ref(&a)),
            Hash::of(&a)
        );
    }

    #[test]
    fn odd_level_pairs_last_node_with_itself() {
        let (a, b, c) = (tx("bob", 1), tx("carol", 2), tx("dave", 3));
        let (ha, hb, hc) = (Hash::of(&a), Hash::of(&b), Hash::of(&c));

        let expected = concat(concat(ha, hb), concat(hc, hc));
        assert_eq!(MerkleTree::from_transactions(&[a, b, c]), expected);
    }

    #[test]
    fn even_level_matches_manual_reduction() {
        let leaves: Vec<Hash> = (0u64..4).map(|i| Hash::of(&i)).collect();
        let expected = concat(
            concat(leaves[0], leaves[1]),
            concat(leaves[2], leaves[3]),
        );
        assert_eq!(MerkleTree::from_raw(leaves), expected);
    }

    #[test]
    fn root_is_deterministic() {
        let txs = vec![tx("bob", 1), tx("carol", 2), tx("dave", 3)];
        assert_eq!(
            MerkleTree::from_transactions(&txs),
            MerkleTree::from_transactions(&txs)
        );
    }

    #[test]
    fn reordering_changes_root() {
        let (a, b) = (tx("bob", 1), tx("carol", 2));
        assert_ne!(
            MerkleTree::from_transactions(&[a.clone(), b.clone()]),
            MerkleTree::from_transactions(&[b, a])
        );
    }
}
