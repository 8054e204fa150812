//! Mempool: admitted transactions awaiting inclusion in a block.
//!
//! Transactions leave in arrival order. A hash index gives O(1) lookup and
//! duplicate detection, and a per-sender outflow tally lets admission check
//! a new transaction against the balance that earlier pending transactions
//! have not already claimed.

use crate::core::transaction::Transaction;
use crate::types::account_id::AccountId;
use crate::types::hash::Hash;
use std::collections::{HashMap, HashSet, VecDeque};
use syncledger_derive::Error;

/// Default transaction pool capacity.
pub const TXPOOL_CAPACITY: usize = 100_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxPoolError {
    #[error("transaction {0} is already pending")]
    Duplicate(Hash),
    #[error("transaction pool is full ({0} entries)")]
    Full(usize),
    #[error("pending outflow of the sender overflows")]
    Overflow,
}

/// FIFO pool of pending transactions.
#[derive(Debug, Clone)]
pub struct TxPool {
    capacity: usize,
    order: VecDeque<Hash>,
    by_id: HashMap<Hash, Transaction>,
    outflows: HashMap<AccountId, u128>,
}

impl TxPool {
    /// Creates an empty pool. A capacity of zero falls back to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            by_id: HashMap::new(),
            outflows: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &Hash) -> Option<&Transaction> {
        self.by_id.get(id)
    }

    /// Amount (transfers plus fees) that pending transactions will debit
    /// from `account`.
    pub fn pending_outflow(&self, account: &str) -> u128 {
        self.outflows.get(account).copied().unwrap_or_default()
    }

    /// Appends `tx` at the back of the queue.
    pub fn insert(&mut self, tx: Transaction) -> Result<(), TxPoolError> {
        if self.by_id.contains_key(&tx.id) {
            return Err(TxPoolError::Duplicate(tx.id));
        }
        if self.order.len() >= self.capacity {
            return Err(TxPoolError::Full(self.capacity));
        }

        if !tx.is_reward() {
            let debit = tx.total_debit().ok_or(TxPoolError::Overflow)?;
            let pending = self.pending_outflow(tx.from.as_str());
            let total = pending.checked_add(debit).ok_or(TxPoolError::Overflow)?;
            self.outflows.insert(tx.from.clone(), total);
        }

        self.order.push_back(tx.id);
        self.by_id.insert(tx.id, tx);
        Ok(())
    }

    /// Pending transactions in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Copy of the pending transactions in arrival order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.iter().cloned().collect()
    }

    /// Removes exactly the listed transactions, returning how many were present.
    pub fn remove_all(&mut self, ids: &[Hash]) -> usize {
        let targets: HashSet<&Hash> = ids.iter().collect();
        let mut removed = 0;
        for id in ids {
            if let Some(tx) = self.by_id.remove(id) {
                self.release_outflow(&tx);
                removed += 1;
            }
        }
        if removed > 0 {
            self.order.retain(|id| !targets.contains(id));
        }
        removed
    }

    /// Removes one transaction.
    pub fn remove(&mut self, id: &Hash) -> Option<Transaction> {
        let tx = self.by_id.remove(id)?;
        self.release_outflow(&tx);
        self.order.retain(|pending| pending != id);
        Some(tx)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_id.clear();
        self.outflows.clear();
    }

    fn release_outflow(&mut self, tx: &Transaction) {
        if tx.is_reward() {
            return;
        }
        let debit = tx.total_debit().unwrap_or_default();
        if let Some(pending) = self.outflows.get_mut(tx.from.as_str()) {
            *pending = pending.saturating_sub(debit);
            if *pending == 0 {
                self.outflows.remove(tx.from.as_str());
            }
        }
    }
}

impl Default for TxPool {
    fn default() -> Self {
        Self::new(TXPOOL_CAPACITY)
    }
}
