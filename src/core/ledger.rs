//! Account balances and their block-atomic state transition.
//!
//! Balances change only when a whole block is applied. All effects of a
//! block are staged in an [`Overlay`] over the current balances and written
//! back only if every debit is covered and issuance stays within supply, so a
//! failed application leaves the ledger untouched.

use crate::core::block::Block;
use crate::core::transaction::{Transaction, Transfer};
use crate::types::account_id::AccountId;
use std::collections::{BTreeMap, HashMap};
use syncledger_derive::Error;

/// Metadata key naming the account that collects a block's fees.
pub const MINER_KEY: &str = "miner";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {account} has {available}, needs {required}")]
    InsufficientFunds {
        account: AccountId,
        available: u128,
        required: u128,
    },
    #[error("balance arithmetic overflowed")]
    Overflow,
    #[error("issuance would raise minted total to {minted}, above supply {supply}")]
    SupplyExceeded { minted: u128, supply: u128 },
    #[error("block {index} collects fees but names no miner")]
    MissingMiner { index: u64 },
}

/// Mapping of account to balance plus cumulative issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    balances: HashMap<AccountId, u128>,
    total_minted: u128,
    total_supply: u128,
}

impl LedgerState {
    pub fn new(total_supply: u128) -> Self {
        Self {
            balances: HashMap::new(),
            total_minted: 0,
            total_supply,
        }
    }

    /// Seeds genesis balances. Allocations count as minted.
    pub fn with_allocations(
        allocations: impl IntoIterator<Item = (AccountId, u128)>,
        total_supply: u128,
    ) -> Result<Self, LedgerError> {
        let mut state = Self::new(total_supply);
        for (account, amount) in allocations {
            let minted = state
                .total_minted
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            if minted > total_supply {
                return Err(LedgerError::SupplyExceeded {
                    minted,
                    supply: total_supply,
                });
            }
            let balance = state.balances.entry(account).or_default();
            *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
            state.total_minted = minted;
        }
        Ok(state)
    }

    /// Balance of `account`; unknown accounts hold zero.
    pub fn balance(&self, account: &str) -> u128 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn total_minted(&self) -> u128 {
        self.total_minted
    }

    pub fn balances(&self) -> &HashMap<AccountId, u128> {
        &self.balances
    }

    /// Sum of all balances, saturating.
    pub fn total_balance(&self) -> u128 {
        self.balances
            .values()
            .fold(0u128, |acc, b| acc.saturating_add(*b))
    }

    /// Applies every effect of `block` or none of them.
    ///
    /// Per transaction, in block order:
    /// - batch: one debit of the sender for the sum plus fee, then one credit
    ///   per entry;
    /// - single transfer with a positive amount: debit amount plus fee,
    ///   credit the receiver;
    /// - zero amount or data-only: debit the fee.
    ///
    /// The reserved issuer is never debited; what it sends is new issuance.
    /// All fees are credited to the block's miner once, after every transfer.
    pub fn apply_block(&mut self, block: &Block) -> Result<(), LedgerError> {
        let mut overlay = Overlay::new(&self.balances);
        let mut fees: u128 = 0;
        let mut issued: u128 = 0;

        for tx in &block.transactions {
            fees = fees.checked_add(tx.fee).ok_or(LedgerError::Overflow)?;
            if tx.is_reward() {
                issued = issued
                    .checked_add(tx.total_debit().ok_or(LedgerError::Overflow)?)
                    .ok_or(LedgerError::Overflow)?;
            }
            apply_transaction(&mut overlay, tx)?;
        }

        if fees > 0 {
            let miner = block_miner(block).ok_or(LedgerError::MissingMiner { index: block.index })?;
            overlay.credit(&miner, fees)?;
        }

        let minted = self
            .total_minted
            .checked_add(issued)
            .ok_or(LedgerError::Overflow)?;
        if minted > self.total_supply {
            return Err(LedgerError::SupplyExceeded {
                minted,
                supply: self.total_supply,
            });
        }

        let writes = overlay.into_writes();
        for (account, balance) in writes {
            self.balances.insert(account, balance);
        }
        self.total_minted = minted;
        Ok(())
    }
}

/// Account collecting the fees of `block`.
pub fn block_miner(block: &Block) -> Option<AccountId> {
    block.metadata.get(MINER_KEY).map(|m| AccountId::from(m.as_str()))
}

fn apply_transaction(overlay: &mut Overlay<'_>, tx: &Transaction) -> Result<(), LedgerError> {
    match &tx.transfer {
        Transfer::Batch(entries) => {
            debit_sender(overlay, tx, tx.total_debit().ok_or(LedgerError::Overflow)?)?;
            for entry in entries {
                overlay.credit(&entry.to, entry.amount)?;
            }
        }
        Transfer::Single { to, amount } if *amount > 0 => {
            let total = amount.checked_add(tx.fee).ok_or(LedgerError::Overflow)?;
            debit_sender(overlay, tx, total)?;
            overlay.credit(to, *amount)?;
        }
        Transfer::Single { .. } | Transfer::Data => debit_sender(overlay, tx, tx.fee)?,
    }
    Ok(())
}

fn debit_sender(overlay: &mut Overlay<'_>, tx: &Transaction, amount: u128) -> Result<(), LedgerError> {
    if tx.is_reward() {
        return Ok(());
    }
    overlay.debit(&tx.from, amount)
}

/// Pending balance writes over a read-only base.
struct Overlay<'a> {
    base: &'a HashMap<AccountId, u128>,
    writes: BTreeMap<AccountId, u128>,
}

impl<'a> Overlay<'a> {
    fn new(base: &'a HashMap<AccountId, u128>) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    fn get(&self, account: &AccountId) -> u128 {
        self.writes
            .get(account)
            .or_else(|| self.base.get(account))
            .copied()
            .unwrap_or_default()
    }

    fn credit(&mut self, account: &AccountId, amount: u128) -> Result<(), LedgerError> {
        let balance = self
            .get(account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.writes.insert(account.clone(), balance);
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, amount: u128) -> Result<(), LedgerError> {
        let available = self.get(account);
        let balance = available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: account.clone(),
                available,
                required: amount,
            })?;
        self.writes.insert(account.clone(), balance);
        Ok(())
    }

    fn into_writes(self) -> BTreeMap<AccountId, u128> {
        self.writes
    }
}
