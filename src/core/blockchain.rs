//! The chain: block sequence, mempool, ledger state and reward schedule.
//!
//! [`Blockchain`] is single-threaded and owns all of its state. Admission
//! ([`Blockchain::add_transaction`], [`Blockchain::submit_transaction`]) and
//! mining ([`Blockchain::mine_block`]) are the only mutation entry points;
//! callers sharing a chain across threads must serialize both behind one
//! guard, or go through [`crate::server`].

use crate::config::{ChainConfig, ConfigError};
use crate::core::block::{Block, Metadata, ProofHeader, Prover};
use crate::core::consensus::{self, Interrupt, PowError};
use crate::core::ledger::{LedgerError, LedgerState, MINER_KEY};
use crate::core::reward::RewardSchedule;
use crate::core::transaction::{Multisig, Transaction, Transfer, unix_now};
use crate::core::validator::{
    BlockValidator, BlockValidatorError, ChainValidationError, Validator, validate_chain,
};
use crate::storage::txpool::{TxPool, TxPoolError};
use crate::types::account_id::AccountId;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use crate::{debug, info, warn};
use std::collections::HashMap;
use syncledger_derive::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(ConfigError),
    #[error("invalid genesis allocation: {0}")]
    Ledger(LedgerError),
}

/// Why a transaction was not admitted to the mempool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("sender account name is empty")]
    EmptySender,
    #[error("{0} is reserved for reward issuance")]
    ReservedSender(AccountId),
    #[error("batch transfer has no entries")]
    EmptyBatch,
    #[error("fee {fee} is below the minimum {minimum}")]
    FeeBelowMinimum { fee: u128, minimum: u128 },
    #[error("multisig requires {required} signatures from {keys} authorized keys")]
    MalformedMultisig { required: u32, keys: usize },
    #[error("multisig declares {declared} signatures, needs {required}")]
    MissingSignatures { declared: usize, required: u32 },
    #[error("multisig signatures cannot precede the transaction id; use submit_transaction")]
    PresignedMultisig,
    #[error("{account} can spend {available}, transaction needs {required}")]
    InsufficientFunds {
        account: AccountId,
        available: u128,
        required: u128,
    },
    #[error("transaction amount overflows")]
    Overflow,
    #[error("transaction {0} is already confirmed")]
    AlreadyConfirmed(Hash),
    #[error("{0}")]
    Pool(TxPoolError),
}

impl From<TxPoolError> for AdmissionError {
    fn from(err: TxPoolError) -> Self {
        AdmissionError::Pool(err)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MineError {
    #[error("nothing to mine: mempool is empty and the block reward is zero")]
    NothingToMine,
    #[error("no proof artifact was supplied")]
    MissingProof,
    #[error("candidate extends {expected}, but the tip is now {tip}")]
    StaleCandidate { expected: Hash, tip: Hash },
    #[error("sealed block rejected: {0}")]
    Rejected(ChainValidationError),
    #[error("proof of work failed: {0}")]
    Pow(PowError),
    #[error("ledger rejected the block: {0}")]
    Ledger(LedgerError),
}

impl From<PowError> for MineError {
    fn from(err: PowError) -> Self {
        MineError::Pow(err)
    }
}

impl From<LedgerError> for MineError {
    fn from(err: LedgerError) -> Self {
        MineError::Ledger(err)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RollbackError {
    #[error("cannot remove {requested} blocks from a chain of {length}; genesis is protected")]
    TooDeep { requested: usize, length: usize },
}

/// An assembled but unsealed block.
///
/// Produced by [`Blockchain::prepare_candidate`]. The header is fixed; only
/// the nonce remains to be found.
#[derive(Debug, Clone)]
pub struct Candidate {
    block: Block,
    included: Vec<Hash>,
    evicted: Vec<Hash>,
}

impl Candidate {
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Ids of the mempool transactions the candidate includes.
    pub fn included(&self) -> &[Hash] {
        &self.included
    }

    /// Ids of pending transactions left out because their multisig
    /// authorization does not verify. They leave the mempool on commit.
    pub fn evicted(&self) -> &[Hash] {
        &self.evicted
    }

    /// Pure nonce search over the candidate header.
    pub fn search(&self, difficulty: u32, interrupt: &Interrupt) -> Result<(u64, Hash), PowError> {
        consensus::search(&self.block.header_prefix(), difficulty, interrupt)
    }

    /// Seals the candidate with the first nonce meeting `difficulty`.
    pub fn solve(self, difficulty: u32, interrupt: &Interrupt) -> Result<SealedBlock, PowError> {
        let block = consensus::mine(self.block, difficulty, interrupt)?;
        Ok(SealedBlock {
            block,
            included: self.included,
            evicted: self.evicted,
        })
    }
}

/// A block with its proof of work found, ready for [`Blockchain::commit_block`].
#[derive(Debug, Clone)]
pub struct SealedBlock {
    block: Block,
    included: Vec<Hash>,
    evicted: Vec<Hash>,
}

impl SealedBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }
}

/// The ledger chain.
#[derive(Debug)]
pub struct Blockchain {
    config: ChainConfig,
    schedule: RewardSchedule,
    blocks: Vec<Block>,
    pool: TxPool,
    ledger: LedgerState,
    allocations: Vec<(AccountId, u128)>,
    /// Confirmed transaction id to (block index, position in block).
    confirmed: HashMap<Hash, (usize, usize)>,
    tx_counter: u64,
}

impl Blockchain {
    /// Creates a chain holding only the genesis block.
    ///
    /// `allocations` seed the genesis balances and count toward the minted
    /// total.
    pub fn new(
        config: ChainConfig,
        allocations: impl IntoIterator<Item = (AccountId, u128)>,
    ) -> Result<Self, InitError> {
        config.validate().map_err(InitError::Config)?;
        let allocations: Vec<(AccountId, u128)> = allocations.into_iter().collect();
        let ledger = LedgerState::with_allocations(allocations.iter().cloned(), config.total_supply)
            .map_err(InitError::Ledger)?;
        let genesis = Block::genesis(unix_now());

        info!(
            "Initializing ledger: genesis={} accounts={} minted={}",
            genesis.hash,
            allocations.len(),
            ledger.total_minted()
        );

        Ok(Self {
            schedule: config.reward_schedule(),
            pool: TxPool::new(config.pool_capacity),
            config,
            blocks: vec![genesis],
            ledger,
            allocations,
            confirmed: HashMap::new(),
            tx_counter: 0,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Number of blocks, genesis included.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    pub fn get_balance(&self, account: &str) -> u128 {
        self.ledger.balance(account)
    }

    pub fn total_minted(&self) -> u128 {
        self.ledger.total_minted()
    }

    /// Reward the next mined block would issue.
    pub fn current_reward(&self) -> u128 {
        self.schedule.reward(self.height(), self.ledger.total_minted())
    }

    pub fn pending_transactions(&self) -> Vec<&Transaction> {
        self.pool.iter().collect()
    }

    /// Looks a transaction up in the mempool, then among confirmed blocks.
    pub fn transaction(&self, id: &Hash) -> Option<&Transaction> {
        self.pool.get(id).or_else(|| self.confirmed_transaction(id))
    }

    fn confirmed_transaction(&self, id: &Hash) -> Option<&Transaction> {
        let (block, position) = *self.confirmed.get(id)?;
        self.blocks.get(block)?.transactions.get(position)
    }

    /// Confirmed transactions in chain order.
    pub fn all_transactions(&self) -> Vec<&Transaction> {
        self.blocks.iter().flat_map(|b| b.transactions.iter()).collect()
    }

    /// Confirmed transactions sent or received by `account`, in chain order.
    pub fn transactions_for(&self, account: &str) -> Vec<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| {
                tx.from.as_str() == account
                    || tx.transfer.recipients().iter().any(|to| to.as_str() == account)
            })
            .collect()
    }

    /// Builds and admits a transaction.
    ///
    /// The fee is raised to the configured minimum when absent or lower.
    /// The id (and so the multisig signing message) is assigned here, so a
    /// `multisig` carrying signatures is rejected: only unsigned declarations
    /// with a zero threshold can pass. Callers that sign build the
    /// transaction themselves and use
    /// [`submit_transaction`](Self::submit_transaction).
    pub fn add_transaction(
        &mut self,
        from: impl Into<AccountId>,
        transfer: Transfer,
        fee: Option<u128>,
        multisig: Option<Multisig>,
    ) -> Result<Hash, AdmissionError> {
        if multisig.as_ref().is_some_and(|m| !m.signatures.is_empty()) {
            warn!("Rejected transaction: {}", AdmissionError::PresignedMultisig);
            return Err(AdmissionError::PresignedMultisig);
        }
        let fee = fee.unwrap_or(self.config.min_fee).max(self.config.min_fee);
        let mut builder = Transaction::builder(from, transfer)
            .fee(fee)
            .salt(self.tx_counter);
        if let Some(multisig) = multisig {
            builder = builder.multisig_record(multisig);
        }
        self.admit(builder.build())
    }

    /// Admits a transaction built by the caller, unchanged.
    ///
    /// Unlike [`add_transaction`](Self::add_transaction) a low fee is
    /// rejected rather than raised, since raising it would invalidate any
    /// multisig signatures.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<Hash, AdmissionError> {
        if tx.fee < self.config.min_fee {
            let err = AdmissionError::FeeBelowMinimum {
                fee: tx.fee,
                minimum: self.config.min_fee,
            };
            warn!("Rejected transaction {}: {err}", tx.id);
            return Err(err);
        }
        self.admit(tx)
    }

    fn admit(&mut self, tx: Transaction) -> Result<Hash, AdmissionError> {
        let id = tx.id;
        match self.check_admission(&tx) {
            Ok(()) => {
                self.pool.insert(tx).inspect_err(|err| {
                    warn!("Rejected transaction {id}: {err}");
                })?;
                self.tx_counter += 1;
                debug!("Admitted transaction {id}: pending={}", self.pool.len());
                Ok(id)
            }
            Err(err) => {
                warn!("Rejected transaction {id}: {err}");
                Err(err)
            }
        }
    }

    /// Checks `tx` against the balance left after everything already pending.
    fn check_admission(&self, tx: &Transaction) -> Result<(), AdmissionError> {
        if tx.from.is_empty() {
            return Err(AdmissionError::EmptySender);
        }
        if tx.from.is_issuer() {
            return Err(AdmissionError::ReservedSender(tx.from.clone()));
        }
        if matches!(&tx.transfer, Transfer::Batch(entries) if entries.is_empty()) {
            return Err(AdmissionError::EmptyBatch);
        }
        if let Some(multisig) = &tx.multisig {
            if multisig.is_malformed() {
                return Err(AdmissionError::MalformedMultisig {
                    required: multisig.required_signatures,
                    keys: multisig.authorized_keys.len(),
                });
            }
            if !multisig.declares_threshold() {
                return Err(AdmissionError::MissingSignatures {
                    declared: multisig.signatures.len(),
                    required: multisig.required_signatures,
                });
            }
        }
        if self.confirmed.contains_key(&tx.id) {
            return Err(AdmissionError::AlreadyConfirmed(tx.id));
        }

        let required = tx.total_debit().ok_or(AdmissionError::Overflow)?;
        let available = self
            .ledger
            .balance(tx.from.as_str())
            .saturating_sub(self.pool.pending_outflow(tx.from.as_str()));
        if required > available {
            return Err(AdmissionError::InsufficientFunds {
                account: tx.from.clone(),
                available,
                required,
            });
        }
        Ok(())
    }

    /// Assembles the next block from the mempool.
    ///
    /// Pending transactions whose multisig authorization does not verify are
    /// left out and marked for eviction; the mempool itself is not touched
    /// until [`commit_block`](Self::commit_block). The reward for the current
    /// height, if any, is paid to `miner` by a synthesized transaction
    /// appended last. `miner` is also recorded in the metadata under
    /// [`MINER_KEY`] as the fee recipient, replacing any caller value.
    pub fn prepare_candidate(
        &mut self,
        prover: &dyn Prover,
        miner: &AccountId,
        metadata: Option<Metadata>,
    ) -> Result<Candidate, MineError> {
        let (mut transactions, rejected): (Vec<Transaction>, Vec<Transaction>) = self
            .pool
            .snapshot()
            .into_iter()
            .partition(|tx| tx.verify_authorization());
        let evicted: Vec<Hash> = rejected.iter().map(|tx| tx.id).collect();

        let reward = self.current_reward();
        if transactions.is_empty() && reward == 0 {
            return Err(MineError::NothingToMine);
        }

        let included: Vec<Hash> = transactions.iter().map(|tx| tx.id).collect();
        let timestamp = unix_now();
        if reward > 0 {
            transactions.push(Transaction::reward(
                miner.clone(),
                reward,
                timestamp,
                self.tx_counter,
            ));
            self.tx_counter += 1;
        }

        let mut metadata = metadata.unwrap_or_default();
        metadata.insert(MINER_KEY.to_string(), miner.to_string());

        let tip = self.tip();
        let header = ProofHeader {
            index: tip.index + 1,
            previous_hash: tip.hash,
            merkle_root: MerkleTree::from_transactions(&transactions),
            timestamp,
        };
        let proof = prover.prove(&header);
        if proof.is_missing() {
            return Err(MineError::MissingProof);
        }

        let block = Block::new(
            header.index,
            header.previous_hash,
            proof,
            transactions,
            metadata,
            0,
            timestamp,
        );
        Ok(Candidate {
            block,
            included,
            evicted,
        })
    }

    /// Appends a sealed block and applies its ledger effects atomically.
    ///
    /// Fails without changing anything if the tip moved since the candidate
    /// was prepared, if the seal is invalid, or if the ledger cannot cover
    /// the block.
    pub fn commit_block(&mut self, sealed: SealedBlock) -> Result<&Block, MineError> {
        let SealedBlock {
            block,
            included,
            evicted,
        } = sealed;
        let tip = self.tip();
        if block.previous_hash != tip.hash || block.index != tip.index + 1 {
            return Err(MineError::StaleCandidate {
                expected: block.previous_hash,
                tip: tip.hash,
            });
        }

        let difficulty = self.config.pow_difficulty;
        BlockValidator::shallow(difficulty)
            .validate_block(tip, &block)
            .map_err(MineError::Rejected)?;
        if !block.hash.meets_difficulty(difficulty) {
            return Err(MineError::Rejected(ChainValidationError::Integrity {
                index: block.index,
                source: BlockValidatorError::InsufficientWork {
                    hash: block.hash,
                    difficulty,
                },
            }));
        }

        self.ledger.apply_block(&block)?;
        self.pool.remove_all(&included);
        for id in &evicted {
            if self.pool.remove(id).is_some() {
                warn!("Evicted transaction {id}: multisig authorization failed");
            }
        }

        let index = self.blocks.len();
        for (position, tx) in block.transactions.iter().enumerate() {
            self.confirmed.insert(tx.id, (index, position));
        }

        info!(
            "Committed block {}: hash={} transactions={} reward={} fees={}",
            block.index,
            block.hash,
            block.transactions.len(),
            block.reward(),
            block.fees()
        );
        self.blocks.push(block);
        Ok(self.tip())
    }

    /// Mines the next block: assemble, search for a nonce, commit.
    ///
    /// A [`MINER_KEY`] entry in `metadata` is overwritten with `miner`.
    pub fn mine_block(
        &mut self,
        prover: &dyn Prover,
        miner: &AccountId,
        metadata: Option<Metadata>,
    ) -> Result<Block, MineError> {
        let candidate = self.prepare_candidate(prover, miner, metadata)?;
        let sealed = candidate.solve(self.config.pow_difficulty, &Interrupt::never())?;
        self.commit_block(sealed).cloned()
    }

    /// Walks the chain and returns its first defect.
    ///
    /// `deep` adds per-block integrity (proof and multisig) and the
    /// proof-of-work predicate to the structural checks.
    pub fn validate_chain(&self, deep: bool) -> Result<(), ChainValidationError> {
        let validator = BlockValidator {
            pow_difficulty: self.config.pow_difficulty,
            deep,
        };
        validate_chain(&self.blocks, &validator).inspect_err(|err| {
            warn!("Chain validation failed: {err}");
        })
    }

    /// Structural validity: hashes, Merkle roots and parent links.
    pub fn is_chain_valid(&self) -> bool {
        self.validate_chain(false).is_ok()
    }

    /// Structural validity plus block integrity and proof of work.
    pub fn is_chain_valid_deep(&self) -> bool {
        self.validate_chain(true).is_ok()
    }

    /// Removes the last `n` blocks.
    ///
    /// Only the block sequence and the confirmed-transaction index change.
    /// Balances and the minted total keep their pre-rollback values; call
    /// [`rebuild_ledger`](Self::rebuild_ledger) to bring them back in line
    /// with the shortened chain. Transactions of the removed blocks are not
    /// returned to the mempool.
    pub fn rollback(&mut self, n: usize) -> Result<(), RollbackError> {
        let length = self.blocks.len();
        if n >= length {
            return Err(RollbackError::TooDeep {
                requested: n,
                length,
            });
        }

        for block in self.blocks.drain(length - n..) {
            for tx in &block.transactions {
                self.confirmed.remove(&tx.id);
            }
        }
        warn!(
            "Rolled back {n} blocks: height={} (ledger state is stale until rebuilt)",
            self.blocks.len()
        );
        Ok(())
    }

    /// Recomputes balances and the minted total by replaying every block
    /// from the genesis allocations.
    pub fn rebuild_ledger(&mut self) -> Result<(), LedgerError> {
        let mut ledger =
            LedgerState::with_allocations(self.allocations.iter().cloned(), self.config.total_supply)?;
        for block in self.blocks.iter().skip(1) {
            ledger.apply_block(block)?;
        }
        self.ledger = ledger;
        info!(
            "Rebuilt ledger from {} blocks: minted={}",
            self.blocks.len(),
            self.ledger.total_minted()
        );
        Ok(())
    }
}
