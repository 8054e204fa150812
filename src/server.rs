//! Single-writer ledger service.
//!
//! A [`LedgerServer`] owns the [`Blockchain`] and processes commands one at a
//! time from a bounded channel, so admission and mining can never interleave.
//! Any number of cloned [`LedgerHandle`]s submit commands and await the
//! `oneshot` reply. The nonce search runs on the blocking pool under a
//! timeout; a search that overruns has its interrupt raised.

use crate::core::block::{Block, Metadata, Prover};
use crate::core::blockchain::{AdmissionError, Blockchain, MineError};
use crate::core::consensus::{Interrupt, PowError};
use crate::core::transaction::{Multisig, Transaction, Transfer};
use crate::core::validator::ChainValidationError;
use crate::types::account_id::AccountId;
use crate::types::hash::Hash;
use crate::{info, warn};
use std::time::Duration;
use syncledger_derive::Error;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::sync::oneshot;

/// Commands queued before senders start waiting.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerError {
    #[error("transaction rejected: {0}")]
    Admission(AdmissionError),
    #[error("mining failed: {0}")]
    Mine(MineError),
    #[error("chain is invalid: {0}")]
    Validation(ChainValidationError),
    #[error("mining worker stopped unexpectedly")]
    Worker,
    #[error("ledger server is not running")]
    Closed,
}

impl From<AdmissionError> for ServerError {
    fn from(err: AdmissionError) -> Self {
        ServerError::Admission(err)
    }
}

impl From<MineError> for ServerError {
    fn from(err: MineError) -> Self {
        ServerError::Mine(err)
    }
}

type Reply<T> = oneshot::Sender<Result<T, ServerError>>;

enum Command {
    AddTransaction {
        from: AccountId,
        transfer: Transfer,
        fee: Option<u128>,
        multisig: Option<Multisig>,
        reply: Reply<Hash>,
    },
    SubmitTransaction {
        tx: Transaction,
        reply: Reply<Hash>,
    },
    Mine {
        prover: Box<dyn Prover + Send>,
        miner: AccountId,
        metadata: Option<Metadata>,
        reply: Reply<Block>,
    },
    Balance {
        account: AccountId,
        reply: Reply<u128>,
    },
    Height {
        reply: Reply<u64>,
    },
    Validate {
        deep: bool,
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Owner of the chain; run it with [`LedgerServer::run`].
pub struct LedgerServer {
    chain: Blockchain,
    rx: Receiver<Command>,
    mine_timeout: Duration,
}

impl LedgerServer {
    /// Wraps `chain` and returns the server with its first handle.
    pub fn new(chain: Blockchain) -> (Self, LedgerHandle) {
        let (tx, rx) = channel(COMMAND_QUEUE_CAPACITY);
        let mine_timeout = chain.config().mine_timeout;
        (
            Self {
                chain,
                rx,
                mine_timeout,
            },
            LedgerHandle { tx },
        )
    }

    /// Processes commands until shutdown or until every handle is dropped,
    /// then hands the chain back.
    pub async fn run(mut self) -> Blockchain {
        info!("Ledger server started: height={}", self.chain.height());

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::AddTransaction {
                    from,
                    transfer,
                    fee,
                    multisig,
                    reply,
                } => {
                    let result = self.chain.add_transaction(from, transfer, fee, multisig);
                    let _ = reply.send(result.map_err(ServerError::from));
                }
                Command::SubmitTransaction { tx, reply } => {
                    let result = self.chain.submit_transaction(tx);
                    let _ = reply.send(result.map_err(ServerError::from));
                }
                Command::Mine {
                    prover,
                    miner,
                    metadata,
                    reply,
                } => {
                    let result = self.mine(prover, &miner, metadata).await;
                    let _ = reply.send(result);
                }
                Command::Balance { account, reply } => {
                    let _ = reply.send(Ok(self.chain.get_balance(account.as_str())));
                }
                Command::Height { reply } => {
                    let _ = reply.send(Ok(self.chain.height()));
                }
                Command::Validate { deep, reply } => {
                    let result = self.chain.validate_chain(deep);
                    let _ = reply.send(result.map_err(ServerError::Validation));
                }
                Command::Shutdown { reply } => {
                    let _ = reply.send(Ok(()));
                    break;
                }
            }
        }

        info!("Ledger server stopped: height={}", self.chain.height());
        self.chain
    }

    async fn mine(
        &mut self,
        prover: Box<dyn Prover + Send>,
        miner: &AccountId,
        metadata: Option<Metadata>,
    ) -> Result<Block, ServerError> {
        let candidate = self.chain.prepare_candidate(prover.as_ref(), miner, metadata)?;
        let difficulty = self.chain.config().pow_difficulty;

        let interrupt = Interrupt::never();
        let worker_interrupt = interrupt.clone();
        let search =
            tokio::task::spawn_blocking(move || candidate.solve(difficulty, &worker_interrupt));

        let sealed = match tokio::time::timeout(self.mine_timeout, search).await {
            Ok(Ok(result)) => result.map_err(MineError::from)?,
            Ok(Err(err)) => {
                warn!("Mining worker failed: {err}");
                return Err(ServerError::Worker);
            }
            Err(_) => {
                interrupt.raise();
                warn!(
                    "Nonce search exceeded {}ms, interrupting",
                    self.mine_timeout.as_millis()
                );
                return Err(MineError::Pow(PowError::DeadlineExceeded).into());
            }
        };

        Ok(self.chain.commit_block(sealed)?.clone())
    }
}

/// Cloneable client side of a [`LedgerServer`].
#[derive(Clone)]
pub struct LedgerHandle {
    tx: Sender<Command>,
}

impl LedgerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ServerError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ServerError::Closed)?;
        response.await.map_err(|_| ServerError::Closed)?
    }

    pub async fn add_transaction(
        &self,
        from: impl Into<AccountId>,
        transfer: Transfer,
        fee: Option<u128>,
        multisig: Option<Multisig>,
    ) -> Result<Hash, ServerError> {
        let from = from.into();
        self.request(|reply| Command::AddTransaction {
            from,
            transfer,
            fee,
            multisig,
            reply,
        })
        .await
    }

    pub async fn submit_transaction(&self, tx: Transaction) -> Result<Hash, ServerError> {
        self.request(|reply| Command::SubmitTransaction { tx, reply })
            .await
    }

    pub async fn mine_block(
        &self,
        prover: impl Prover + Send + 'static,
        miner: impl Into<AccountId>,
        metadata: Option<Metadata>,
    ) -> Result<Block, ServerError> {
        let miner = miner.into();
        self.request(|reply| Command::Mine {
            prover: Box::new(prover),
            miner,
            metadata,
            reply,
        })
        .await
    }

    pub async fn balance(&self, account: impl Into<AccountId>) -> Result<u128, ServerError> {
        let account = account.into();
        self.request(|reply| Command::Balance { account, reply })
            .await
    }

    pub async fn height(&self) -> Result<u64, ServerError> {
        self.request(|reply| Command::Height { reply }).await
    }

    /// Validates the chain; `deep` adds integrity and proof-of-work checks.
    pub async fn validate(&self, deep: bool) -> Result<(), ServerError> {
        self.request(|reply| Command::Validate { deep, reply })
            .await
    }

    /// Stops the server after the commands queued before this one.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::utils::test_utils::utils::{
        MIN_FEE, REWARD, chain_with, challenge, funded_chain, key, test_config, transfer,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn add_mine_and_query() {
        let (server, handle) = LedgerServer::new(funded_chain(&[("alice", 100)]));
        let task = tokio::spawn(server.run());

        handle
            .add_transaction("alice", transfer("bob", 40), Some(1), None)
            .await
            .unwrap();
        let block = handle.mine_block(challenge(), "miner", None).await.unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(handle.balance("alice").await, Ok(59));
        assert_eq!(handle.balance("bob").await, Ok(40));
        assert_eq!(handle.balance("miner").await, Ok(REWARD + 1));
        assert_eq!(handle.height().await, Ok(2));
        assert_eq!(handle.validate(true).await, Ok(()));

        handle.shutdown().await.unwrap();
        let chain = task.await.unwrap();
        assert_eq!(chain.height(), 2);
    }

    #[tokio::test]
    async fn rejections_are_returned() {
        let (server, handle) = LedgerServer::new(funded_chain(&[("alice", 10)]));
        tokio::spawn(server.run());

        let err = handle
            .add_transaction("alice", transfer("bob", 10), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Admission(AdmissionError::InsufficientFunds { .. })
        ));

        let err = handle
            .mine_block(crate::core::block::BlockProof::from(""), "miner", None)
            .await
            .unwrap_err();
        assert_eq!(err, ServerError::Mine(MineError::MissingProof));
    }

    #[tokio::test]
    async fn concurrent_clients_are_serialized() {
        let (server, handle) = LedgerServer::new(funded_chain(&[("alice", 1_000)]));
        let task = tokio::spawn(server.run());
        let signer = Arc::new(key(7));

        let mut clients = Vec::new();
        for i in 0..8u128 {
            let handle = handle.clone();
            let signer = Arc::clone(&signer);
            clients.push(tokio::spawn(async move {
                handle
                    .add_transaction("alice", transfer("bob", i + 1), None, None)
                    .await
                    .unwrap();
                handle
                    .mine_block(signer.as_ref().clone(), format!("miner{i}"), None)
                    .await
                    .unwrap()
            }));
        }
        for client in clients {
            client.await.unwrap();
        }

        // 1 + 2 + ... + 8 moved, each paying the minimum fee.
        assert_eq!(handle.balance("bob").await, Ok(36));
        assert_eq!(handle.balance("alice").await, Ok(1_000 - 36 - 8 * MIN_FEE));
        assert_eq!(handle.height().await, Ok(9));
        assert_eq!(handle.validate(true).await, Ok(()));

        handle.shutdown().await.unwrap();
        let chain = task.await.unwrap();
        assert_eq!(chain.ledger().total_balance(), chain.total_minted());
    }

    #[tokio::test]
    async fn slow_search_times_out() {
        let config = ChainConfig {
            pow_difficulty: 64,
            mine_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let (server, handle) = LedgerServer::new(chain_with(config, &[]));
        tokio::spawn(server.run());

        let err = handle.mine_block(challenge(), "miner", None).await.unwrap_err();
        assert_eq!(
            err,
            ServerError::Mine(MineError::Pow(PowError::DeadlineExceeded))
        );
        assert_eq!(handle.height().await, Ok(1));
    }

    #[tokio::test]
    async fn handle_fails_after_shutdown() {
        let (server, handle) = LedgerServer::new(funded_chain(&[]));
        let task = tokio::spawn(server.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(handle.height().await, Err(ServerError::Closed));
    }
}
