//! Ledger benchmark binary.
//!
//! Measures Merkle reduction, nonce search and admission + mining throughput.
//! Run with: `cargo run --release --bin bench`

use std::time::{Duration, Instant};

use syncledger::config::ChainConfig;
use syncledger::core::block::{Block, BlockProof, Metadata};
use syncledger::core::blockchain::Blockchain;
use syncledger::core::consensus::{Interrupt, search};
use syncledger::core::transaction::{BatchEntry, Transaction, Transfer};
use syncledger::types::account_id::AccountId;
use syncledger::types::hash::Hash;
use syncledger::types::merkle_tree::MerkleTree;
use syncledger::utils::log::set_level;

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
    /// Units of work done by the last run (hashes, transactions, ...).
    work: u64,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        self.total / self.iterations as u32
    }

    fn print(&self) {
        let ns_per_op = self.avg().as_nanos();
        let ns_per_unit = if self.work > 0 {
            format!("{:>10.1}", ns_per_op as f64 / self.work as f64)
        } else {
            "         -".to_string()
        };
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter {:>10} units  {} ns/unit",
            self.name,
            self.iterations,
            ns_per_op as f64 / 1000.0,
            self.work,
            ns_per_unit,
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(name: &'static str, min_duration: Duration, mut f: F) -> BenchResult
where
    F: FnMut() -> u64,
{
    // Warmup
    for _ in 0..5 {
        f();
    }

    let mut iterations = 0u64;
    let mut last_work = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        last_work = f();
        iterations += 1;
    }

    BenchResult {
        name,
        iterations,
        total: start.elapsed(),
        work: last_work,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn transactions(count: usize) -> Vec<Transaction> {
    (0..count)
        .map(|i| {
            Transaction::builder(
                "alice",
                Transfer::Single {
                    to: AccountId::from(format!("account{i}")),
                    amount: i as u128 + 1,
                },
            )
            .timestamp(1_700_000_000)
            .salt(i as u64)
            .build()
        })
        .collect()
}

fn bench_config() -> ChainConfig {
    ChainConfig {
        decimals: 0,
        min_fee: 1,
        initial_reward: 50,
        blocks_per_halving: 1_000_000,
        total_supply: u64::MAX as u128,
        pow_difficulty: 2,
        ..ChainConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    set_level(None);
    let min = Duration::from_secs(2);

    println!("Ledger Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14} {:>16}  {:>10}",
        "benchmark", "iters", "avg time", "units/run", "ns/unit"
    );
    println!("  {}", "-".repeat(86));

    // 1. Merkle roots
    for &(name, count) in &[
        ("merkle_root(16)", 16usize),
        ("merkle_root(1K)", 1_000),
        ("merkle_root(10K)", 10_000),
    ] {
        let txs = transactions(count);
        bench(name, min, || {
            std::hint::black_box(MerkleTree::from_transactions(&txs));
            count as u64
        })
        .print();
    }

    // 2. Nonce search; the timestamp varies so every run searches afresh
    for &(name, difficulty) in &[("nonce_search(d=2)", 2u32), ("nonce_search(d=3)", 3)] {
        let txs = transactions(32);
        let mut timestamp = 1_700_000_000u64;
        bench(name, min, || {
            timestamp += 1;
            let block = Block::new(
                1,
                Hash::digest(b"parent"),
                BlockProof::from("bench"),
                txs.clone(),
                Metadata::new(),
                0,
                timestamp,
            );
            let (nonce, _) = search(&block.header_prefix(), difficulty, &Interrupt::never())
                .expect("search");
            nonce + 1
        })
        .print();
    }

    // 3. Admission + mining, one block of 100 transfers per run
    let mut chain = Blockchain::new(
        bench_config(),
        [(AccountId::from("alice"), u64::MAX as u128 / 2)],
    )
    .expect("chain");
    let proof = BlockProof::HashChallenge {
        output_hash: "00".to_string(),
        difficulty: 2,
    };
    let miner = AccountId::from("miner");
    bench("admit_and_mine(100)", min, || {
        for i in 0..100u128 {
            chain
                .add_transaction(
                    "alice",
                    Transfer::Single {
                        to: AccountId::from("bob"),
                        amount: i + 1,
                    },
                    None,
                    None,
                )
                .expect("admit");
        }
        let block = chain.mine_block(&proof, &miner, None).expect("mine");
        block.transactions.len() as u64
    })
    .print();

    // 4. Batch payouts, 50 recipients per transaction
    bench("admit_batch(50x20)", min, || {
        for _ in 0..20 {
            let entries = (0..50)
                .map(|i| BatchEntry::new(format!("payee{i}"), 1))
                .collect();
            chain
                .add_transaction("alice", Transfer::Batch(entries), None, None)
                .expect("admit");
        }
        chain.mine_block(&proof, &miner, None).expect("mine");
        1_000
    })
    .print();

    println!("\n  final height: {}", chain.height());
}
