//! Shared fixtures for unit tests.

#[cfg(test)]
pub mod utils {
    use crate::config::ChainConfig;
    use crate::core::block::BlockProof;
    use crate::core::blockchain::Blockchain;
    use crate::core::transaction::Transfer;
    use crate::crypto::key_pair::PrivateKey;
    use crate::types::account_id::AccountId;
    use std::time::Duration;

    pub const MIN_FEE: u128 = 1;
    pub const REWARD: u128 = 50;
    pub const HALVING: u64 = 10;
    pub const SUPPLY: u128 = 1_000_000;

    /// Small whole-unit parameters with a one-digit proof of work.
    pub fn test_config() -> ChainConfig {
        ChainConfig {
            decimals: 0,
            min_fee: MIN_FEE,
            initial_reward: REWARD,
            blocks_per_halving: HALVING,
            total_supply: SUPPLY,
            pow_difficulty: 1,
            pool_capacity: 1_000,
            mine_timeout: Duration::from_secs(10),
        }
    }

    /// A hash-challenge proof whose claim always satisfies its difficulty.
    pub fn challenge() -> BlockProof {
        BlockProof::HashChallenge {
            output_hash: "00f3".to_string(),
            difficulty: 2,
        }
    }

    /// Deterministic signing key; `seed` must be non-zero.
    pub fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32]).unwrap()
    }

    pub fn transfer(to: &str, amount: u128) -> Transfer {
        Transfer::Single {
            to: AccountId::from(to),
            amount,
        }
    }

    pub fn chain_with(config: ChainConfig, allocations: &[(&str, u128)]) -> Blockchain {
        let allocations = allocations
            .iter()
            .map(|(account, amount)| (AccountId::from(*account), *amount));
        Blockchain::new(config, allocations).unwrap()
    }

    pub fn funded_chain(allocations: &[(&str, u128)]) -> Blockchain {
        chain_with(test_config(), allocations)
    }
}
