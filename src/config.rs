//! Chain parameters and their environment overrides.

use crate::core::consensus::MAX_DIFFICULTY;
use crate::core::reward::RewardSchedule;
use crate::storage::txpool::TXPOOL_CAPACITY;
use crate::types::amount::{AmountError, COIN, DECIMALS, parse_units};
use std::time::Duration;
use syncledger_derive::Error;

/// Prefix of every recognized environment variable.
pub const ENV_PREFIX: &str = "SYNCLEDGER_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: {source}")]
    InvalidAmount { key: String, source: AmountError },
    #[error("{key}: expected an unsigned integer, got {value:?}")]
    InvalidNumber { key: String, value: String },
    #[error("blocks per halving must be positive")]
    ZeroHalvingInterval,
    #[error("initial reward {reward} exceeds total supply {supply}")]
    RewardAboveSupply { reward: u128, supply: u128 },
    #[error("difficulty {0} exceeds {MAX_DIFFICULTY} hex digits")]
    DifficultyTooHigh(u32),
    #[error("pool capacity must be positive")]
    ZeroPoolCapacity,
}

/// Ledger parameters. Monetary values are in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub decimals: u32,
    /// Floor applied to every transaction fee.
    pub min_fee: u128,
    pub initial_reward: u128,
    pub blocks_per_halving: u64,
    pub total_supply: u128,
    /// Required leading zero hex digits of a block hash.
    pub pow_difficulty: u32,
    pub pool_capacity: usize,
    /// Upper bound for one nonce search when mining through the server.
    pub mine_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            decimals: DECIMALS,
            min_fee: 1_000_000_000,
            initial_reward: 50 * COIN,
            blocks_per_halving: 210_000,
            total_supply: 21_000_000 * COIN,
            pow_difficulty: 2,
            pool_capacity: TXPOOL_CAPACITY,
            mine_timeout: Duration::from_secs(30),
        }
    }
}

impl ChainConfig {
    /// Defaults overridden by `SYNCLEDGER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Coin-denominated values (`INITIAL_REWARD`, `TOTAL_SUPPLY`) are decimal
    /// coin strings; `MIN_FEE` is in minor units.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = get("MIN_FEE") {
            config.min_fee = number(&key, &value)?;
        }
        if let Some((key, value)) = get("INITIAL_REWARD") {
            config.initial_reward = coins(&key, &value, config.decimals)?;
        }
        if let Some((key, value)) = get("TOTAL_SUPPLY") {
            config.total_supply = coins(&key, &value, config.decimals)?;
        }
        if let Some((key, value)) = get("BLOCKS_PER_HALVING") {
            config.blocks_per_halving = number(&key, &value)?;
        }
        if let Some((key, value)) = get("POW_DIFFICULTY") {
            config.pow_difficulty = number(&key, &value)?;
        }
        if let Some((key, value)) = get("POOL_CAPACITY") {
            config.pool_capacity = number(&key, &value)?;
        }
        if let Some((key, value)) = get("MINE_TIMEOUT_MS") {
            config.mine_timeout = Duration::from_millis(number(&key, &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocks_per_halving == 0 {
            return Err(ConfigError::ZeroHalvingInterval);
        }
        if self.initial_reward > self.total_supply {
            return Err(ConfigError::RewardAboveSupply {
                reward: self.initial_reward,
                supply: self.total_supply,
            });
        }
        if self.pow_difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::DifficultyTooHigh(self.pow_difficulty));
        }
        if self.pool_capacity == 0 {
            return Err(ConfigError::ZeroPoolCapacity);
        }
        Ok(())
    }

    pub fn reward_schedule(&self) -> RewardSchedule {
        RewardSchedule::new(self.initial_reward, self.blocks_per_halving, self.total_supply)
    }
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn coins(key: &str, value: &str, decimals: u32) -> Result<u128, ConfigError> {
    parse_units(value, decimals).map_err(|source| ConfigError::InvalidAmount {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ChainConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.initial_reward, 50 * COIN);
        assert_eq!(config.total_supply, 21_000_000 * COIN);
    }

    #[test]
    fn no_overrides_gives_defaults() {
        assert_eq!(ChainConfig::from_lookup(lookup(&[])), Ok(ChainConfig::default()));
    }

    #[test]
    fn overrides_are_applied() {
        let config = ChainConfig::from_lookup(lookup(&[
            ("SYNCLEDGER_INITIAL_REWARD", "12.5"),
            ("SYNCLEDGER_BLOCKS_PER_HALVING", "100"),
            ("SYNCLEDGER_POW_DIFFICULTY", "1"),
            ("SYNCLEDGER_MIN_FEE", "7"),
            ("SYNCLEDGER_MINE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.initial_reward, 125 * COIN / 10);
        assert_eq!(config.blocks_per_halving, 100);
        assert_eq!(config.pow_difficulty, 1);
        assert_eq!(config.min_fee, 7);
        assert_eq!(config.mine_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_are_reported() {
        let err = ChainConfig::from_lookup(lookup(&[("SYNCLEDGER_POOL_CAPACITY", "lots")]));
        assert_eq!(
            err,
            Err(ConfigError::InvalidNumber {
                key: "SYNCLEDGER_POOL_CAPACITY".into(),
                value: "lots".into(),
            })
        );

        let err = ChainConfig::from_lookup(lookup(&[("SYNCLEDGER_TOTAL_SUPPLY", "-1")]));
        assert!(matches!(err, Err(ConfigError::InvalidAmount { .. })));
    }

    #[test]
    fn validation_rules() {
        let base = ChainConfig::default();

        let config = ChainConfig { blocks_per_halving: 0, ..base.clone() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHalvingInterval));

        let config = ChainConfig { initial_reward: base.total_supply + 1, ..base.clone() };
        assert!(matches!(config.validate(), Err(ConfigError::RewardAboveSupply { .. })));

        let config = ChainConfig { pow_difficulty: 65, ..base.clone() };
        assert_eq!(config.validate(), Err(ConfigError::DifficultyTooHigh(65)));

        let config = ChainConfig { pool_capacity: 0, ..base };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPoolCapacity));
    }
}
