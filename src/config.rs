//! Configuration management for the ledger core

use crate::coins::Coins;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub ledger: BlockConfig,
    #[serde(default)]
    pub staking: StakingConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Number of heights per epoch; the validator set is recomputed on multiples of it.
    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    #[serde(default = "default_max_regular_txs")]
    pub max_regular_txs_per_block: usize,
    /// Minimum fee, in the secondary denomination.
    #[serde(default = "default_min_tx_fee")]
    pub min_tx_fee: u64,
    /// Reward credited to every validator by each block's coinbase.
    #[serde(default = "default_block_reward_principal")]
    pub block_reward_principal: u64,
    #[serde(default = "default_block_reward_secondary")]
    pub block_reward_secondary: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    #[serde(default = "default_min_validator_stake")]
    pub min_validator_stake: u64,
    /// Height advances between a withdrawal and the return of the stake.
    #[serde(default = "default_return_locking_period")]
    pub return_locking_period: u64,
    #[serde(default = "default_max_validators")]
    pub max_validators: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    #[serde(default = "default_mempool_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; in-memory persistence is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            epoch_length: default_epoch_length(),
        }
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            max_regular_txs_per_block: default_max_regular_txs(),
            min_tx_fee: default_min_tx_fee(),
            block_reward_principal: default_block_reward_principal(),
            block_reward_secondary: default_block_reward_secondary(),
        }
    }
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_validator_stake: default_min_validator_stake(),
            return_locking_period: default_return_locking_period(),
            max_validators: default_max_validators(),
        }
    }
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_mempool_capacity(),
        }
    }
}

impl BlockConfig {
    pub fn block_reward(&self) -> Coins {
        Coins::new(self.block_reward_principal, self.block_reward_secondary)
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chain.chain_id.is_empty() {
            return Err(LedgerError::ConfigError(
                "chain.chain_id must be set".to_string(),
            ));
        }
        if self.chain.epoch_length == 0 {
            return Err(LedgerError::ConfigError(
                "chain.epoch_length must be at least 1".to_string(),
            ));
        }
        if self.ledger.max_regular_txs_per_block == 0 {
            return Err(LedgerError::ConfigError(
                "ledger.max_regular_txs_per_block must be at least 1".to_string(),
            ));
        }
        if self.staking.max_validators == 0 {
            return Err(LedgerError::ConfigError(
                "staking.max_validators must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads the configuration from a TOML file, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<LedgerConfig> {
    let config_str = fs::read_to_string(path.as_ref()).unwrap_or_default();
    let config: LedgerConfig = if config_str.is_empty() {
        LedgerConfig::default()
    } else {
        toml::from_str(&config_str)?
    };

    config.validate()?;
    Ok(config)
}

fn default_chain_id() -> String {
    "stakeledger-devnet".to_string()
}

fn default_epoch_length() -> u64 {
    1
}

fn default_max_regular_txs() -> usize {
    512
}

fn default_min_tx_fee() -> u64 {
    1_000
}

fn default_block_reward_principal() -> u64 {
    0
}

fn default_block_reward_secondary() -> u64 {
    48_000
}

fn default_min_validator_stake() -> u64 {
    5_000_000
}

fn default_return_locking_period() -> u64 {
    28_800
}

fn default_max_validators() -> usize {
    31
}

fn default_mempool_capacity() -> usize {
    50_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("/nonexistent/stakeledger.toml").unwrap();
        assert_eq!(config.chain.chain_id, "stakeledger-devnet");
        assert_eq!(config.staking.return_locking_period, 28_800);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [chain]
            chain_id = "testnet"
            epoch_length = 10

            [staking]
            min_validator_stake = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.chain_id, "testnet");
        assert_eq!(config.chain.epoch_length, 10);
        assert_eq!(config.staking.min_validator_stake, 100);
        assert_eq!(config.ledger.max_regular_txs_per_block, 512);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_zero_epoch_length_rejected() {
        let mut config = LedgerConfig::default();
        config.chain.epoch_length = 0;
        assert!(matches!(config.validate(), Err(LedgerError::ConfigError(_))));
    }
}
