//! Genesis document: initial balances and stakes

use crate::coins::Coins;
use crate::config::LedgerConfig;
use crate::crypto::address_from_hex;
use crate::error::{LedgerError, Result};
use crate::stake::{StakeKey, StakePurpose};
use crate::state::StateSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Hex-encoded 32-byte address.
    pub address: String,
    #[serde(default)]
    pub principal: u64,
    #[serde(default)]
    pub secondary: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisStake {
    pub source: String,
    pub holder: String,
    /// Principal escrowed at genesis.
    pub amount: u64,
    #[serde(default = "default_purpose")]
    pub purpose: StakePurpose,
}

fn default_purpose() -> StakePurpose {
    StakePurpose::Validator
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub stakes: Vec<GenesisStake>,
}

impl Genesis {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|e| {
            LedgerError::ConfigError(format!(
                "Failed to read genesis {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Builds the height-0 state, with the validator set already derived from the stakes.
    pub fn into_snapshot(&self, config: &LedgerConfig) -> Result<StateSnapshot> {
        let mut snapshot = StateSnapshot::new();
        for account in &self.accounts {
            let address = address_from_hex(&account.address)?;
            snapshot.credit(&address, &Coins::new(account.principal, account.secondary));
        }

        for stake in &self.stakes {
            if stake.amount == 0 {
                return Err(LedgerError::ConfigError(format!(
                    "Genesis stake from {} has zero amount",
                    stake.source
                )));
            }
            let key = StakeKey {
                holder: address_from_hex(&stake.holder)?,
                source: address_from_hex(&stake.source)?,
                purpose: stake.purpose,
            };
            snapshot
                .stakes_mut()
                .deposit(key, &Coins::principal_only(stake.amount))?;
        }

        snapshot.recompute_validator_set(config);
        Ok(snapshot)
    }
}
