use crate::coins::Coins;
use crate::config::LedgerConfig;
use crate::crypto::{sha256, Address, Hash};
use crate::error::{LedgerError, Result};
use crate::stake::{StakePool, StakeRecord};
use crate::state::account::Account;
use crate::validator::{select_validators, ValidatorSet};
use num::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Complete ledger state at one height.
///
/// Every collection is ordered, so the bincode encoding, and therefore
/// [`StateSnapshot::root_hash`], is a deterministic function of the contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    height: u64,
    accounts: BTreeMap<Address, Account>,
    stakes: StakePool,
    validator_set: ValidatorSet,
}

/// Effects of a single height advance.
#[derive(Debug, Clone, Default)]
pub struct HeightAdvance {
    pub height: u64,
    pub returned_stakes: Vec<StakeRecord>,
    pub validator_set_recomputed: bool,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn get_account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// The stored account, or an empty one if the address was never touched.
    pub fn account(&self, address: &Address) -> Account {
        self.accounts
            .get(address)
            .cloned()
            .unwrap_or_else(|| Account::empty(*address))
    }

    pub fn set_account(&mut self, account: Account) {
        self.accounts.insert(account.address, account);
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn credit(&mut self, address: &Address, coins: &Coins) {
        let account = self
            .accounts
            .entry(*address)
            .or_insert_with(|| Account::empty(*address));
        account.balance = account.balance.plus(coins);
    }

    /// Debits `coins`; leaves the account untouched if either denomination would go negative.
    pub fn debit(&mut self, address: &Address, coins: &Coins) -> Result<()> {
        let mut account = self.account(address);
        let remaining = account.balance.minus(coins);
        if !remaining.is_valid() {
            return Err(LedgerError::InsufficientFund(format!(
                "{} holds {} but needs {}",
                hex::encode(address),
                account.balance,
                coins
            )));
        }
        account.balance = remaining;
        self.set_account(account);
        Ok(())
    }

    pub fn stakes(&self) -> &StakePool {
        &self.stakes
    }

    pub fn stakes_mut(&mut self) -> &mut StakePool {
        &mut self.stakes
    }

    pub fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    pub fn recompute_validator_set(&mut self, config: &LedgerConfig) {
        let min_stake = BigInt::from(config.staking.min_validator_stake);
        self.validator_set =
            select_validators(&self.stakes, &min_stake, config.staking.max_validators);
    }

    /// Total of every balance plus every escrowed stake.
    pub fn total_supply(&self) -> Coins {
        let balances = Coins::sum(self.accounts.values().map(|a| &a.balance));
        let escrowed = Coins::sum(self.stakes.iter().map(|r| &r.amount));
        balances.plus(&escrowed)
    }

    /// Moves to the next height: returns matured stakes to their sources and, on an
    /// epoch boundary, recomputes the validator set.
    pub fn advance_height(&mut self, config: &LedgerConfig) -> HeightAdvance {
        self.height += 1;

        let returned = self
            .stakes
            .take_matured(self.height, config.staking.return_locking_period);
        for record in &returned {
            self.credit(&record.source, &Coins::principal_only(record.amount.principal.clone()));
            info!(
                source = %hex::encode(record.source),
                holder = %hex::encode(record.holder),
                amount = %record.amount.principal,
                height = self.height,
                "Returned matured stake"
            );
        }

        let recompute = self.height % config.chain.epoch_length == 0;
        if recompute {
            let before = self.validator_set.len();
            self.recompute_validator_set(config);
            if before != self.validator_set.len() {
                info!(
                    height = self.height,
                    before,
                    after = self.validator_set.len(),
                    "Validator set changed"
                );
            }
        }

        HeightAdvance {
            height: self.height,
            returned_stakes: returned,
            validator_set_recomputed: recompute,
        }
    }

    pub fn root_hash(&self) -> Result<Hash> {
        let encoded = bincode::serialize(self)
            .map_err(|e| LedgerError::DatabaseError(format!("Failed to encode state: {}", e)))?;
        Ok(sha256(&encoded))
    }
}
