//! Escrowed stake records and their withdrawal state machine
//!
//! A record moves one way only: `Active` on deposit, `Withdrawing` once its source
//! asks for the stake back, and deleted (principal returned to the source) after
//! the locking period has elapsed.

use crate::coins::Coins;
use crate::crypto::Address;
use crate::error::{LedgerError, Result};
use num::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StakePurpose {
    Validator,
    Guardian,
}

/// Identity of a stake record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StakeKey {
    pub holder: Address,
    pub source: Address,
    pub purpose: StakePurpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeStatus {
    Active,
    Withdrawing { withdrawn_at: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub source: Address,
    pub holder: Address,
    pub purpose: StakePurpose,
    pub amount: Coins,
    pub withdrawn_at: Option<u64>,
}

impl StakeRecord {
    pub fn key(&self) -> StakeKey {
        StakeKey {
            holder: self.holder,
            source: self.source,
            purpose: self.purpose,
        }
    }

    pub fn status(&self) -> StakeStatus {
        match self.withdrawn_at {
            None => StakeStatus::Active,
            Some(withdrawn_at) => StakeStatus::Withdrawing { withdrawn_at },
        }
    }

    pub fn is_matured(&self, height: u64, return_locking_period: u64) -> bool {
        match self.withdrawn_at {
            Some(withdrawn_at) => height >= withdrawn_at.saturating_add(return_locking_period),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePool {
    records: BTreeMap<StakeKey, StakeRecord>,
}

impl StakePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StakeKey) -> Option<&StakeRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StakeRecord> {
        self.records.values()
    }

    pub fn check_deposit(&self, key: &StakeKey) -> Result<()> {
        match self.records.get(key) {
            Some(record) if record.withdrawn_at.is_some() => Err(LedgerError::StakeWithdrawing(
                format!(
                    "Stake from {} to {} is being withdrawn",
                    hex::encode(key.source),
                    hex::encode(key.holder)
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Creates the record or adds to an active one.
    pub fn deposit(&mut self, key: StakeKey, amount: &Coins) -> Result<()> {
        self.check_deposit(&key)?;
        let record = self.records.entry(key).or_insert_with(|| StakeRecord {
            source: key.source,
            holder: key.holder,
            purpose: key.purpose,
            amount: Coins::zero(),
            withdrawn_at: None,
        });
        record.amount = record.amount.plus(amount);
        Ok(())
    }

    pub fn check_withdraw(&self, key: &StakeKey) -> Result<&StakeRecord> {
        match self.records.get(key) {
            Some(record) if record.withdrawn_at.is_none() => Ok(record),
            Some(_) => Err(LedgerError::StakeNotFound(format!(
                "Stake from {} to {} is already withdrawing",
                hex::encode(key.source),
                hex::encode(key.holder)
            ))),
            None => Err(LedgerError::StakeNotFound(format!(
                "No {:?} stake from {} to {}",
                key.purpose,
                hex::encode(key.source),
                hex::encode(key.holder)
            ))),
        }
    }

    pub fn withdraw(&mut self, key: &StakeKey, height: u64) -> Result<()> {
        self.check_withdraw(key)?;
        if let Some(record) = self.records.get_mut(key) {
            record.withdrawn_at = Some(height);
        }
        Ok(())
    }

    /// Removes every withdrawing record whose locking period has elapsed at `height`.
    pub fn take_matured(&mut self, height: u64, return_locking_period: u64) -> Vec<StakeRecord> {
        let matured: Vec<StakeKey> = self
            .records
            .values()
            .filter(|r| r.is_matured(height, return_locking_period))
            .map(StakeRecord::key)
            .collect();
        matured
            .iter()
            .filter_map(|key| self.records.remove(key))
            .collect()
    }

    /// Total active stake per holder for `purpose`.
    pub fn active_stake_by_holder(&self, purpose: StakePurpose) -> BTreeMap<Address, BigInt> {
        let mut totals: BTreeMap<Address, BigInt> = BTreeMap::new();
        for record in self.records.values() {
            if record.purpose == purpose && record.withdrawn_at.is_none() {
                *totals.entry(record.holder).or_default() += &record.amount.principal;
            }
        }
        totals
    }
}
