//! Validator set derivation from stake records and lookup by block ancestry

use crate::blocktree::{BlockStatus, ChainView};
use crate::crypto::{Address, Hash};
use crate::error::{LedgerError, Result};
use crate::persistence::Persistence;
use crate::stake::{StakePool, StakePurpose};
use lru::LruCache;
use num::BigInt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

const VALIDATOR_SET_CACHE_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub stake: BigInt,
}

/// Validators ordered by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    pub fn new(mut validators: Vec<Validator>) -> Self {
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        validators.dedup_by(|a, b| a.address == b.address);
        ValidatorSet { validators }
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    pub fn get(&self, address: &Address) -> Option<&Validator> {
        self.validators
            .binary_search_by(|v| v.address.cmp(address))
            .ok()
            .map(|idx| &self.validators[idx])
    }

    pub fn total_stake(&self) -> BigInt {
        self.validators.iter().map(|v| &v.stake).sum()
    }
}

/// Selects every holder whose active validator stake reaches `min_stake`, keeping the
/// `max_validators` largest (address breaks stake ties).
pub fn select_validators(stakes: &StakePool, min_stake: &BigInt, max_validators: usize) -> ValidatorSet {
    let mut candidates: Vec<Validator> = stakes
        .active_stake_by_holder(StakePurpose::Validator)
        .into_iter()
        .filter(|(_, stake)| stake >= min_stake)
        .map(|(address, stake)| Validator { address, stake })
        .collect();

    candidates.sort_by(|a, b| b.stake.cmp(&a.stake).then_with(|| a.address.cmp(&b.address)));
    candidates.truncate(max_validators);
    ValidatorSet::new(candidates)
}

/// Answers which validator set governs a block.
///
/// The set comes from the post-state of the nearest directly finalized block at or
/// above the queried one, so blocks proposed under an older set stay valid under it.
pub struct ValidatorManager {
    chain: Arc<dyn ChainView>,
    persistence: Arc<dyn Persistence>,
    cache: Mutex<LruCache<Hash, ValidatorSet>>,
}

impl ValidatorManager {
    pub fn new(chain: Arc<dyn ChainView>, persistence: Arc<dyn Persistence>) -> Self {
        let capacity = NonZeroUsize::new(VALIDATOR_SET_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        ValidatorManager {
            chain,
            persistence,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn validator_set(&self, block_hash: &Hash) -> Result<ValidatorSet> {
        let finalized = self.nearest_directly_finalized(block_hash)?;
        if let Some(set) = self.cache.lock().get(&finalized.0) {
            return Ok(set.clone());
        }

        let snapshot = self.persistence.load_snapshot(&finalized.1)?.ok_or_else(|| {
            LedgerError::DatabaseError(format!(
                "No state snapshot for root {}",
                hex::encode(finalized.1)
            ))
        })?;
        let set = snapshot.validator_set().clone();
        debug!(
            block = %hex::encode(block_hash),
            finalized = %hex::encode(finalized.0),
            validators = set.len(),
            "Resolved validator set"
        );
        self.cache.lock().put(finalized.0, set.clone());
        Ok(set)
    }

    /// Returns (block hash, state hash) of the closest directly finalized ancestor-or-self.
    fn nearest_directly_finalized(&self, block_hash: &Hash) -> Result<(Hash, Hash)> {
        let mut current = *block_hash;
        loop {
            let block = self.chain.find_block(&current).ok_or_else(|| {
                LedgerError::BlockNotFound(hex::encode(current))
            })?;
            if block.status == BlockStatus::DirectlyFinalized {
                return Ok((current, block.state_hash));
            }
            if block.height == 0 {
                return Err(LedgerError::BlockNotFound(format!(
                    "No directly finalized ancestor of {}",
                    hex::encode(block_hash)
                )));
            }
            current = block.parent;
        }
    }
}
