//! Ledger orchestration: admission, block proposal and block application

use crate::blocktree::{Block, ChainView};
use crate::coins::Coins;
use crate::config::LedgerConfig;
use crate::crypto::{Address, Hash, KeyPair};
use crate::error::{LedgerError, Result};
use crate::executor::{expected_coinbase_outputs, BlockContext, Executor};
use crate::mempool::Mempool;
use crate::persistence::Persistence;
use crate::state::{Account, LedgerState, StateSnapshot};
use crate::transaction::{raw_tx_hash, CoinbaseTx, Transaction, TxInput};
use crate::validator::{ValidatorManager, ValidatorSet};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A block's transactions replayed on top of a base state.
struct ExecutedBlock {
    state: StateSnapshot,
    tx_hashes: Vec<Hash>,
    returned_stakes: usize,
}

/// One ledger instance: its state views, mempool and validator lookup, all owned
/// here and handed in at construction.
pub struct Ledger {
    config: LedgerConfig,
    identity: KeyPair,
    executor: Executor,
    state: LedgerState,
    mempool: Mempool,
    validators: ValidatorManager,
    chain: Arc<dyn ChainView>,
    /// Block whose post-state is the committed state; the next block's parent.
    tip: RwLock<Hash>,
    persistence: Arc<dyn Persistence>,
}

impl Ledger {
    /// Starts a ledger from a genesis state, recording it as the latest committed root.
    /// The genesis block for that state must already be in `chain`.
    pub fn new(
        config: LedgerConfig,
        identity: KeyPair,
        genesis: StateSnapshot,
        persistence: Arc<dyn Persistence>,
        chain: Arc<dyn ChainView>,
    ) -> Result<Self> {
        config.validate()?;
        let root = genesis.root_hash()?;
        let tip = Block::genesis(&config.chain.chain_id, root).hash()?;
        if chain.find_block(&tip).is_none() {
            return Err(LedgerError::BlockNotFound(format!(
                "Genesis block {} is not in the block tree",
                hex::encode(tip)
            )));
        }

        persistence.save_snapshot(&genesis)?;
        persistence.save_latest_root(&root)?;
        persistence.save_latest_block(&tip)?;
        info!(
            root = %hex::encode(root),
            block = %hex::encode(tip),
            height = genesis.height(),
            validators = genesis.validator_set().len(),
            "Initialized ledger from genesis"
        );
        Ok(Self::assemble(config, identity, genesis, tip, persistence, chain))
    }

    /// Restores the latest committed state from `persistence`.
    pub fn open(
        config: LedgerConfig,
        identity: KeyPair,
        persistence: Arc<dyn Persistence>,
        chain: Arc<dyn ChainView>,
    ) -> Result<Self> {
        config.validate()?;
        let root = persistence
            .load_latest_root()?
            .ok_or_else(|| LedgerError::DatabaseError("No committed state to open".to_string()))?;
        let snapshot = persistence.load_snapshot(&root)?.ok_or_else(|| {
            LedgerError::DatabaseError(format!("Missing snapshot for root {}", hex::encode(root)))
        })?;
        let tip = persistence
            .load_latest_block()?
            .ok_or_else(|| LedgerError::DatabaseError("No committed block to open".to_string()))?;
        info!(
            root = %hex::encode(root),
            block = %hex::encode(tip),
            height = snapshot.height(),
            "Restored committed state"
        );
        Ok(Self::assemble(config, identity, snapshot, tip, persistence, chain))
    }

    fn assemble(
        config: LedgerConfig,
        identity: KeyPair,
        snapshot: StateSnapshot,
        tip: Hash,
        persistence: Arc<dyn Persistence>,
        chain: Arc<dyn ChainView>,
    ) -> Self {
        Ledger {
            executor: Executor::new(&config),
            mempool: Mempool::new(config.mempool.capacity),
            validators: ValidatorManager::new(Arc::clone(&chain), Arc::clone(&persistence)),
            chain,
            tip: RwLock::new(tip),
            state: LedgerState::new(snapshot),
            config,
            identity,
            persistence,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Address of this node's consensus identity.
    pub fn address(&self) -> Address {
        self.identity.address()
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn committed(&self) -> Arc<StateSnapshot> {
        self.state.committed()
    }

    pub fn height(&self) -> u64 {
        self.state.committed().height()
    }

    pub fn committed_account(&self, address: &Address) -> Account {
        self.state.committed().account(address)
    }

    pub fn delivered_account(&self, address: &Address) -> Account {
        self.state.lock_delivered().account(address)
    }

    pub fn committed_root(&self) -> Result<Hash> {
        self.state.committed().root_hash()
    }

    /// Validator set governing the block `block_hash`.
    pub fn validator_set(&self, block_hash: &Hash) -> Result<ValidatorSet> {
        self.validators.validator_set(block_hash)
    }

    pub fn tip(&self) -> Hash {
        *self.tip.read()
    }

    /// Records `block_hash` as the block carrying the last applied transactions.
    ///
    /// The block must extend the current tip and hold the committed height and root.
    /// Call it once the block is in the block tree, before proposing or applying the next one.
    pub fn advance_tip(&self, block_hash: &Hash) -> Result<()> {
        let block = self
            .chain
            .find_block(block_hash)
            .ok_or_else(|| LedgerError::BlockNotFound(hex::encode(block_hash)))?;
        let committed = self.state.committed();
        let root = committed.root_hash()?;

        let mut tip = self.tip.write();
        if block.parent != *tip || block.height != committed.height() {
            return Err(LedgerError::InvalidTx(format!(
                "Block {} at height {} does not extend tip {} at height {}",
                hex::encode(block_hash),
                block.height,
                hex::encode(*tip),
                committed.height()
            )));
        }
        if block.state_hash != root {
            return Err(LedgerError::StateMismatch(format!(
                "Block {} carries root {}, committed root is {}",
                hex::encode(block_hash),
                hex::encode(block.state_hash),
                hex::encode(root)
            )));
        }

        self.persistence.save_latest_block(block_hash)?;
        *tip = *block_hash;
        debug!(block = %hex::encode(block_hash), height = block.height, "Advanced tip");
        Ok(())
    }

    /// Validator set governing the block at `height`, resolved from the tip's ancestry.
    fn next_block_validators(&self, height: u64) -> Result<ValidatorSet> {
        let tip = self.tip();
        let block = self
            .chain
            .find_block(&tip)
            .ok_or_else(|| LedgerError::BlockNotFound(hex::encode(tip)))?;
        if block.height + 1 != height {
            return Err(LedgerError::BlockNotFound(format!(
                "No block recorded at height {}; tip {} is at height {}",
                height.saturating_sub(1),
                hex::encode(tip),
                block.height
            )));
        }
        self.validators.validator_set(&tip)
    }

    /// Validates a raw client transaction against committed state without mutating anything.
    pub fn screen_tx(&self, raw: &[u8]) -> Result<Transaction> {
        let tx = Transaction::from_bytes(raw)?;
        if !tx.is_client_submittable() {
            return Err(LedgerError::UnauthorizedTx(format!(
                "{} transactions are not accepted from clients",
                tx.kind()
            )));
        }

        let committed = self.state.committed();
        let ctx = BlockContext::new(committed.height() + 1, Coins::zero());
        if let Err(e) = self.executor.check_tx(&committed, &tx, &ctx) {
            debug!(kind = tx.kind(), error = %e, "Screening rejected transaction");
            return Err(e);
        }
        Ok(tx)
    }

    /// Screens a raw transaction and queues it for proposal.
    pub fn submit_tx(&self, raw: &[u8]) -> Result<Hash> {
        self.screen_tx(raw)?;
        self.mempool.insert_transaction(raw)
    }

    /// Builds the transaction list for the next block: a signed coinbase followed by
    /// the highest-fee pending transactions that still apply to committed state.
    pub fn propose_block_txs(&self) -> Result<(Address, Vec<Vec<u8>>)> {
        let committed = self.state.committed();
        let proposer = self.identity.address();
        let height = committed.height() + 1;
        let validators = self.next_block_validators(height)?;
        if !validators.contains(&proposer) {
            return Err(LedgerError::UnauthorizedTx(format!(
                "{} is not in the validator set governing height {}",
                hex::encode(proposer),
                height
            )));
        }

        let ctx = BlockContext::new(height, Coins::zero());
        let candidates = self.mempool.reap(self.config.ledger.max_regular_txs_per_block);
        let reaped = candidates.len();

        let mut working = (*committed).clone();
        let mut fees = Coins::zero();
        let mut selected = Vec::with_capacity(reaped);
        for raw in candidates {
            let applied = Transaction::from_bytes(&raw).and_then(|tx| {
                self.executor.execute_tx(&mut working, &tx, &ctx)?;
                Ok(tx)
            });
            match applied {
                Ok(tx) => {
                    fees = fees.plus(&tx.fee());
                    selected.push(raw);
                }
                Err(e) => {
                    warn!(tx = %hex::encode(raw_tx_hash(&raw)), error = %e, "Dropping stale transaction from proposal");
                }
            }
        }

        let coinbase = self.build_coinbase(&validators, height, &fees)?;
        let mut txs = Vec::with_capacity(selected.len() + 1);
        txs.push(coinbase.to_bytes()?);
        txs.extend(selected);

        info!(
            height,
            reaped,
            included = txs.len() - 1,
            fees = %fees,
            "Proposed block transactions"
        );
        Ok((proposer, txs))
    }

    fn build_coinbase(&self, validators: &ValidatorSet, height: u64, fees: &Coins) -> Result<Transaction> {
        let proposer = self.identity.address();
        let outputs = expected_coinbase_outputs(validators, &proposer, self.executor.block_reward(), fees);
        let mut coinbase = Transaction::Coinbase(CoinbaseTx {
            proposer: TxInput::new(proposer, Coins::zero(), 0),
            outputs,
            block_height: height,
        });
        coinbase.sign_with(&self.config.chain.chain_id, &self.identity)?;
        Ok(coinbase)
    }

    /// Applies a block atomically and commits it if the resulting root is `expected_state_hash`.
    pub fn apply_block_txs(&self, raw_txs: &[Vec<u8>], expected_state_hash: &Hash) -> Result<Hash> {
        let mut delivered = self.state.lock_delivered();
        let height = delivered.height() + 1;

        let executed = match self.execute_block(&delivered, raw_txs) {
            Ok(executed) => executed,
            Err(e) => {
                warn!(height, txs = raw_txs.len(), error = %e, "Rejected block");
                return Err(e);
            }
        };

        let root = executed.state.root_hash()?;
        if root != *expected_state_hash {
            warn!(
                height,
                expected = %hex::encode(expected_state_hash),
                actual = %hex::encode(root),
                "State hash mismatch"
            );
            return Err(LedgerError::StateMismatch(format!(
                "Expected {}, computed {}",
                hex::encode(expected_state_hash),
                hex::encode(root)
            )));
        }

        self.persistence.save_snapshot(&executed.state)?;
        self.persistence.save_latest_root(&root)?;
        self.state.commit(&mut delivered, executed.state);
        drop(delivered);

        self.mempool.remove_committed(&executed.tx_hashes);
        info!(
            height,
            txs = raw_txs.len(),
            returned_stakes = executed.returned_stakes,
            root = %hex::encode(root),
            "Committed block"
        );
        Ok(root)
    }

    /// The state hash `raw_txs` would produce on top of the current state; no view changes.
    pub fn project_block_state_hash(&self, raw_txs: &[Vec<u8>]) -> Result<Hash> {
        let delivered = self.state.lock_delivered();
        self.execute_block(&delivered, raw_txs)?.state.root_hash()
    }

    fn execute_block(&self, base: &StateSnapshot, raw_txs: &[Vec<u8>]) -> Result<ExecutedBlock> {
        let mut state = base.clone();
        let height = state.height() + 1;
        let txs = raw_txs
            .iter()
            .map(|raw| Transaction::from_bytes(raw))
            .collect::<Result<Vec<_>>>()?;

        if let Some((first, rest)) = txs.split_first() {
            if !matches!(first, Transaction::Coinbase(_)) {
                return Err(LedgerError::InvalidTx(
                    "Block must start with a coinbase transaction".to_string(),
                ));
            }
            if rest.iter().any(|tx| !tx.is_client_submittable()) {
                return Err(LedgerError::InvalidTx(
                    "Coinbase is only allowed as the first transaction".to_string(),
                ));
            }
            self.executor.verify_proposer_signature(first)?;

            let fees = rest.iter().fold(Coins::zero(), |acc, tx| acc.plus(&tx.fee()));
            let validators = self.next_block_validators(height)?;
            let ctx = BlockContext::new(height, fees).with_validators(validators);
            for (index, tx) in txs.iter().enumerate() {
                self.executor.execute_tx(&mut state, tx, &ctx).map_err(|e| {
                    debug!(index, kind = tx.kind(), error = %e, "Transaction failed in block");
                    e
                })?;
            }
        }

        let advance = state.advance_height(&self.config);
        Ok(ExecutedBlock {
            state,
            tx_hashes: raw_txs.iter().map(|raw| raw_tx_hash(raw)).collect(),
            returned_stakes: advance.returned_stakes.len(),
        })
    }
}
