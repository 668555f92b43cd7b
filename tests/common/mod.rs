//! Shared fixture for ledger integration tests
#![allow(dead_code)]

use stakeledger::blocktree::{Block, BlockStore};
use stakeledger::coins::Coins;
use stakeledger::config::LedgerConfig;
use stakeledger::crypto::{Address, Hash, KeyPair};
use stakeledger::executor::expected_coinbase_outputs;
use stakeledger::persistence::{InMemoryPersistence, Persistence};
use stakeledger::stake::{StakeKey, StakePurpose};
use stakeledger::state::StateSnapshot;
use stakeledger::transaction::{
    CoinbaseTx, DepositStakeTx, SendTx, Transaction, TxInput, TxOutput, WithdrawStakeTx,
};
use stakeledger::validator::ValidatorSet;
use stakeledger::{Ledger, Result};
use std::sync::Arc;

pub const CHAIN_ID: &str = "test_chain_001";
pub const MIN_STAKE: u64 = 1_000;
pub const FEE: u64 = 1_000;
pub const LOCKING_PERIOD: u64 = 20;
pub const NUM_ACCOUNTS: usize = 6;
pub const GENESIS_VALIDATORS: usize = 4;

pub const SOURCE_PRINCIPAL: u64 = 100 * MIN_STAKE;
pub const SOURCE_SECONDARY: u64 = 1_000_000;

pub fn test_config() -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.chain.chain_id = CHAIN_ID.to_string();
    config.chain.epoch_length = 1;
    config.ledger.max_regular_txs_per_block = 16;
    config.ledger.min_tx_fee = FEE;
    config.ledger.block_reward_principal = 0;
    config.ledger.block_reward_secondary = 500;
    config.staking.min_validator_stake = MIN_STAKE;
    config.staking.return_locking_period = LOCKING_PERIOD;
    config
}

/// A ledger on top of an in-memory block tree, driven one block at a time.
pub struct Sim {
    pub config: LedgerConfig,
    pub ledger: Ledger,
    pub chain: Arc<BlockStore>,
    pub persistence: Arc<InMemoryPersistence>,
    pub proposer: KeyPair,
    pub sources: Vec<KeyPair>,
    pub validators: Vec<KeyPair>,
    pub genesis_hash: Hash,
    pub tip: Hash,
}

/// Six funded source accounts; the first four each stake 5x the minimum to their
/// own validator holder.
pub fn genesis_snapshot(config: &LedgerConfig, sources: &[KeyPair], validators: &[KeyPair]) -> StateSnapshot {
    let mut snapshot = StateSnapshot::new();
    for source in sources {
        snapshot.credit(&source.address(), &Coins::new(SOURCE_PRINCIPAL, SOURCE_SECONDARY));
    }
    for i in 0..GENESIS_VALIDATORS {
        let key = StakeKey {
            holder: validators[i].address(),
            source: sources[i].address(),
            purpose: StakePurpose::Validator,
        };
        snapshot
            .stakes_mut()
            .deposit(key, &Coins::principal_only(5 * MIN_STAKE))
            .unwrap();
    }
    snapshot.recompute_validator_set(config);
    snapshot
}

pub fn sim_with_config(config: LedgerConfig, proposer_index: usize) -> Sim {
    let sources: Vec<KeyPair> = (0..NUM_ACCOUNTS).map(|_| KeyPair::generate()).collect();
    let validators: Vec<KeyPair> = (0..NUM_ACCOUNTS).map(|_| KeyPair::generate()).collect();
    let genesis = genesis_snapshot(&config, &sources, &validators);

    let chain = Arc::new(BlockStore::new());
    let genesis_hash = chain
        .add_block(Block::genesis(CHAIN_ID, genesis.root_hash().unwrap()))
        .unwrap();

    let persistence = Arc::new(InMemoryPersistence::new());
    let proposer = validators[proposer_index].clone();
    let ledger = Ledger::new(
        config.clone(),
        proposer.clone(),
        genesis,
        persistence.clone(),
        chain.clone(),
    )
    .unwrap();

    Sim {
        config,
        ledger,
        chain,
        persistence,
        proposer,
        sources,
        validators,
        genesis_hash,
        tip: genesis_hash,
    }
}

pub fn sim() -> Sim {
    sim_with_config(test_config(), 1)
}

impl Sim {
    /// Applies `raw_txs` as the next block on the tip and records the block header.
    pub fn commit_block(&mut self, raw_txs: &[Vec<u8>]) -> Result<Hash> {
        let state_hash = self.ledger.project_block_state_hash(raw_txs)?;
        self.ledger.apply_block_txs(raw_txs, &state_hash)?;
        let height = self.ledger.height();
        let block = Block::new(CHAIN_ID, height, height, self.tip, state_hash);
        self.tip = self.chain.add_block(block)?;
        self.ledger.advance_tip(&self.tip)?;
        Ok(self.tip)
    }

    pub fn propose_and_commit(&mut self) -> Result<Hash> {
        let (_, txs) = self.ledger.propose_block_txs()?;
        self.commit_block(&txs)
    }

    /// Coinbase for the next block signed by the sim proposer.
    pub fn coinbase(&self, fees: u64) -> Vec<u8> {
        let validators = self.ledger.validator_set(&self.tip).unwrap();
        self.coinbase_for(&validators, fees)
    }

    /// Coinbase paying `validators` instead of the set governing the next block.
    pub fn coinbase_for(&self, validators: &ValidatorSet, fees: u64) -> Vec<u8> {
        let committed = self.ledger.committed();
        let outputs = expected_coinbase_outputs(
            validators,
            &self.proposer.address(),
            &self.config.ledger.block_reward(),
            &Coins::secondary_only(fees),
        );
        let mut tx = Transaction::Coinbase(CoinbaseTx {
            proposer: TxInput::new(self.proposer.address(), Coins::zero(), 0),
            outputs,
            block_height: committed.height() + 1,
        });
        tx.sign_with(CHAIN_ID, &self.proposer).unwrap();
        tx.to_bytes().unwrap()
    }

    pub fn next_sequence(&self, address: &Address) -> u64 {
        self.ledger.committed_account(address).sequence + 1
    }

    pub fn persistence(&self) -> Arc<dyn Persistence> {
        self.persistence.clone()
    }
}

pub fn signed_send(from: &KeyPair, sequence: u64, to: Address, amount: u64, fee: u64) -> Vec<u8> {
    let mut tx = Transaction::Send(SendTx {
        fee: Coins::secondary_only(fee),
        inputs: vec![TxInput::new(from.address(), Coins::new(amount, fee), sequence)],
        outputs: vec![TxOutput::new(to, Coins::principal_only(amount))],
    });
    tx.sign_with(CHAIN_ID, from).unwrap();
    tx.to_bytes().unwrap()
}

pub fn signed_deposit(source: &KeyPair, sequence: u64, holder: Address, amount: u64) -> Vec<u8> {
    let mut tx = Transaction::DepositStake(DepositStakeTx {
        fee: Coins::secondary_only(FEE),
        source: TxInput::new(source.address(), Coins::principal_only(amount), sequence),
        holder: TxOutput::new(holder, Coins::zero()),
        purpose: StakePurpose::Validator,
    });
    tx.sign_with(CHAIN_ID, source).unwrap();
    tx.to_bytes().unwrap()
}

pub fn signed_withdraw(source: &KeyPair, sequence: u64, holder: Address) -> Vec<u8> {
    let mut tx = Transaction::WithdrawStake(WithdrawStakeTx {
        fee: Coins::secondary_only(FEE),
        source: TxInput::new(source.address(), Coins::zero(), sequence),
        holder: TxOutput::new(holder, Coins::zero()),
        purpose: StakePurpose::Validator,
    });
    tx.sign_with(CHAIN_ID, source).unwrap();
    tx.to_bytes().unwrap()
}
