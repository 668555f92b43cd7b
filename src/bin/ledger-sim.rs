#![forbid(unsafe_code)]
//! Local single-proposer chain driver for StakeLedger

use clap::Parser;
use rand::Rng;
use stakeledger::blocktree::{Block, BlockStore};
use stakeledger::coins::Coins;
use stakeledger::config::{load_config, LedgerConfig};
use stakeledger::crypto::KeyPair;
use stakeledger::genesis::Genesis;
use stakeledger::persistence::{Database, InMemoryPersistence, Persistence};
use stakeledger::stake::{StakeKey, StakePurpose};
use stakeledger::state::StateSnapshot;
use stakeledger::transaction::{SendTx, Transaction, TxInput, TxOutput};
use stakeledger::Ledger;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, default_value = "stakeledger.toml")]
    config: PathBuf,
    /// JSON genesis document; a synthetic one is generated when omitted
    #[arg(long)]
    genesis: Option<PathBuf>,
    /// Hex secret key of the proposer identity
    #[arg(long)]
    secret_key: Option<String>,
    /// Number of blocks to produce
    #[arg(long, default_value_t = 10)]
    blocks: u64,
    /// Funded accounts exchanging transfers in a synthetic genesis
    #[arg(long, default_value_t = 4)]
    users: usize,
    /// Directly finalize every n-th block
    #[arg(long, default_value_t = 1)]
    finalize_every: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let identity = match &cli.secret_key {
        Some(secret) => KeyPair::from_secret_bytes(&hex::decode(secret)?)?,
        None => KeyPair::generate(),
    };
    let users: Vec<KeyPair> = (0..cli.users).map(|_| KeyPair::generate()).collect();

    let genesis = match &cli.genesis {
        Some(path) => Genesis::load(path)?.into_snapshot(&config)?,
        None => synthetic_genesis(&config, &identity, &users),
    };

    let persistence: Arc<dyn Persistence> = match &config.storage.path {
        Some(path) => Arc::new(Database::open(path)?),
        None => Arc::new(InMemoryPersistence::new()),
    };

    let chain = Arc::new(BlockStore::new());
    let mut parent = chain.add_block(Block::genesis(&config.chain.chain_id, genesis.root_hash()?))?;
    let ledger = Ledger::new(config.clone(), identity, genesis, persistence, chain.clone())?;
    info!(proposer = %hex::encode(ledger.address()), "Starting simulation");

    let mut rng = rand::thread_rng();
    for _ in 0..cli.blocks {
        for (i, user) in users.iter().enumerate() {
            let recipient = users[(i + 1) % users.len()].address();
            let amount = rng.gen_range(1..=100u64);
            match transfer(&ledger, &config, user, recipient, amount) {
                Ok(raw) => {
                    if let Err(e) = ledger.submit_tx(&raw) {
                        warn!(error = %e, "Transfer rejected");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to build transfer"),
            }
        }

        let (_, txs) = ledger.propose_block_txs()?;
        let state_hash = ledger.project_block_state_hash(&txs)?;
        let height = ledger.height() + 1;
        let epoch = height / config.chain.epoch_length;
        let block = Block::new(&config.chain.chain_id, height, epoch, parent, state_hash);
        let block_hash = chain.add_block(block)?;

        ledger.apply_block_txs(&txs, &state_hash)?;
        ledger.advance_tip(&block_hash)?;
        if height % cli.finalize_every.max(1) == 0 {
            chain.finalize(&block_hash)?;
        }

        let validators = ledger.validator_set(&block_hash)?;
        info!(
            height,
            txs = txs.len(),
            block = %hex::encode(block_hash),
            status = ?chain.status(&block_hash),
            validators = validators.len(),
            mempool = ledger.mempool().size(),
            "Block applied"
        );
        parent = block_hash;
    }

    let supply = ledger.committed().total_supply();
    info!(height = ledger.height(), supply = %supply, "Simulation finished");
    Ok(())
}

/// Funds every user and stakes the minimum validator amount for the proposer.
fn synthetic_genesis(config: &LedgerConfig, identity: &KeyPair, users: &[KeyPair]) -> StateSnapshot {
    let mut genesis = StateSnapshot::new();
    for user in users {
        genesis.credit(&user.address(), &Coins::new(1_000_000u64, 1_000_000_000u64));
    }

    let key = StakeKey {
        holder: identity.address(),
        source: identity.address(),
        purpose: StakePurpose::Validator,
    };
    let stake = Coins::principal_only(config.staking.min_validator_stake.max(1));
    if let Err(e) = genesis.stakes_mut().deposit(key, &stake) {
        warn!(error = %e, "Failed to stake proposer");
    }
    genesis.recompute_validator_set(config);
    genesis
}

fn transfer(
    ledger: &Ledger,
    config: &LedgerConfig,
    from: &KeyPair,
    to: [u8; 32],
    amount: u64,
) -> stakeledger::Result<Vec<u8>> {
    let fee = config.ledger.min_tx_fee;
    let sequence = ledger.committed_account(&from.address()).sequence + 1;
    let mut tx = Transaction::Send(SendTx {
        fee: Coins::secondary_only(fee),
        inputs: vec![TxInput::new(from.address(), Coins::new(amount, fee), sequence)],
        outputs: vec![TxOutput::new(to, Coins::principal_only(amount))],
    });
    tx.sign_with(&config.chain.chain_id, from)?;
    tx.to_bytes()
}
