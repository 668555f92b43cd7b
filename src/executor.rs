//! Deterministic state transition for every transaction variant
//!
//! Each variant has a read-only `check_*` and a mutating `apply_*`. `check_tx` is
//! what admission runs against committed state; `execute_tx` runs the same check
//! and then applies it to a working state.

use crate::coins::Coins;
use crate::config::LedgerConfig;
use crate::crypto::Address;
use crate::error::{LedgerError, Result};
use crate::stake::StakeKey;
use crate::state::StateSnapshot;
use crate::transaction::{
    CoinbaseTx, DepositStakeTx, SendTx, Transaction, TxInput, TxOutput, WithdrawStakeTx,
};
use crate::validator::ValidatorSet;
use num::{BigInt, Signed, Zero};
use std::collections::HashSet;

/// Facts about the block a transaction executes in.
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// Height the block will have once applied.
    pub block_height: u64,
    /// Sum of the fees of the block's regular transactions.
    pub block_fees: Coins,
    /// Validator set governing the block, resolved from its ancestry.
    pub validators: ValidatorSet,
}

impl BlockContext {
    pub fn new(block_height: u64, block_fees: Coins) -> Self {
        BlockContext {
            block_height,
            block_fees,
            validators: ValidatorSet::default(),
        }
    }

    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }
}

/// Outputs a coinbase must carry: every validator gets the block reward and the
/// proposer additionally collects the block's fees.
pub fn expected_coinbase_outputs(
    validators: &ValidatorSet,
    proposer: &Address,
    block_reward: &Coins,
    block_fees: &Coins,
) -> Vec<TxOutput> {
    validators
        .validators()
        .iter()
        .map(|v| {
            let coins = if &v.address == proposer {
                block_reward.plus(block_fees)
            } else {
                block_reward.clone()
            };
            TxOutput::new(v.address, coins)
        })
        .collect()
}

pub struct Executor {
    chain_id: String,
    min_tx_fee: BigInt,
    block_reward: Coins,
}

impl Executor {
    pub fn new(config: &LedgerConfig) -> Self {
        Executor {
            chain_id: config.chain.chain_id.clone(),
            min_tx_fee: BigInt::from(config.ledger.min_tx_fee),
            block_reward: config.ledger.block_reward(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn block_reward(&self) -> &Coins {
        &self.block_reward
    }

    pub fn check_tx(&self, state: &StateSnapshot, tx: &Transaction, ctx: &BlockContext) -> Result<()> {
        match tx {
            Transaction::Coinbase(tx) => self.check_coinbase(tx, ctx),
            Transaction::Send(inner) => self.check_send(state, tx, inner),
            Transaction::DepositStake(inner) => self.check_deposit_stake(state, tx, inner),
            Transaction::WithdrawStake(inner) => self.check_withdraw_stake(state, tx, inner),
        }
    }

    pub fn execute_tx(&self, state: &mut StateSnapshot, tx: &Transaction, ctx: &BlockContext) -> Result<()> {
        self.check_tx(state, tx, ctx)?;
        match tx {
            Transaction::Coinbase(tx) => {
                apply_coinbase(state, tx);
                Ok(())
            }
            Transaction::Send(tx) => apply_send(state, tx),
            Transaction::DepositStake(tx) => apply_deposit_stake(state, tx),
            Transaction::WithdrawStake(tx) => apply_withdraw_stake(state, tx, ctx),
        }
    }

    /// Checks the coinbase proposer's signature. Placement and signature are the
    /// block applier's responsibility; the state transition only checks amounts.
    pub fn verify_proposer_signature(&self, tx: &Transaction) -> Result<()> {
        match tx {
            Transaction::Coinbase(coinbase) => {
                let sign_bytes = tx.sign_bytes(&self.chain_id)?;
                coinbase.proposer.verify(&sign_bytes)
            }
            other => Err(LedgerError::InvalidTx(format!(
                "Expected a coinbase transaction, got {}",
                other.kind()
            ))),
        }
    }

    fn check_fee(&self, fee: &Coins) -> Result<()> {
        if !fee.principal.is_zero() {
            return Err(LedgerError::InvalidTx(
                "Fee must be paid in the secondary denomination only".to_string(),
            ));
        }
        if fee.secondary < self.min_tx_fee {
            return Err(LedgerError::InvalidTx(format!(
                "Fee {} is below the minimum of {}",
                fee.secondary, self.min_tx_fee
            )));
        }
        Ok(())
    }

    /// Signature, then sequence, then funds.
    fn check_input(
        &self,
        state: &StateSnapshot,
        input: &TxInput,
        sign_bytes: &[u8],
        required: &Coins,
    ) -> Result<()> {
        input.verify(sign_bytes)?;

        let account = state.account(&input.address);
        if input.sequence != account.sequence + 1 {
            return Err(LedgerError::InvalidSequence(format!(
                "Got {}, expected {} for {}",
                input.sequence,
                account.sequence + 1,
                hex::encode(input.address)
            )));
        }

        if !account.balance.is_gte(required) {
            return Err(LedgerError::InsufficientFund(format!(
                "{} holds {} but needs {}",
                hex::encode(input.address),
                account.balance,
                required
            )));
        }
        Ok(())
    }

    fn check_coinbase(&self, tx: &CoinbaseTx, ctx: &BlockContext) -> Result<()> {
        if tx.block_height != ctx.block_height {
            return Err(LedgerError::InvalidTx(format!(
                "Coinbase is for height {}, block is at {}",
                tx.block_height, ctx.block_height
            )));
        }

        let validators = &ctx.validators;
        if !validators.contains(&tx.proposer.address) {
            return Err(LedgerError::UnauthorizedTx(format!(
                "Proposer {} is not a validator",
                hex::encode(tx.proposer.address)
            )));
        }

        let expected = expected_coinbase_outputs(
            validators,
            &tx.proposer.address,
            &self.block_reward,
            &ctx.block_fees,
        );
        if tx.outputs != expected {
            return Err(LedgerError::InvalidTx(
                "Coinbase outputs do not match the expected rewards and fees".to_string(),
            ));
        }
        Ok(())
    }

    fn check_send(&self, state: &StateSnapshot, tx: &Transaction, send: &SendTx) -> Result<()> {
        if send.inputs.is_empty() || send.outputs.is_empty() {
            return Err(LedgerError::InvalidTx(
                "Send requires at least one input and one output".to_string(),
            ));
        }
        self.check_fee(&send.fee)?;

        let mut seen = HashSet::new();
        for input in &send.inputs {
            if !seen.insert(input.address) {
                return Err(LedgerError::InvalidTx(format!(
                    "Duplicate input address {}",
                    hex::encode(input.address)
                )));
            }
        }

        let amounts = send
            .inputs
            .iter()
            .map(|i| &i.coins)
            .chain(send.outputs.iter().map(|o| &o.coins));
        for coins in amounts {
            if !coins.is_valid() {
                return Err(LedgerError::InvalidTx(format!("Negative amount {}", coins)));
            }
        }

        let total_in = Coins::sum(send.inputs.iter().map(|i| &i.coins));
        let total_out = Coins::sum(send.outputs.iter().map(|o| &o.coins)).plus(&send.fee);
        if total_in != total_out {
            return Err(LedgerError::InvalidTx(format!(
                "Inputs {} do not equal outputs plus fee {}",
                total_in, total_out
            )));
        }

        let sign_bytes = tx.sign_bytes(&self.chain_id)?;
        for input in &send.inputs {
            self.check_input(state, input, &sign_bytes, &input.coins)?;
        }
        Ok(())
    }

    fn check_deposit_stake(
        &self,
        state: &StateSnapshot,
        tx: &Transaction,
        deposit: &DepositStakeTx,
    ) -> Result<()> {
        self.check_fee(&deposit.fee)?;

        if !deposit.holder.coins.is_zero() {
            return Err(LedgerError::InvalidTx(
                "Stake holder output must not carry coins".to_string(),
            ));
        }
        let amount = &deposit.source.coins;
        if !amount.secondary.is_zero() {
            return Err(LedgerError::InvalidTx(
                "Stake can only be deposited in the principal denomination".to_string(),
            ));
        }
        if amount.principal.is_negative() {
            return Err(LedgerError::InvalidTx(format!("Negative stake {}", amount)));
        }
        if amount.principal.is_zero() {
            return Err(LedgerError::BelowMinimumStake(
                "Stake deposit must be positive".to_string(),
            ));
        }

        let sign_bytes = tx.sign_bytes(&self.chain_id)?;
        self.check_input(state, &deposit.source, &sign_bytes, &amount.plus(&deposit.fee))?;
        state.stakes().check_deposit(&stake_key(&deposit.source, &deposit.holder, deposit.purpose))
    }

    fn check_withdraw_stake(
        &self,
        state: &StateSnapshot,
        tx: &Transaction,
        withdraw: &WithdrawStakeTx,
    ) -> Result<()> {
        self.check_fee(&withdraw.fee)?;
        if !withdraw.source.coins.is_zero() || !withdraw.holder.coins.is_zero() {
            return Err(LedgerError::InvalidTx(
                "Stake withdrawal must not carry coins".to_string(),
            ));
        }

        let sign_bytes = tx.sign_bytes(&self.chain_id)?;
        self.check_input(state, &withdraw.source, &sign_bytes, &withdraw.fee)?;
        state
            .stakes()
            .check_withdraw(&stake_key(&withdraw.source, &withdraw.holder, withdraw.purpose))
            .map(|_| ())
    }
}

fn stake_key(source: &TxInput, holder: &TxOutput, purpose: crate::stake::StakePurpose) -> StakeKey {
    StakeKey {
        holder: holder.address,
        source: source.address,
        purpose,
    }
}

/// Debits `amount` and consumes one sequence number.
fn charge(state: &mut StateSnapshot, address: &Address, amount: &Coins) -> Result<()> {
    state.debit(address, amount)?;
    let mut account = state.account(address);
    account.sequence += 1;
    state.set_account(account);
    Ok(())
}

fn apply_coinbase(state: &mut StateSnapshot, tx: &CoinbaseTx) {
    for output in &tx.outputs {
        state.credit(&output.address, &output.coins);
    }
}

fn apply_send(state: &mut StateSnapshot, tx: &SendTx) -> Result<()> {
    for input in &tx.inputs {
        charge(state, &input.address, &input.coins)?;
    }
    for output in &tx.outputs {
        state.credit(&output.address, &output.coins);
    }
    Ok(())
}

fn apply_deposit_stake(state: &mut StateSnapshot, tx: &DepositStakeTx) -> Result<()> {
    charge(state, &tx.source.address, &tx.source.coins.plus(&tx.fee))?;
    state
        .stakes_mut()
        .deposit(stake_key(&tx.source, &tx.holder, tx.purpose), &tx.source.coins)
}

fn apply_withdraw_stake(state: &mut StateSnapshot, tx: &WithdrawStakeTx, ctx: &BlockContext) -> Result<()> {
    charge(state, &tx.source.address, &tx.fee)?;
    state
        .stakes_mut()
        .withdraw(&stake_key(&tx.source, &tx.holder, tx.purpose), ctx.block_height)
}
