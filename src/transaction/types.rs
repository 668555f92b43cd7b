/// Transaction types for the ledger
use crate::coins::Coins;
use crate::crypto::{address_from_public_key, verify_signature, Address, KeyPair};
use crate::error::LedgerError;
use crate::stake::StakePurpose;
use serde::{Deserialize, Serialize};

/// Maximum encoded transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Signed authorization to spend from an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub address: Address,
    pub coins: Coins,
    pub sequence: u64,
    pub signature: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl TxInput {
    pub fn new(address: Address, coins: Coins, sequence: u64) -> Self {
        TxInput {
            address,
            coins,
            sequence,
            signature: None,
            public_key: None,
        }
    }

    pub fn attach_signature(&mut self, keypair: &KeyPair, sign_bytes: &[u8]) -> Result<(), LedgerError> {
        self.signature = Some(keypair.sign(sign_bytes)?.to_vec());
        self.public_key = Some(keypair.public_key_bytes().to_vec());
        Ok(())
    }

    /// Checks that the attached key owns `address` and signed `sign_bytes`.
    pub fn verify(&self, sign_bytes: &[u8]) -> Result<(), LedgerError> {
        let (signature, public_key) = match (&self.signature, &self.public_key) {
            (Some(sig), Some(pk)) => (sig, pk),
            _ => {
                return Err(LedgerError::InvalidSignature(format!(
                    "Input {} is not signed",
                    hex::encode(self.address)
                )))
            }
        };

        if address_from_public_key(public_key) != self.address {
            return Err(LedgerError::InvalidSignature(format!(
                "Public key does not belong to {}",
                hex::encode(self.address)
            )));
        }

        verify_signature(public_key, sign_bytes, signature)
    }

    pub(crate) fn clear_signature(&mut self) {
        self.signature = None;
        self.public_key = None;
    }
}

/// Unsigned recipient or custodian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub coins: Coins,
}

impl TxOutput {
    pub fn new(address: Address, coins: Coins) -> Self {
        TxOutput { address, coins }
    }
}

/// Block reward plus collected fees, authorized by the proposer's consensus identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseTx {
    pub proposer: TxInput,
    pub outputs: Vec<TxOutput>,
    pub block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTx {
    pub fee: Coins,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// Escrows `source.coins` under `holder` for `purpose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositStakeTx {
    pub fee: Coins,
    pub source: TxInput,
    pub holder: TxOutput,
    pub purpose: StakePurpose,
}

/// Requests the return of the stake deposited by `source` under `holder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawStakeTx {
    pub fee: Coins,
    pub source: TxInput,
    pub holder: TxOutput,
    pub purpose: StakePurpose,
}

/// The closed set of ledger transactions. The variant index is the wire tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Coinbase(CoinbaseTx),
    Send(SendTx),
    DepositStake(DepositStakeTx),
    WithdrawStake(WithdrawStakeTx),
}

impl Transaction {
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::Coinbase(_) => "coinbase",
            Transaction::Send(_) => "send",
            Transaction::DepositStake(_) => "deposit_stake",
            Transaction::WithdrawStake(_) => "withdraw_stake",
        }
    }

    /// Coinbase transactions are synthesized by proposers only.
    pub fn is_client_submittable(&self) -> bool {
        !matches!(self, Transaction::Coinbase(_))
    }

    pub fn fee(&self) -> Coins {
        match self {
            Transaction::Coinbase(_) => Coins::zero(),
            Transaction::Send(tx) => tx.fee.clone(),
            Transaction::DepositStake(tx) => tx.fee.clone(),
            Transaction::WithdrawStake(tx) => tx.fee.clone(),
        }
    }

    /// Inputs whose signatures authorize this transaction.
    pub fn signers(&self) -> Vec<&TxInput> {
        match self {
            Transaction::Coinbase(tx) => vec![&tx.proposer],
            Transaction::Send(tx) => tx.inputs.iter().collect(),
            Transaction::DepositStake(tx) => vec![&tx.source],
            Transaction::WithdrawStake(tx) => vec![&tx.source],
        }
    }

    pub(crate) fn signers_mut(&mut self) -> Vec<&mut TxInput> {
        match self {
            Transaction::Coinbase(tx) => vec![&mut tx.proposer],
            Transaction::Send(tx) => tx.inputs.iter_mut().collect(),
            Transaction::DepositStake(tx) => vec![&mut tx.source],
            Transaction::WithdrawStake(tx) => vec![&mut tx.source],
        }
    }

    /// Signs every input owned by `keypair`.
    pub fn sign_with(&mut self, chain_id: &str, keypair: &KeyPair) -> Result<(), LedgerError> {
        let sign_bytes = self.sign_bytes(chain_id)?;
        let address = keypair.address();
        let mut signed = false;
        for input in self.signers_mut() {
            if input.address == address {
                input.attach_signature(keypair, &sign_bytes)?;
                signed = true;
            }
        }
        if !signed {
            return Err(LedgerError::InvalidTx(format!(
                "No input of this {} transaction belongs to {}",
                self.kind(),
                hex::encode(address)
            )));
        }
        Ok(())
    }
}
