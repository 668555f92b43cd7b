//! Canonical wire encoding and sign-bytes for transactions
//!
//! Every transaction has exactly one accepted encoding, so a raw hash identifies
//! a transaction in the mempool and in committed blocks.

use crate::crypto::{sha256, Hash};
use crate::error::LedgerError;
use crate::transaction::types::{Transaction, MAX_TRANSACTION_SIZE};
use bincode::Options;

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .with_limit(MAX_TRANSACTION_SIZE as u64)
}

impl Transaction {
    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        wire_options()
            .serialize(self)
            .map_err(|e| LedgerError::InvalidTx(format!("Serialization failed: {}", e)))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, LedgerError> {
        if raw.len() > MAX_TRANSACTION_SIZE {
            return Err(LedgerError::InvalidTx(format!(
                "Transaction too large: {} bytes (max: {})",
                raw.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        let tx: Transaction = wire_options()
            .deserialize(raw)
            .map_err(|e| LedgerError::InvalidTx(format!("Failed to decode transaction: {}", e)))?;

        // Amounts decode leniently, so compare against the re-encoding.
        if tx.to_bytes()? != raw {
            return Err(LedgerError::InvalidTx(
                "Transaction is not canonically encoded".to_string(),
            ));
        }
        Ok(tx)
    }

    /// Deterministic bytes every signer of this transaction signs: the chain id and the
    /// transaction with all signatures and public keys stripped.
    pub fn sign_bytes(&self, chain_id: &str) -> Result<Vec<u8>, LedgerError> {
        let mut unsigned = self.clone();
        for input in unsigned.signers_mut() {
            input.clear_signature();
        }
        bincode::serialize(&(chain_id, &unsigned))
            .map_err(|e| LedgerError::InvalidTx(format!("Serialization failed: {}", e)))
    }

    pub fn hash(&self) -> Result<Hash, LedgerError> {
        Ok(sha256(&self.to_bytes()?))
    }
}

/// Hash of an already-encoded transaction.
pub fn raw_tx_hash(raw: &[u8]) -> Hash {
    sha256(raw)
}
