//! Error types for the ledger core

use thiserror::Error;

/// Structured result code attached to every ledger error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidTx,
    InvalidSignature,
    InvalidSequence,
    InsufficientFund,
    UnauthorizedTx,
    BelowMinimumStake,
    StakeNotFound,
    StakeWithdrawing,
    StateMismatch,
    MempoolFull,
    BlockNotFound,
    DatabaseError,
    ConfigError,
    CryptoError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Invalid transaction: {0}")]
    InvalidTx(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),
    #[error("Insufficient fund: {0}")]
    InsufficientFund(String),
    #[error("Unauthorized transaction: {0}")]
    UnauthorizedTx(String),
    #[error("Below minimum stake: {0}")]
    BelowMinimumStake(String),
    #[error("Stake not found: {0}")]
    StakeNotFound(String),
    #[error("Stake is being withdrawn: {0}")]
    StakeWithdrawing(String),
    #[error("State mismatch: {0}")]
    StateMismatch(String),
    #[error("Mempool is full")]
    MempoolFull,
    #[error("Block not found: {0}")]
    BlockNotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::InvalidTx(_) => ErrorCode::InvalidTx,
            LedgerError::InvalidSignature(_) => ErrorCode::InvalidSignature,
            LedgerError::InvalidSequence(_) => ErrorCode::InvalidSequence,
            LedgerError::InsufficientFund(_) => ErrorCode::InsufficientFund,
            LedgerError::UnauthorizedTx(_) => ErrorCode::UnauthorizedTx,
            LedgerError::BelowMinimumStake(_) => ErrorCode::BelowMinimumStake,
            LedgerError::StakeNotFound(_) => ErrorCode::StakeNotFound,
            LedgerError::StakeWithdrawing(_) => ErrorCode::StakeWithdrawing,
            LedgerError::StateMismatch(_) => ErrorCode::StateMismatch,
            LedgerError::MempoolFull => ErrorCode::MempoolFull,
            LedgerError::BlockNotFound(_) => ErrorCode::BlockNotFound,
            LedgerError::DatabaseError(_) => ErrorCode::DatabaseError,
            LedgerError::ConfigError(_) => ErrorCode::ConfigError,
            LedgerError::CryptoError(_) => ErrorCode::CryptoError,
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::ConfigError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for LedgerError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LedgerError::InvalidTx(format!("Bincode error: {}", err))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::DatabaseError(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::ConfigError(format!("JSON error: {}", err))
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_matches_variant() {
        assert_eq!(
            LedgerError::StateMismatch("x".into()).code(),
            ErrorCode::StateMismatch
        );
        assert_eq!(LedgerError::MempoolFull.code(), ErrorCode::MempoolFull);
    }

    #[test]
    fn test_display_carries_message() {
        let err = LedgerError::InsufficientFund("balance 3 < 5".to_string());
        assert_eq!(err.to_string(), "Insufficient fund: balance 3 < 5");
    }
}
