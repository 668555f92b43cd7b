//! StakeLedger - state-transition and admission core of a proof-of-stake ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger Core
//! - [`ledger`] - Admission, block proposal and atomic block application
//! - [`mempool`] - Fee-ordered pending transaction pool
//! - [`executor`] - Per-transaction state transitions
//! - [`transaction`] - Transaction types, wire codec and sign-bytes
//!
//! ## State
//! - [`coins`] - Two-denomination amounts
//! - [`state`] - Accounts, state snapshots and the committed/delivered views
//! - [`genesis`] - Initial state document
//!
//! ## Staking & Consensus Collaborators
//! - [`stake`] - Stake records and the withdrawal state machine
//! - [`validator`] - Validator set derivation and lookup by block
//! - [`blocktree`] - Block headers and finality status
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1)
//!
//! ## Storage
//! - [`persistence`] - Snapshot storage (SQLite and in-memory)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger Core
// ============================================================================
pub mod executor;
pub mod ledger;
pub mod mempool;
pub mod transaction;

// ============================================================================
// State
// ============================================================================
pub mod coins;
pub mod genesis;
pub mod state;

// ============================================================================
// Staking & Consensus Collaborators
// ============================================================================
pub mod blocktree;
pub mod stake;
pub mod validator;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Storage
// ============================================================================
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use error::{ErrorCode, LedgerError, Result};
pub use ledger::Ledger;
