//! Transaction module split into types and the canonical codec

pub mod codec;
pub mod types;

pub use codec::raw_tx_hash;
pub use types::*;
