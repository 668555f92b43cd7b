use crate::coins::Coins;
use crate::crypto::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: Coins,
    /// Sequence of the last accepted transaction from this account.
    pub sequence: u64,
}

impl Account {
    /// An account that has never been touched: zero balance, sequence 0.
    pub fn empty(address: Address) -> Self {
        Account {
            address,
            balance: Coins::zero(),
            sequence: 0,
        }
    }

    pub fn with_balance(address: Address, balance: Coins) -> Self {
        Account {
            address,
            balance,
            sequence: 0,
        }
    }
}
