//! Account, stake and validator state with committed and delivered views

pub mod account;
pub mod snapshot;
pub mod views;

pub use account::Account;
pub use snapshot::{HeightAdvance, StateSnapshot};
pub use views::LedgerState;
