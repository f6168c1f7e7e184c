//! Account ledger - lot-based cost basis per asset
//!
//! - **lots**: FIFO/LIFO lot queue
//! - **account**: per-asset working state and the slot-addressed arena

pub mod account;
pub mod lots;

pub use account::{Account, AccountArena, OptionTerms};
pub use lots::{Lot, LotQueue};
