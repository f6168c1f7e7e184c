//! Deferred option exercise - one delivery of underlying shares at the strike

use crate::asset::Asset;
use crate::transaction::{Transaction, TransactionKind};
use crate::types::{AssetSlot, Price, Quantity, Timestamp};

/// Delivery scheduled for the next market open after an exercise
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredExercise {
    id: u64,
    pub time: Timestamp,
    pub option_slot: AssetSlot,
    pub underlying: Asset,
    /// Signed underlying shares received (negative = delivered)
    pub shares: Quantity,
    pub strike: Price,
    delivered: bool,
}

impl DeferredExercise {
    pub fn new(
        id: u64,
        time: Timestamp,
        option_slot: AssetSlot,
        underlying: Asset,
        shares: Quantity,
        strike: Price,
    ) -> Self {
        Self {
            id,
            time,
            option_slot,
            underlying,
            shares,
            strike,
            delivered: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub fn kind(&self) -> TransactionKind {
        if self.shares >= 0.0 {
            TransactionKind::Buy
        } else {
            TransactionKind::Sell
        }
    }

    /// Underlying trade that settles the exercise
    pub fn settlement(&self) -> Transaction {
        Transaction::new(
            self.time,
            self.underlying.clone(),
            self.kind(),
            self.shares.abs(),
            self.strike,
        )
    }

    pub fn advance(&mut self) {
        self.delivered = true;
    }

    pub fn restore(&mut self, delivered: bool) {
        self.delivered = delivered;
    }
}
