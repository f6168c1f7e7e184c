//! Timeline entries

use crate::transaction::Transaction;
use crate::types::{AssetSlot, Price, Quantity, Timestamp};
use serde::{Deserialize, Serialize};

/// What produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Transaction,
    Split,
    Dividend,
}

/// One applied event of the append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: Timestamp,
    pub kind: EventKind,
    /// Asset the event concerns
    pub asset_slot: AssetSlot,
    /// Most recent explicit transaction of that asset
    pub transaction: Option<Transaction>,
    /// Index of the first balance item of this event
    pub first_item: usize,
    /// Number of balance items attached
    pub item_count: usize,
    /// No non-USD cash or cost balance was live right after this event
    pub usd_only: bool,
}

impl Event {
    /// Range of this event's items in the timeline's item log
    pub fn item_range(&self) -> std::ops::Range<usize> {
        self.first_item..self.first_item + self.item_count
    }
}

/// Resulting balance of one asset after one event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceItem {
    pub asset_slot: AssetSlot,
    pub volume: Quantity,
    pub average_price: Price,
    pub deposit: f64,
    pub is_cash: bool,
    pub is_nonzero: bool,
    /// Event that produced this item
    pub event: usize,
}

impl BalanceItem {
    /// Occupies item index 0, which no asset slot ever references
    pub fn void() -> Self {
        Self {
            asset_slot: usize::MAX,
            volume: 0.0,
            average_price: 0.0,
            deposit: 0.0,
            is_cash: false,
            is_nonzero: false,
            event: usize::MAX,
        }
    }
}
