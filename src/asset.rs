//! Asset identities

use crate::currency::Currency;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity used by the two synthesized USD-equivalent items of a snapshot.
///
/// Negative so it can never collide with a genuine cash asset, whose id is
/// the currency ordinal.
pub const CONSOLIDATED_ID: i64 = -1;

/// Kind of asset. The declaration order is the asset-type tie-break used
/// by the event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Cash balance in one currency
    Cash,
    /// Accumulated transaction cost in one currency
    TransactionCost,
    /// Common stock
    Stock,
    /// Futures contract
    Future,
    /// Options contract
    Option,
}

impl AssetKind {
    /// Cash-like kinds collapse to a single running balance
    pub fn is_cash(&self) -> bool {
        matches!(self, AssetKind::Cash | AssetKind::TransactionCost)
    }
}

/// Asset representation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Type of asset
    pub kind: AssetKind,
    /// Unique identifier within `kind`
    pub id: i64,
    /// Currency the asset is traded and settled in
    pub currency: Currency,
    /// Exchange where asset is traded (empty for cash)
    pub exchange: String,
}

impl Asset {
    /// Create a new asset
    pub fn new(kind: AssetKind, id: i64, currency: Currency, exchange: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            currency,
            exchange: exchange.into(),
        }
    }

    /// Cash account of a currency
    pub fn cash(currency: Currency) -> Self {
        Self::new(AssetKind::Cash, currency.ordinal(), currency, "")
    }

    /// Transaction-cost account of a currency
    pub fn transaction_cost(currency: Currency) -> Self {
        Self::new(AssetKind::TransactionCost, currency.ordinal(), currency, "")
    }

    /// Create a stock asset
    pub fn stock(id: i64, currency: Currency, exchange: impl Into<String>) -> Self {
        Self::new(AssetKind::Stock, id, currency, exchange)
    }

    /// Create a futures asset
    pub fn future(id: i64, currency: Currency, exchange: impl Into<String>) -> Self {
        Self::new(AssetKind::Future, id, currency, exchange)
    }

    /// Create an option asset
    pub fn option(id: i64, currency: Currency, exchange: impl Into<String>) -> Self {
        Self::new(AssetKind::Option, id, currency, exchange)
    }

    pub fn is_cash(&self) -> bool {
        self.kind.is_cash()
    }

    /// True for the synthesized USD-equivalent items
    pub fn is_consolidated(&self) -> bool {
        self.is_cash() && self.id == CONSOLIDATED_ID
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AssetKind::Cash if self.id == CONSOLIDATED_ID => write!(f, "Cash(USD-equivalent)"),
            AssetKind::TransactionCost if self.id == CONSOLIDATED_ID => {
                write!(f, "Cost(USD-equivalent)")
            }
            AssetKind::Cash => write!(f, "Cash({})", self.currency),
            AssetKind::TransactionCost => write!(f, "Cost({})", self.currency),
            _ => write!(f, "{:?}({}@{}, {})", self.kind, self.id, self.exchange, self.currency),
        }
    }
}
