//! External collaborators consumed by the engine
//!
//! All lookups are synchronous and infallible from the engine's point of
//! view: a missing answer is `None` or NaN, never an error.
//!
//! # Components
//!
//! - **in_memory**: map-backed implementations, loadable from CSV
//! - **exploding**: conversion stub that panics on any non-USD lookup
//!
//! # Example
//!
//! ```rust
//! use rusty_portfolio::currency::Currency;
//! use rusty_portfolio::sources::{CurrencyConversionSource, InMemoryRates};
//! use chrono::Utc;
//!
//! let mut rates = InMemoryRates::new();
//! let dt = Utc::now();
//! rates.add_rate(Currency::EUR, dt, 1.10);
//!
//! assert_eq!(rates.usd_rate(Currency::EUR, dt), 1.10);
//! assert_eq!(rates.usd_rate(Currency::USD, dt), 1.0);
//! assert!(rates.usd_rate(Currency::GBP, dt).is_nan());
//! ```

pub mod exploding;
pub mod in_memory;

pub use exploding::ExplodingRates;
pub use in_memory::{InMemoryCorporateActions, InMemoryFutures, InMemoryOptions, InMemoryRates};

use crate::asset::Asset;
use crate::calendar::NyseCalendar;
use crate::currency::Currency;
use crate::types::{Price, Quantity, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A split or dividend record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorporateAction {
    /// Effective time
    pub time: Timestamp,
    /// Units before a split (ignored for dividends)
    pub old_volume: Quantity,
    /// Units after a split (ignored for dividends)
    pub new_volume: Quantity,
    /// Dividend per share, or the pre-split price for splits
    pub dividend_or_price: Price,
    pub is_split: bool,
}

impl CorporateAction {
    pub fn split(time: Timestamp, old_volume: Quantity, new_volume: Quantity, price: Price) -> Self {
        Self {
            time,
            old_volume,
            new_volume,
            dividend_or_price: price,
            is_split: true,
        }
    }

    pub fn dividend(time: Timestamp, amount: f64) -> Self {
        Self {
            time,
            old_volume: 1.0,
            new_volume: 1.0,
            dividend_or_price: amount,
            is_split: false,
        }
    }

    /// New units per old unit
    pub fn ratio(&self) -> f64 {
        self.new_volume / self.old_volume
    }
}

/// Source of corporate actions.
///
/// Implementations must answer any window, including one that restarts
/// earlier than a window already served: look-ahead rewinds a sequence by
/// asking again from an earlier time.
pub trait CorporateActionSource {
    /// Actions of `asset` with `from_exclusive < time <= to_inclusive`,
    /// ordered by time. `None` means from the beginning.
    fn actions(
        &self,
        asset: &Asset,
        from_exclusive: Option<Timestamp>,
        to_inclusive: Timestamp,
    ) -> Vec<CorporateAction>;
}

/// Contract terms of an option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionMetadata {
    pub underlying: Option<Asset>,
    pub strike: Price,
    pub multiplier: f64,
    pub is_call: bool,
    pub expiration: Option<Timestamp>,
}

impl OptionMetadata {
    /// Assumed terms when the source knows nothing about an option
    pub fn degraded() -> Self {
        Self {
            underlying: None,
            strike: f64::NAN,
            multiplier: 100.0,
            is_call: true,
            expiration: None,
        }
    }
}

pub trait OptionMetadataSource {
    fn option_metadata(&self, option: &Asset) -> Option<OptionMetadata>;
}

pub trait FuturesMetadataSource {
    fn multiplier(&self, future: &Asset) -> Option<f64>;
}

pub trait CurrencyConversionSource {
    /// USD value of one unit of `currency` at `time`; NaN when unknown
    fn usd_rate(&self, currency: Currency, time: Timestamp) -> f64;
}

pub trait MarketCalendarSource {
    /// First market open strictly after `time` on `exchange`
    fn next_market_open(&self, time: Timestamp, exchange: &str) -> Timestamp;
}

/// Bundle of collaborators handed to the engine
#[derive(Clone)]
pub struct Collaborators {
    pub corporate_actions: Arc<dyn CorporateActionSource>,
    pub options: Arc<dyn OptionMetadataSource>,
    pub futures: Arc<dyn FuturesMetadataSource>,
    pub rates: Arc<dyn CurrencyConversionSource>,
    pub calendar: Arc<dyn MarketCalendarSource>,
}

impl Collaborators {
    pub fn with_corporate_actions(mut self, source: Arc<dyn CorporateActionSource>) -> Self {
        self.corporate_actions = source;
        self
    }

    pub fn with_options(mut self, source: Arc<dyn OptionMetadataSource>) -> Self {
        self.options = source;
        self
    }

    pub fn with_futures(mut self, source: Arc<dyn FuturesMetadataSource>) -> Self {
        self.futures = source;
        self
    }

    pub fn with_rates(mut self, source: Arc<dyn CurrencyConversionSource>) -> Self {
        self.rates = source;
        self
    }

    pub fn with_calendar(mut self, source: Arc<dyn MarketCalendarSource>) -> Self {
        self.calendar = source;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            corporate_actions: Arc::new(InMemoryCorporateActions::new()),
            options: Arc::new(InMemoryOptions::new()),
            futures: Arc::new(InMemoryFutures::new()),
            rates: Arc::new(InMemoryRates::new()),
            calendar: Arc::new(NyseCalendar::new()),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
