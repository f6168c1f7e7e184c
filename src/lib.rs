//! # Rusty-Portfolio
//!
//! Point-in-time portfolio reconstruction from an ordered transaction stream.
//!
//! Transactions are applied to per-asset lot ledgers; splits, dividends and
//! deferred option-exercise deliveries are merged in from injected sources
//! as their time comes up. Every applied event lands on an append-only
//! timeline whose bit-packed balance index answers "what did the portfolio
//! hold after event N" without rescanning history.
//!
//! ## Example
//!
//! ```rust
//! use rusty_portfolio::prelude::*;
//! use chrono::{TimeZone, Utc};
//!
//! let t = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
//! let stock = Asset::stock(1, Currency::USD, "NYSE");
//!
//! let mut engine = PortfolioEngine::with_config(EngineConfig::default());
//! engine.ingest(Transaction::deposit(t, Currency::USD, 2000.0))?;
//! engine.ingest(Transaction::new(t, stock.clone(), TransactionKind::Buy, 100.0, 10.0))?;
//!
//! let snapshot = engine.portfolio_at(t)?;
//! assert_eq!(snapshot.item(&stock).map(|item| item.volume), Some(100.0));
//! # Ok::<(), rusty_portfolio::error::PortfolioError>(())
//! ```

pub mod asset;
pub mod builder;
pub mod calendar;
pub mod config;
pub mod currency;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod ordering;
pub mod projector;
pub mod scheduler;
pub mod sources;
pub mod timeline;
pub mod transaction;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::asset::{Asset, AssetKind, CONSOLIDATED_ID};
    pub use crate::config::EngineConfig;
    pub use crate::currency::Currency;
    pub use crate::engine::PortfolioEngine;
    pub use crate::error::{PortfolioError, Result};
    pub use crate::projector::{Snapshot, SnapshotItem};
    pub use crate::scheduler::ForthcomingPreview;
    pub use crate::sources::{
        Collaborators, CorporateAction, CorporateActionSource, CurrencyConversionSource,
        FuturesMetadataSource, MarketCalendarSource, OptionMetadata, OptionMetadataSource,
    };
    pub use crate::timeline::{EventHandle, EventKind};
    pub use crate::transaction::{Transaction, TransactionKind};
    pub use crate::types::*;
}
