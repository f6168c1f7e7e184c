//! Error types for rusty_portfolio

use crate::types::Timestamp;
use thiserror::Error;

/// Main error type for rusty_portfolio
///
/// Only usage errors and I/O surface here. Data-quality problems in the
/// transaction stream are logged and skipped, and missing prices or rates
/// travel as NaN through the snapshot arithmetic.
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Engine has been disposed")]
    Disposed,

    #[error("Engine has finished ingesting; builder state was released")]
    Finished,

    #[error("Stale event handle: captured generation {captured}, buffer is at {current}")]
    StaleHandle { captured: u64, current: u64 },

    #[error("History retention is disabled: {0}")]
    HistoryDisabled(String),

    #[error("Transaction at {time} is out of order after one applied at {last}")]
    OutOfOrder { time: Timestamp, last: Timestamp },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Result type alias for rusty_portfolio operations
pub type Result<T> = std::result::Result<T, PortfolioError>;
