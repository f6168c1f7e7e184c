//! Transaction - the immutable input records of the engine
//!
//! A Transaction is one explicit portfolio operation: a cash movement, a
//! trade, or an option exercise. Records are read either from code or from
//! a CSV file with the columns
//! `time,asset_kind,asset_id,currency,exchange,kind,volume,price`.

use crate::asset::{Asset, AssetKind};
use crate::currency::Currency;
use crate::error::{PortfolioError, Result};
use crate::types::{Price, Quantity, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Transaction ID
pub type TransactionId = Uuid;

/// Kind of transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    TransactionCost,
    Buy,
    Sell,
    Short,
    Cover,
    WriteOption,
    BuybackWrittenOption,
    ExerciseOption,
    /// A kind the engine does not understand; skipped on ingestion
    Unsupported,
}

impl TransactionKind {
    /// Parse a kind name, case-insensitive; unknown names become `Unsupported`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "deposit" => TransactionKind::Deposit,
            "withdraw" | "withdrawal" => TransactionKind::Withdraw,
            "transactioncost" | "cost" | "fee" => TransactionKind::TransactionCost,
            "buy" => TransactionKind::Buy,
            "sell" => TransactionKind::Sell,
            "short" => TransactionKind::Short,
            "cover" => TransactionKind::Cover,
            "writeoption" => TransactionKind::WriteOption,
            "buybackwrittenoption" | "buybackoption" => TransactionKind::BuybackWrittenOption,
            "exerciseoption" => TransactionKind::ExerciseOption,
            _ => TransactionKind::Unsupported,
        }
    }

    /// Sign applied to the traded asset's position
    pub fn position_sign(&self) -> f64 {
        match self {
            TransactionKind::Deposit
            | TransactionKind::Buy
            | TransactionKind::Cover
            | TransactionKind::BuybackWrittenOption => 1.0,
            TransactionKind::Withdraw
            | TransactionKind::Sell
            | TransactionKind::Short
            | TransactionKind::WriteOption => -1.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Transaction represents one explicit portfolio operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: TransactionId,
    /// Transaction timestamp
    pub time: Timestamp,
    /// Asset the transaction concerns
    pub asset: Asset,
    /// What happened
    pub kind: TransactionKind,
    /// Unsigned volume (shares, contracts or cash amount)
    pub volume: Quantity,
    /// Price per unit; ignored for cash movements
    pub price: Price,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(
        time: Timestamp,
        asset: Asset,
        kind: TransactionKind,
        volume: Quantity,
        price: Price,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            time,
            asset,
            kind,
            volume,
            price,
        }
    }

    /// Cash deposit into the account of `currency`
    pub fn deposit(time: Timestamp, currency: Currency, amount: f64) -> Self {
        Self::new(time, Asset::cash(currency), TransactionKind::Deposit, amount, 1.0)
    }

    /// Cash withdrawal from the account of `currency`
    pub fn withdraw(time: Timestamp, currency: Currency, amount: f64) -> Self {
        Self::new(time, Asset::cash(currency), TransactionKind::Withdraw, amount, 1.0)
    }

    /// Fee charged in `currency`
    pub fn cost(time: Timestamp, currency: Currency, amount: f64) -> Self {
        Self::new(
            time,
            Asset::cash(currency),
            TransactionKind::TransactionCost,
            amount,
            1.0,
        )
    }

    /// Get total transaction value (price * volume)
    pub fn value(&self) -> f64 {
        self.price * self.volume.abs()
    }

    /// Signed change this transaction applies to its asset's position
    pub fn signed_volume(&self) -> f64 {
        self.kind.position_sign() * self.volume
    }
}

/// One row of a transaction CSV file
#[derive(Debug, Deserialize)]
struct TransactionRecord {
    time: DateTime<Utc>,
    asset_kind: String,
    asset_id: i64,
    currency: String,
    #[serde(default)]
    exchange: String,
    kind: String,
    volume: f64,
    price: Option<f64>,
}

fn parse_asset_kind(name: &str) -> Result<AssetKind> {
    match name.trim().to_ascii_lowercase().as_str() {
        "cash" => Ok(AssetKind::Cash),
        "cost" | "transactioncost" | "transaction_cost" => Ok(AssetKind::TransactionCost),
        "stock" | "equity" => Ok(AssetKind::Stock),
        "future" | "futures" => Ok(AssetKind::Future),
        "option" => Ok(AssetKind::Option),
        other => Err(PortfolioError::DataError(format!(
            "Unknown asset kind: {}",
            other
        ))),
    }
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = PortfolioError;

    fn try_from(record: TransactionRecord) -> Result<Self> {
        let currency = Currency::from_code(&record.currency).ok_or_else(|| {
            PortfolioError::DataError(format!("Unknown currency: {}", record.currency))
        })?;
        let asset_kind = parse_asset_kind(&record.asset_kind)?;
        let asset = if asset_kind.is_cash() {
            Asset::cash(currency)
        } else {
            Asset::new(asset_kind, record.asset_id, currency, record.exchange)
        };
        let kind = TransactionKind::parse(&record.kind);
        if kind == TransactionKind::Unsupported {
            log::warn!("Transaction kind '{}' is not supported", record.kind);
        }
        Ok(Transaction::new(
            record.time,
            asset,
            kind,
            record.volume,
            record.price.unwrap_or(f64::NAN),
        ))
    }
}

/// Load transactions from CSV data
pub fn load_transactions_csv<R: std::io::Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut transactions = Vec::new();
    for record in csv_reader.deserialize::<TransactionRecord>() {
        transactions.push(Transaction::try_from(record?)?);
    }
    Ok(transactions)
}

/// Load transactions from a CSV file
pub fn load_transactions_file(path: &Path) -> Result<Vec<Transaction>> {
    let file = std::fs::File::open(path)?;
    load_transactions_csv(file)
}
