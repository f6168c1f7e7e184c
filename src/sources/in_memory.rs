//! In-memory collaborator implementations
//!
//! Map-backed sources for tests and for the CLI, which fills them from CSV.

use super::{
    CorporateAction, CorporateActionSource, CurrencyConversionSource, FuturesMetadataSource,
    OptionMetadata, OptionMetadataSource,
};
use crate::asset::Asset;
use crate::currency::Currency;
use crate::error::{PortfolioError, Result};
use crate::types::Timestamp;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

/// Corporate actions by asset, kept sorted by time
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorporateActions {
    actions: HashMap<Asset, Vec<CorporateAction>>,
}

impl InMemoryCorporateActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action; records at the same time keep insertion order
    pub fn add(&mut self, asset: Asset, action: CorporateAction) {
        let list = self.actions.entry(asset).or_default();
        let position = list.partition_point(|existing| existing.time <= action.time);
        list.insert(position, action);
    }

    pub fn count(&self, asset: &Asset) -> usize {
        self.actions.get(asset).map(Vec::len).unwrap_or(0)
    }

    /// Load actions from CSV data
    ///
    /// Format: `time,asset_id,currency,exchange,type,old_volume,new_volume,value`
    /// where `type` is `split` or `dividend`; the asset is a stock.
    pub fn load_from_csv<R: std::io::Read>(&mut self, reader: R) -> Result<usize> {
        #[derive(Deserialize)]
        struct Record {
            time: DateTime<Utc>,
            asset_id: i64,
            currency: String,
            #[serde(default)]
            exchange: String,
            r#type: String,
            old_volume: Option<f64>,
            new_volume: Option<f64>,
            value: Option<f64>,
        }

        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut count = 0;
        for row in csv_reader.deserialize::<Record>() {
            let record = row?;
            let currency = Currency::from_code(&record.currency).ok_or_else(|| {
                PortfolioError::DataError(format!("Unknown currency: {}", record.currency))
            })?;
            let asset = Asset::stock(record.asset_id, currency, record.exchange);
            let value = record.value.unwrap_or(f64::NAN);
            let action = match record.r#type.to_ascii_lowercase().as_str() {
                "split" => {
                    let (old_volume, new_volume) = record
                        .old_volume
                        .zip(record.new_volume)
                        .ok_or_else(|| PortfolioError::DataError("Missing split ratio".into()))?;
                    CorporateAction::split(record.time, old_volume, new_volume, value)
                }
                "dividend" => CorporateAction::dividend(record.time, value),
                other => {
                    log::warn!("Skipping corporate action of unknown type '{}'", other);
                    continue;
                }
            };
            self.add(asset, action);
            count += 1;
        }
        Ok(count)
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        let file = std::fs::File::open(path)?;
        self.load_from_csv(file)
    }
}

impl CorporateActionSource for InMemoryCorporateActions {
    fn actions(
        &self,
        asset: &Asset,
        from_exclusive: Option<Timestamp>,
        to_inclusive: Timestamp,
    ) -> Vec<CorporateAction> {
        self.actions
            .get(asset)
            .map(|list| {
                list.iter()
                    .filter(|action| from_exclusive.map_or(true, |from| action.time > from))
                    .take_while(|action| action.time <= to_inclusive)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// USD rates by currency and time
///
/// A lookup answers with the latest rate at or before the requested time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRates {
    rates: HashMap<Currency, BTreeMap<Timestamp, f64>>,
}

impl InMemoryRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rate: one unit of `currency` is worth `rate` USD from `time` on
    pub fn add_rate(&mut self, currency: Currency, time: Timestamp, rate: f64) {
        self.rates.entry(currency).or_default().insert(time, rate);
    }

    /// Load rates from CSV data
    ///
    /// Format: `time,currency,rate`
    pub fn load_from_csv<R: std::io::Read>(&mut self, reader: R) -> Result<usize> {
        #[derive(Deserialize)]
        struct Record {
            time: DateTime<Utc>,
            currency: String,
            rate: f64,
        }

        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut count = 0;
        for row in csv_reader.deserialize::<Record>() {
            let record = row?;
            let currency = Currency::from_code(&record.currency).ok_or_else(|| {
                PortfolioError::DataError(format!("Unknown currency: {}", record.currency))
            })?;
            self.add_rate(currency, record.time, record.rate);
            count += 1;
        }
        Ok(count)
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        let file = std::fs::File::open(path)?;
        self.load_from_csv(file)
    }
}

impl CurrencyConversionSource for InMemoryRates {
    fn usd_rate(&self, currency: Currency, time: Timestamp) -> f64 {
        if currency.is_usd() {
            return 1.0;
        }
        self.rates
            .get(&currency)
            .and_then(|series| {
                series
                    .range((Bound::Unbounded, Bound::Included(time)))
                    .next_back()
                    .map(|(_, rate)| *rate)
            })
            .unwrap_or(f64::NAN)
    }
}

/// Option terms by option asset
#[derive(Debug, Clone, Default)]
pub struct InMemoryOptions {
    options: HashMap<Asset, OptionMetadata>,
}

impl InMemoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, option: Asset, metadata: OptionMetadata) {
        self.options.insert(option, metadata);
    }
}

impl OptionMetadataSource for InMemoryOptions {
    fn option_metadata(&self, option: &Asset) -> Option<OptionMetadata> {
        self.options.get(option).cloned()
    }
}

/// Futures multipliers by futures asset
#[derive(Debug, Clone, Default)]
pub struct InMemoryFutures {
    multipliers: HashMap<Asset, f64>,
}

impl InMemoryFutures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, future: Asset, multiplier: f64) {
        self.multipliers.insert(future, multiplier);
    }
}

impl FuturesMetadataSource for InMemoryFutures {
    fn multiplier(&self, future: &Asset) -> Option<f64> {
        self.multipliers.get(future).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_actions_window_is_exclusive_inclusive() {
        let asset = Asset::stock(1, Currency::USD, "NYSE");
        let mut source = InMemoryCorporateActions::new();
        source.add(asset.clone(), CorporateAction::dividend(day(5), 0.5));
        source.add(asset.clone(), CorporateAction::dividend(day(2), 0.25));
        source.add(asset.clone(), CorporateAction::split(day(9), 1.0, 2.0, 40.0));

        let all = source.actions(&asset, None, day(31));
        assert_eq!(all.iter().map(|a| a.time).collect::<Vec<_>>(), vec![day(2), day(5), day(9)]);

        let window = source.actions(&asset, Some(day(2)), day(9));
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].time, day(5));

        // Restarting from an earlier time is always allowed
        assert_eq!(source.actions(&asset, None, day(5)).len(), 2);
        assert!(source.actions(&Asset::stock(2, Currency::USD, "NYSE"), None, day(31)).is_empty());
    }

    #[test]
    fn test_rates_use_latest_at_or_before() {
        let mut rates = InMemoryRates::new();
        rates.add_rate(Currency::EUR, day(1), 1.10);
        rates.add_rate(Currency::EUR, day(10), 1.20);
        assert_eq!(rates.usd_rate(Currency::EUR, day(5)), 1.10);
        assert_eq!(rates.usd_rate(Currency::EUR, day(10)), 1.20);
        assert!(rates.usd_rate(Currency::EUR, day(1) - Duration::seconds(1)).is_nan());
    }

    #[test]
    fn test_load_corporate_actions_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time,asset_id,currency,exchange,type,old_volume,new_volume,value").unwrap();
        writeln!(file, "2024-01-05T00:00:00Z,7,USD,NYSE,split,1,2,80").unwrap();
        writeln!(file, "2024-02-05T00:00:00Z,7,USD,NYSE,dividend,,,0.3").unwrap();
        writeln!(file, "2024-03-05T00:00:00Z,7,USD,NYSE,merger,,,").unwrap();

        let mut source = InMemoryCorporateActions::new();
        let loaded = source.load_from_file(file.path()).unwrap();
        assert_eq!(loaded, 2);

        let asset = Asset::stock(7, Currency::USD, "NYSE");
        let actions = source.actions(&asset, None, day(31) + Duration::days(60));
        assert!(actions[0].is_split);
        assert_eq!(actions[0].ratio(), 2.0);
        assert!(!actions[1].is_split);
        assert_eq!(actions[1].dividend_or_price, 0.3);
    }

    #[test]
    fn test_load_rates_from_csv() {
        let data = "time,currency,rate\n2024-01-01T00:00:00Z,EUR,1.1\n";
        let mut rates = InMemoryRates::new();
        assert_eq!(rates.load_from_csv(data.as_bytes()).unwrap(), 1);
        assert_eq!(rates.usd_rate(Currency::EUR, day(2)), 1.1);
    }
}
