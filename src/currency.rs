//! Currency codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency enumeration (ISO 4217 codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound Sterling
    GBP,
    /// Japanese Yen
    JPY,
    /// Swiss Franc
    CHF,
    /// Australian Dollar
    AUD,
    /// Canadian Dollar
    CAD,
    /// Chinese Yuan
    CNY,
    /// Hong Kong Dollar
    HKD,
    /// Singapore Dollar
    SGD,
}

impl Currency {
    /// Get ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::CNY => "CNY",
            Currency::HKD => "HKD",
            Currency::SGD => "SGD",
        }
    }

    /// Parse from ISO code
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "JPY" => Some(Currency::JPY),
            "CHF" => Some(Currency::CHF),
            "AUD" => Some(Currency::AUD),
            "CAD" => Some(Currency::CAD),
            "CNY" => Some(Currency::CNY),
            "HKD" => Some(Currency::HKD),
            "SGD" => Some(Currency::SGD),
            _ => None,
        }
    }

    /// Stable non-negative number used as the id of this currency's cash asset
    pub fn ordinal(&self) -> i64 {
        *self as i64
    }

    /// Whether this is the consolidation currency
    pub fn is_usd(&self) -> bool {
        matches!(self, Currency::USD)
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code() {
        assert_eq!(Currency::USD.code(), "USD");
        assert_eq!(Currency::EUR.code(), "EUR");
        assert_eq!(format!("{}", Currency::JPY), "JPY");
    }

    #[test]
    fn test_currency_from_code() {
        assert_eq!(Currency::from_code("USD"), Some(Currency::USD));
        assert_eq!(Currency::from_code(" eur "), Some(Currency::EUR));
        assert_eq!(Currency::from_code("INVALID"), None);
    }

    #[test]
    fn test_ordinals_are_distinct_and_non_negative() {
        assert_eq!(Currency::USD.ordinal(), 0);
        assert!(Currency::SGD.ordinal() > Currency::EUR.ordinal());
        assert!(Currency::USD.is_usd());
        assert!(!Currency::GBP.is_usd());
    }
}
