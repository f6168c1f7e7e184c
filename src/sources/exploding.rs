//! Exploding conversion source - testing stub
//!
//! Panics on any non-USD lookup. Plug it in to prove that a USD-only
//! portfolio is projected without touching currency conversion.

use super::CurrencyConversionSource;
use crate::currency::Currency;
use crate::types::Timestamp;

/// Exploding conversion source
///
/// # Example
/// ```should_panic
/// use rusty_portfolio::currency::Currency;
/// use rusty_portfolio::sources::{CurrencyConversionSource, ExplodingRates};
/// use chrono::Utc;
///
/// let rates = ExplodingRates::new();
/// assert_eq!(rates.usd_rate(Currency::USD, Utc::now()), 1.0);
///
/// // This will panic!
/// rates.usd_rate(Currency::EUR, Utc::now());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplodingRates {
    message: Option<&'static str>,
}

impl ExplodingRates {
    pub fn new() -> Self {
        Self { message: None }
    }

    /// Create with custom panic message
    pub fn with_message(message: &'static str) -> Self {
        Self {
            message: Some(message),
        }
    }
}

impl CurrencyConversionSource for ExplodingRates {
    fn usd_rate(&self, currency: Currency, time: Timestamp) -> f64 {
        if currency.is_usd() {
            return 1.0;
        }
        panic!(
            "{}\n\nAttempted conversion: {} -> USD at {}",
            self.message
                .unwrap_or("Currency conversion not allowed: this portfolio should be USD-only."),
            currency,
            time
        );
    }
}
