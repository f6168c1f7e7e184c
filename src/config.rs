//! Engine configuration

use crate::error::{PortfolioError, Result};
use crate::types::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration
///
/// ```toml
/// end = "2024-12-31T23:59:59Z"
/// retain_history = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inclusive horizon; nothing later is processed
    pub end: Timestamp,
    /// Keep every event for traversal (false = point-query mode)
    pub retain_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            end: DateTime::<Utc>::MAX_UTC,
            retain_history: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-query configuration ending at `end`
    pub fn point_in_time(end: Timestamp) -> Self {
        Self {
            end,
            retain_history: false,
        }
    }

    pub fn with_end(mut self, end: Timestamp) -> Self {
        self.end = end;
        self
    }

    pub fn with_retain_history(mut self, retain_history: bool) -> Self {
        self.retain_history = retain_history;
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| PortfolioError::ConfigError(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.retain_history);
        assert_eq!(config.end, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("retain_history = false").unwrap();
        assert!(!config.retain_history);
        assert_eq!(config.end, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "end = \"2024-12-31T23:59:59Z\"").unwrap();
        let config = EngineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.end, Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_invalid_toml() {
        let err = EngineConfig::from_toml_str("end = 5").unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigError(_)));
    }
}
