//! Database configuration via `tally.toml`
//!
//! On first open, a default `tally.toml` is created in the data directory.
//! To change settings, edit the file and reopen.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_core::{DateBasis, TallyError, TallyResult};
use tally_durability::DurabilityMode;

use super::transactions::RetryConfig;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "tally.toml";

/// Database configuration loaded from `tally.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// date_basis = "utc"
///
/// [retry]
/// max_retries = 200
/// base_delay_ms = 1
/// max_delay_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Calendar used to derive case ID date prefixes: `"utc"` or `"local"`.
    #[serde(default = "default_date_basis_str")]
    pub date_basis: String,
    /// Retry policy for contended read-modify-write transactions.
    #[serde(default = "RetryConfig::contention")]
    pub retry: RetryConfig,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_date_basis_str() -> String {
    DateBasis::Utc.to_string()
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            date_basis: default_date_basis_str(),
            retry: RetryConfig::contention(),
        }
    }
}

impl TallyConfig {
    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> TallyResult<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::standard_default()),
            "always" => Ok(DurabilityMode::Always),
            other => Err(TallyError::invalid_input(format!(
                "Invalid durability mode '{}' in tally.toml. Expected \"standard\" or \"always\".",
                other
            ))),
        }
    }

    /// Parse the date basis string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"utc"` or `"local"`.
    pub fn date_basis(&self) -> TallyResult<DateBasis> {
        self.date_basis.parse()
    }

    /// Check every field parses.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first bad field.
    pub fn validate(&self) -> TallyResult<()> {
        self.durability_mode()?;
        self.date_basis()?;
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(TallyError::invalid_input(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tally database configuration
#
# Durability mode: "standard" (default) or "always"
#   "standard" = flush every commit, fsync every 64 commits
#   "always"   = fsync every commit, zero data loss on power failure
durability = "standard"

# Calendar for case ID date prefixes: "utc" (default) or "local"
date_basis = "utc"

# Retry policy for the per-day counter transaction.
# Many reporters submitting at once all contend on one document,
# so the budget is large and the backoff short.
[retry]
max_retries = 200
base_delay_ms = 1
max_delay_ms = 50
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> TallyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TallyError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: TallyConfig = toml::from_str(&content).map_err(|e| {
            TallyError::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_default_if_missing(path: &Path) -> TallyResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                TallyError::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_to_file(&self, path: &Path) -> TallyResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TallyError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            TallyError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_standard_utc() {
        let config = TallyConfig::default();
        assert!(matches!(
            config.durability_mode().unwrap(),
            DurabilityMode::Standard { .. }
        ));
        assert_eq!(config.date_basis().unwrap(), DateBasis::Utc);
        assert_eq!(config.retry, RetryConfig::contention());
    }

    #[test]
    fn parse_always_local() {
        let config: TallyConfig =
            toml::from_str("durability = \"always\"\ndate_basis = \"local\"").unwrap();
        assert_eq!(config.durability_mode().unwrap(), DurabilityMode::Always);
        assert_eq!(config.date_basis().unwrap(), DateBasis::Local);
    }

    #[test]
    fn parse_invalid_values_return_errors() {
        let config: TallyConfig = toml::from_str("durability = \"turbo\"").unwrap();
        assert!(config.durability_mode().is_err());
        assert!(config.validate().is_err());

        let config: TallyConfig = toml::from_str("date_basis = \"mars\"").unwrap();
        assert!(matches!(
            config.validate(),
            Err(TallyError::InvalidInput { .. })
        ));
    }

    #[test]
    fn partial_retry_table_fills_defaults() {
        let config: TallyConfig = toml::from_str("[retry]\nmax_retries = 5").unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1);
        assert_eq!(config.retry.max_delay_ms, 50);
    }

    #[test]
    fn inverted_retry_delays_are_rejected() {
        let config: TallyConfig =
            toml::from_str("[retry]\nbase_delay_ms = 100\nmax_delay_ms = 10").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_toml_parses_to_default() {
        let config: TallyConfig = toml::from_str(TallyConfig::default_toml()).unwrap();
        assert_eq!(config, TallyConfig::default());
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        TallyConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(TallyConfig::from_file(&path).unwrap(), TallyConfig::default());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "durability = \"always\"\n").unwrap();

        TallyConfig::write_default_if_missing(&path).unwrap();

        let config = TallyConfig::from_file(&path).unwrap();
        assert_eq!(config.durability, "always");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();

        assert_eq!(TallyConfig::from_file(&path).unwrap(), TallyConfig::default());
    }

    #[test]
    fn malformed_file_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "durability = [").unwrap();

        assert!(matches!(
            TallyConfig::from_file(&path),
            Err(TallyError::InvalidInput { .. })
        ));
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = TallyConfig {
            durability: "always".to_string(),
            date_basis: "local".to_string(),
            retry: RetryConfig::new().with_max_retries(9),
        };

        config.write_to_file(&path).unwrap();
        assert_eq!(TallyConfig::from_file(&path).unwrap(), config);
    }
}
