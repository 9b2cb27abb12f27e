//! # POS Configuration
//!
//! Configuration for a Tally POS installation.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                              │
//! │     TALLY_TEST_MODE=true                                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/tally.toml (Linux)                             │
//! │     ~/Library/Application Support/com.tally.pos/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! name = "Vereinsheim"
//! currency_code = "EUR"
//! currency_symbol = "€"
//! symbol_after = true
//!
//! [database]
//! path = "/var/lib/tally/tally.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [orders]
//! number_attempts = 10
//! test_mode = false
//! user_id = 1
//!
//! [reporting]
//! include_test_orders = false
//!
//! [logging]
//! filter = "info,tally=debug,sqlx=warn"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use tally_core::Money;
use tally_db::DbConfig;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Store Settings
// =============================================================================

/// Shop name and currency presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_name")]
    pub name: String,

    /// ISO 4217 code, e.g. "EUR".
    #[serde(default = "default_currency_code")]
    pub currency_code: String,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Whether the symbol follows the amount ("8.33 €").
    #[serde(default = "default_true")]
    pub symbol_after: bool,
}

fn default_store_name() -> String {
    "Tally POS".to_string()
}

fn default_currency_code() -> String {
    "EUR".to_string()
}

fn default_currency_symbol() -> String {
    "€".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            name: default_store_name(),
            currency_code: default_currency_code(),
            currency_symbol: default_currency_symbol(),
            symbol_after: default_true(),
        }
    }
}

impl StoreSettings {
    /// Formats an amount with the configured currency symbol.
    pub fn format_amount(&self, amount: Money) -> String {
        amount.format_with_symbol(&self.currency_symbol, self.symbol_after)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file; `None` means `tally.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for another terminal's write to finish.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Order Settings
// =============================================================================

/// Settings consumed by the order lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettings {
    /// Random suffixes tried before giving up on an order number.
    #[serde(default = "default_number_attempts")]
    pub number_attempts: u32,

    /// New orders are flagged as test orders and left out of reports.
    #[serde(default)]
    pub test_mode: bool,

    /// Acting user when no identity is supplied on the command line.
    #[serde(default = "default_user_id")]
    pub user_id: i64,
}

fn default_number_attempts() -> u32 {
    10
}

fn default_user_id() -> i64 {
    1
}

impl Default for OrderSettings {
    fn default() -> Self {
        OrderSettings {
            number_attempts: default_number_attempts(),
            test_mode: false,
            user_id: default_user_id(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportingSettings {
    #[serde(default)]
    pub include_test_orders: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,tally=debug,sqlx=warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_log_filter(),
        }
    }
}

// =============================================================================
// POS Config
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PosConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub orders: OrderSettings,

    #[serde(default)]
    pub reporting: ReportingSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl PosConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`tally.toml`); a missing file is not an error
    /// 3. `TALLY_*` environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.orders.number_attempts == 0 {
            return Err(ConfigError::Invalid(
                "orders.number_attempts must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.store.currency_code.len() != 3 {
            return Err(ConfigError::Invalid(format!(
                "store.currency_code must be a 3-letter code, got: {}",
                self.store.currency_code
            )));
        }

        Ok(())
    }

    /// Applies `TALLY_*` overrides from `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(name) = lookup("TALLY_STORE_NAME") {
            self.store.name = name;
        }

        if let Some(value) = lookup("TALLY_TEST_MODE") {
            match parse_bool(&value) {
                Some(on) => self.orders.test_mode = on,
                None => warn!(value = %value, "Ignoring invalid TALLY_TEST_MODE"),
            }
        }

        if let Some(value) = lookup("TALLY_USER_ID") {
            match value.parse::<i64>() {
                Ok(id) => self.orders.user_id = id,
                Err(_) => warn!(value = %value, "Ignoring invalid TALLY_USER_ID"),
            }
        }

        if let Some(value) = lookup("TALLY_ORDER_NUMBER_ATTEMPTS") {
            if let Ok(n) = value.parse::<u32>() {
                self.orders.number_attempts = n;
            }
        }

        if let Some(value) = lookup("TALLY_BUSY_TIMEOUT_MS") {
            if let Ok(ms) = value.parse::<u64>() {
                self.database.busy_timeout_ms = ms;
            }
        }

        if let Some(value) = lookup("TALLY_INCLUDE_TEST_ORDERS") {
            if let Some(on) = parse_bool(&value) {
                self.reporting.include_test_orders = on;
            }
        }

        if let Some(filter) = lookup("TALLY_LOG") {
            self.logging.filter = filter;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    /// The configured database path, or `tally.db` in the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| {
                directories::ProjectDirs::from("com", "tally", "pos")
                    .map(|dirs| dirs.data_dir().join("tally.db"))
            })
            .unwrap_or_else(|| PathBuf::from("tally.db"))
    }

    /// Pool settings for `tally-db`.
    pub fn db_config(&self) -> DbConfig {
        let path = self.database_path();
        if path.as_os_str() == tally_db::pool::IN_MEMORY_PATH {
            return DbConfig::in_memory();
        }
        DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = PosConfig::default();
        assert_eq!(config.orders.number_attempts, 10);
        assert!(!config.orders.test_mode);
        assert!(!config.reporting.include_test_orders);
        assert_eq!(config.logging.filter, "info,tally=debug,sqlx=warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PosConfig = toml::from_str(
            r#"
            [orders]
            test_mode = true

            [database]
            path = "/tmp/shop.db"
            "#,
        )
        .unwrap();

        assert!(config.orders.test_mode);
        assert_eq!(config.orders.number_attempts, 10);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.store.currency_code, "EUR");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TALLY_DB_PATH", "/data/tally.db"),
            ("TALLY_TEST_MODE", "yes"),
            ("TALLY_USER_ID", "7"),
            ("TALLY_BUSY_TIMEOUT_MS", "250"),
            ("TALLY_INCLUDE_TEST_ORDERS", "nope"),
        ]
        .into_iter()
        .collect();

        let mut config = PosConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, Some(PathBuf::from("/data/tally.db")));
        assert!(config.orders.test_mode);
        assert_eq!(config.orders.user_id, 7);
        assert_eq!(config.db_config().busy_timeout, Duration::from_millis(250));
        // Unparseable values leave the setting alone
        assert!(!config.reporting.include_test_orders);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PosConfig::default();
        config.orders.number_attempts = 0;
        assert!(config.validate().is_err());

        config.orders.number_attempts = 3;
        config.store.currency_code = "EURO".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_amount() {
        let store = StoreSettings::default();
        assert_eq!(store.format_amount(Money::from_cents(833)), "8.33 €");
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&PosConfig::default()).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[orders]"));
    }
}
