//! Configuration management for sentinel.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "sentinel";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "sentinel.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SENTINEL_`, `__` between sections)
/// 2. TOML config file at `~/.config/sentinel/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Rule thresholds and loop timing.
    pub agent: AgentConfig,
    /// Threshold adaptation.
    pub learning: LearningConfig,
    /// Synthetic transaction stream.
    pub generator: GeneratorConfig,
    /// Historical dataset import.
    pub dataset: DatasetConfig,
    /// HTTP dashboard.
    pub server: ServerConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/sentinel/sentinel.db`
    pub database_path: Option<PathBuf>,
    /// Maximum number of transactions to retain.
    /// Set to 0 for unlimited.
    pub max_transactions: usize,
    /// Maximum number of agent log entries to retain.
    /// Set to 0 for unlimited.
    pub max_log_entries: usize,
}

/// Agent rule and loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Risk score above which a processed transaction is investigated.
    pub high_risk_threshold: u32,
    /// Initial fraud probability cutoff, also restored on reset.
    pub fraud_threshold: f64,
    /// Retry count above which a failed transaction counts as banking spam.
    pub retry_count_threshold: u32,
    /// Error codes matching this regex count as banking spam regardless of retries.
    pub auth_failure_pattern: String,
    /// Interval between agent cycles in milliseconds.
    pub loop_interval_ms: u64,
    /// Smallest synthetic batch observed per cycle.
    pub batch_min: usize,
    /// Largest synthetic batch observed per cycle.
    pub batch_max: usize,
    /// Maximum number of unevaluated transactions judged per cycle.
    pub evaluation_window: usize,
    /// More actions than this are logged as a single summary entry.
    pub action_log_group_limit: usize,
    /// Start the loop as soon as the server comes up.
    pub autostart: bool,
}

/// How the fraud threshold adapts between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningMode {
    /// Occasional random nudges within fixed bounds.
    #[default]
    RandomWalk,
    /// Nudges driven by investigation outcomes.
    Feedback,
}

/// Threshold adaptation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Adaptation strategy.
    pub mode: LearningMode,
    /// Probability that a random-walk adjustment happens in a cycle.
    pub adjust_probability: f64,
    /// Size of a single threshold adjustment.
    pub step: f64,
    /// Lower bound for random-walk adjustments.
    pub min_threshold: f64,
    /// Upper bound for random-walk adjustments.
    pub max_threshold: f64,
    /// Number of recent closed investigations considered by feedback mode.
    pub feedback_window: usize,
    /// How far one outcome count must exceed the other before adjusting.
    pub feedback_margin: usize,
    /// Lower bound for feedback adjustments.
    pub feedback_min_threshold: f64,
    /// Upper bound for feedback adjustments.
    pub feedback_max_threshold: f64,
    /// Probability that a triaged investigation turns out to be a false alarm.
    pub resolve_probability: f64,
}

/// Synthetic transaction stream configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
    /// Probability that a generated transaction is banking spam.
    pub spam_rate: f64,
    /// Probability that a generated transaction is fraudulent.
    pub fraud_rate: f64,
    /// Smallest generated amount.
    pub amount_min: f64,
    /// Largest generated amount.
    pub amount_max: f64,
    /// Merchant names to draw from.
    pub merchants: Vec<String>,
    /// Bank names to draw from.
    pub banks: Vec<String>,
    /// Payment methods to draw from.
    pub payment_methods: Vec<String>,
    /// Error codes attached to spam transactions.
    pub error_codes: Vec<String>,
}

/// Historical dataset configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// CSV files imported when the store is empty.
    pub paths: Vec<PathBuf>,
    /// Synthetic records generated as initial history.
    pub backfill: usize,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the dashboard listens on.
    pub bind: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            max_transactions: 10_000,
            max_log_entries: 1_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: 20,
            fraud_threshold: 0.8,
            retry_count_threshold: 3,
            auth_failure_pattern: "AUTH(ENTICATION)?_FAIL".to_string(),
            loop_interval_ms: 2_000,
            batch_min: 2,
            batch_max: 5,
            evaluation_window: 100,
            action_log_group_limit: 3,
            autostart: false,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            mode: LearningMode::RandomWalk,
            adjust_probability: 0.2,
            step: 0.01,
            min_threshold: 0.5,
            max_threshold: 0.99,
            feedback_window: 20,
            feedback_margin: 2,
            feedback_min_threshold: 0.6,
            feedback_max_threshold: 0.95,
            resolve_probability: 0.7,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            spam_rate: 0.25,
            fraud_rate: 0.15,
            amount_min: 10.0,
            amount_max: 5_000.0,
            merchants: to_strings(&["Amazon", "Walmart", "Apple", "Netflix", "Uber", "Airbnb"]),
            banks: to_strings(&["HDFC", "SBI", "Axis", "ICICI", "Chase"]),
            payment_methods: to_strings(&["Card", "UPI", "NetBanking"]),
            error_codes: to_strings(&[
                "UPI_AUTHENTICATION_FAILED",
                "INSUFFICIENT_FUNDS",
                "BANK_SERVER_ERROR",
                "RISK_CHECK_FAILED",
            ]),
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            paths: vec![
                PathBuf::from("attached_assets").join("fraud_data.csv"),
                PathBuf::from("..")
                    .join("datasettt")
                    .join("fraud_data_20251225_004640.csv"),
            ],
            backfill: 20,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::ConfigValidation {
            message: format!("{name} must be between 0 and 1, got {value}"),
        })
    }
}

fn check_bounds(min_name: &str, min: f64, max_name: &str, max: f64) -> Result<()> {
    check_probability(min_name, min)?;
    check_probability(max_name, max)?;
    if min > max {
        return Err(Error::ConfigValidation {
            message: format!("{min_name} ({min}) cannot be greater than {max_name} ({max})"),
        });
    }
    Ok(())
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `SENTINEL_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SENTINEL_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        check_probability("agent.fraud_threshold", self.agent.fraud_threshold)?;

        if self.agent.loop_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "loop_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.agent.batch_min > self.agent.batch_max || self.agent.batch_max == 0 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "batch_min ({}) cannot be greater than batch_max ({}), and batch_max must be positive",
                    self.agent.batch_min, self.agent.batch_max
                ),
            });
        }

        if self.agent.evaluation_window == 0 {
            return Err(Error::ConfigValidation {
                message: "evaluation_window must be greater than 0".to_string(),
            });
        }

        if regex::Regex::new(&self.agent.auth_failure_pattern).is_err() {
            return Err(Error::ConfigValidation {
                message: format!(
                    "invalid regex pattern: {}",
                    self.agent.auth_failure_pattern
                ),
            });
        }

        let learning = &self.learning;
        check_probability("learning.adjust_probability", learning.adjust_probability)?;
        check_probability("learning.resolve_probability", learning.resolve_probability)?;
        check_bounds(
            "learning.min_threshold",
            learning.min_threshold,
            "learning.max_threshold",
            learning.max_threshold,
        )?;
        check_bounds(
            "learning.feedback_min_threshold",
            learning.feedback_min_threshold,
            "learning.feedback_max_threshold",
            learning.feedback_max_threshold,
        )?;
        if !(learning.step > 0.0 && learning.step < 1.0) {
            return Err(Error::ConfigValidation {
                message: format!("learning.step must be in (0, 1), got {}", learning.step),
            });
        }

        let generator = &self.generator;
        check_probability("generator.spam_rate", generator.spam_rate)?;
        check_probability("generator.fraud_rate", generator.fraud_rate)?;
        if !(generator.amount_min >= 0.0 && generator.amount_min < generator.amount_max) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "amount_min ({}) must be non-negative and less than amount_max ({})",
                    generator.amount_min, generator.amount_max
                ),
            });
        }
        for (name, list) in [
            ("merchants", &generator.merchants),
            ("banks", &generator.banks),
            ("payment_methods", &generator.payment_methods),
            ("error_codes", &generator.error_codes),
        ] {
            if list.is_empty() {
                return Err(Error::ConfigValidation {
                    message: format!("generator.{name} must not be empty"),
                });
            }
        }

        self.bind_addr()?;

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Parse the configured bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid bind address: {}", self.server.bind),
            })
    }

    /// Get the loop interval as a Duration.
    #[must_use]
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.agent.loop_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.agent.high_risk_threshold, 20);
        assert!((config.agent.fraud_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.agent.retry_count_threshold, 3);
        assert_eq!(config.learning.mode, LearningMode::RandomWalk);
        assert!(!config.agent.autostart);
    }

    #[test]
    fn test_default_storage_config() {
        let storage = StorageConfig::default();

        assert!(storage.database_path.is_none());
        assert_eq!(storage.max_transactions, 10_000);
        assert_eq!(storage.max_log_entries, 1_000);
    }

    #[test]
    fn test_default_learning_config() {
        let learning = LearningConfig::default();

        assert!((learning.adjust_probability - 0.2).abs() < f64::EPSILON);
        assert!((learning.step - 0.01).abs() < f64::EPSILON);
        assert!((learning.min_threshold - 0.5).abs() < f64::EPSILON);
        assert!((learning.max_threshold - 0.99).abs() < f64::EPSILON);
        assert_eq!(learning.feedback_window, 20);
        assert_eq!(learning.feedback_margin, 2);
    }

    #[test]
    fn test_default_generator_config() {
        let generator = GeneratorConfig::default();

        assert!(generator.seed.is_none());
        assert_eq!(generator.merchants.len(), 6);
        assert_eq!(generator.banks.len(), 5);
        assert!(generator
            .error_codes
            .contains(&"UPI_AUTHENTICATION_FAILED".to_string()));
    }

    #[test]
    fn test_default_dataset_config() {
        let dataset = DatasetConfig::default();
        assert_eq!(dataset.paths.len(), 2);
        assert_eq!(dataset.backfill, 20);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_loop_interval() {
        let mut config = Config::default();
        config.agent.loop_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("loop_interval_ms"));
    }

    #[test]
    fn test_validate_inverted_batch() {
        let mut config = Config::default();
        config.agent.batch_min = 6;
        config.agent.batch_max = 2;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("batch_min"));
    }

    #[test]
    fn test_validate_invalid_regex() {
        let mut config = Config::default();
        config.agent.auth_failure_pattern = "[invalid".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = Config::default();
        config.agent.fraud_threshold = 1.5;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("fraud_threshold"));
    }

    #[test]
    fn test_validate_inverted_learning_bounds() {
        let mut config = Config::default();
        config.learning.min_threshold = 0.9;
        config.learning.max_threshold = 0.6;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_threshold"));
    }

    #[test]
    fn test_validate_empty_merchants() {
        let mut config = Config::default();
        config.generator.merchants.clear();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("merchants"));
    }

    #[test]
    fn test_validate_bad_bind() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bind address"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("sentinel.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_loop_interval() {
        let config = Config::default();
        assert_eq!(config.loop_interval(), Duration::from_millis(2_000));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("sentinel"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[agent]\nhigh_risk_threshold = 50\n\n[learning]\nmode = \"feedback\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.agent.high_risk_threshold, 50);
        assert_eq!(config.learning.mode, LearningMode::Feedback);
        assert_eq!(config.agent.retry_count_threshold, 3);
    }

    #[test]
    fn test_learning_mode_serde() {
        let json = serde_json::to_string(&LearningMode::RandomWalk).unwrap();
        assert_eq!(json, "\"random_walk\"");
        let mode: LearningMode = serde_json::from_str("\"feedback\"").unwrap();
        assert_eq!(mode, LearningMode::Feedback);
    }

    #[test]
    fn test_storage_config_deserialize() {
        let json = r#"{"max_transactions": 500}"#;
        let storage: StorageConfig = serde_json::from_str(json).unwrap();
        assert_eq!(storage.max_transactions, 500);
        assert_eq!(storage.max_log_entries, 1_000);
    }
}
