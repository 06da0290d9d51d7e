use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{DEFAULT_BROWSER_DEBUG_URL, DEFAULT_SEARCH_BASE_URL};
use crate::harvest::HarvestConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Search
    pub search_keyword: String,
    pub search_base_url: String,

    // Database
    pub database_path: PathBuf,

    // Browser
    pub browser_debug_url: String,

    // Comment list polling
    pub poll_interval: Duration,
    pub stall_threshold: Duration,
    pub refresh_threshold: Duration,
    pub scroll_step_px: i64,
    pub jostle_step_px: i64,
    pub retry_delay: Duration,
    pub refresh_cooldown: Duration,

    // Navigation waits
    pub context_settle: Duration,
    pub detail_timeout: Duration,
    pub search_timeout: Duration,
    pub page_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let search_keyword = required_env("SEARCH_KEYWORD")?;
        let database_path = optional_env("DATABASE_PATH")
            .map_or_else(|| default_database_path(&search_keyword), PathBuf::from);

        Ok(Self {
            // Search
            search_base_url: env_or_default("SEARCH_BASE_URL", DEFAULT_SEARCH_BASE_URL),
            search_keyword,

            // Database
            database_path,

            // Browser
            browser_debug_url: env_or_default("BROWSER_DEBUG_URL", DEFAULT_BROWSER_DEBUG_URL),

            // Comment list polling
            poll_interval: Duration::from_millis(parse_env_u64("POLL_INTERVAL_MS", 300)?),
            stall_threshold: Duration::from_secs(parse_env_u64("STALL_THRESHOLD_SECS", 60)?),
            refresh_threshold: Duration::from_secs(parse_env_u64("REFRESH_THRESHOLD_SECS", 120)?),
            scroll_step_px: parse_env_i64("SCROLL_STEP_PX", 200)?,
            jostle_step_px: parse_env_i64("JOSTLE_STEP_PX", 500)?,
            retry_delay: Duration::from_millis(parse_env_u64("RETRY_DELAY_MS", 1000)?),
            refresh_cooldown: Duration::from_secs(parse_env_u64("REFRESH_COOLDOWN_SECS", 5)?),

            // Navigation waits
            context_settle: Duration::from_millis(parse_env_u64("CONTEXT_SETTLE_MS", 2000)?),
            detail_timeout: Duration::from_secs(parse_env_u64("DETAIL_TIMEOUT_SECS", 30)?),
            search_timeout: Duration::from_secs(parse_env_u64("SEARCH_TIMEOUT_SECS", 10)?),
            page_timeout: Duration::from_secs(parse_env_u64("PAGE_TIMEOUT_SECS", 15)?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_keyword.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SEARCH_KEYWORD".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.scroll_step_px <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCROLL_STEP_PX".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.jostle_step_px <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "JOSTLE_STEP_PX".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.refresh_threshold.is_zero() || self.stall_threshold.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "STALL_THRESHOLD_SECS/REFRESH_THRESHOLD_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Tunables for the harvesting pipeline.
    #[must_use]
    pub fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig {
            poll_interval: self.poll_interval,
            stall_threshold: self.stall_threshold,
            refresh_threshold: self.refresh_threshold,
            scroll_step_px: self.scroll_step_px,
            jostle_step_px: self.jostle_step_px,
            retry_delay: self.retry_delay,
            refresh_cooldown: self.refresh_cooldown,
            context_settle: self.context_settle,
            detail_timeout: self.detail_timeout,
            search_timeout: self.search_timeout,
            page_timeout: self.page_timeout,
        }
    }
}

/// Results store named after the keyword, e.g. `foo bar` -> `foo_bar.db`.
fn default_database_path(keyword: &str) -> PathBuf {
    PathBuf::from(format!("{}.db", keyword.trim().replace(' ', "_")))
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_path() {
        assert_eq!(
            default_database_path("乌克兰 俄罗斯"),
            PathBuf::from("乌克兰_俄罗斯.db")
        );
        assert_eq!(default_database_path(" rust "), PathBuf::from("rust.db"));
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(parse_env_u64("NONEXISTENT_VAR", 120).unwrap(), 120);
        assert_eq!(parse_env_i64("NONEXISTENT_VAR", -500).unwrap(), -500);
    }

    #[test]
    fn test_harvest_config_carries_thresholds() {
        let config = Config {
            search_keyword: "rust".to_string(),
            search_base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
            database_path: PathBuf::from("rust.db"),
            browser_debug_url: DEFAULT_BROWSER_DEBUG_URL.to_string(),
            poll_interval: Duration::from_millis(300),
            stall_threshold: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(120),
            scroll_step_px: 200,
            jostle_step_px: 500,
            retry_delay: Duration::from_secs(1),
            refresh_cooldown: Duration::from_secs(5),
            context_settle: Duration::from_secs(2),
            detail_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(10),
            page_timeout: Duration::from_secs(15),
        };
        assert!(config.validate().is_ok());

        let harvest = config.harvest_config();
        assert_eq!(harvest, HarvestConfig::default());

        let invalid = Config {
            scroll_step_px: 0,
            ..config
        };
        assert!(invalid.validate().is_err());
    }
}
