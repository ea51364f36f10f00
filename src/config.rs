//! Typed configuration loaded from YAML.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! working configuration. `validate()` runs once at startup and is the only
//! fatal error path for tunables.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub anti_detection: AntiDetectionConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

/// Scrape cycle execution tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum parsers rendering pages at the same time.
    #[serde(default = "default_max_concurrent_parsers")]
    pub max_concurrent_parsers: usize,

    /// Hard deadline for a single parser attempt, in seconds.
    #[serde(default = "default_parser_timeout")]
    pub parser_timeout_secs: u64,

    /// Retries after a failed or timed-out attempt.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Random wait before each retry, in seconds (min, max).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: (u64, u64),
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_parsers: default_max_concurrent_parsers(),
            parser_timeout_secs: default_parser_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_max_concurrent_parsers() -> usize {
    2
}

fn default_parser_timeout() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay() -> (u64, u64) {
    (2, 5)
}

/// Anti-detection behavior between page loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiDetectionConfig {
    #[serde(default = "default_true")]
    pub rotate_user_agents: bool,

    #[serde(default = "default_true")]
    pub random_delays: bool,

    /// Random pause between distinct parsers, in seconds (min, max).
    #[serde(default = "default_parser_delay")]
    pub delay_between_parsers_secs: (u64, u64),
}

impl Default for AntiDetectionConfig {
    fn default() -> Self {
        Self {
            rotate_user_agents: true,
            random_delays: true,
            delay_between_parsers_secs: default_parser_delay(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_parser_delay() -> (u64, u64) {
    (5, 10)
}

/// Payload validation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Plausible gold price band in USD per ounce.
    #[serde(default = "default_price_range")]
    pub price_range: (f64, f64),

    /// Largest believable intra-payload price spread, in USD.
    #[serde(default = "default_max_price_change")]
    pub max_price_change: f64,

    /// Oldest acceptable payload age, in minutes.
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: i64,

    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,

    #[serde(default = "default_max_data_points")]
    pub max_data_points: usize,

    /// Cross-source price difference worth reporting, in USD.
    #[serde(default = "default_discrepancy_threshold")]
    pub discrepancy_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            price_range: default_price_range(),
            max_price_change: default_max_price_change(),
            max_age_minutes: default_max_age_minutes(),
            min_data_points: default_min_data_points(),
            max_data_points: default_max_data_points(),
            discrepancy_threshold: default_discrepancy_threshold(),
        }
    }
}

fn default_price_range() -> (f64, f64) {
    (50.0, 2000.0)
}

fn default_max_price_change() -> f64 {
    50.0
}

fn default_max_age_minutes() -> i64 {
    60
}

fn default_min_data_points() -> usize {
    1
}

fn default_max_data_points() -> usize {
    100
}

fn default_discrepancy_threshold() -> f64 {
    5.0
}

/// Source failover thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_api_failure_threshold")]
    pub api_failure_threshold: u32,

    #[serde(default = "default_scraper_failure_threshold")]
    pub scraper_failure_threshold: u32,

    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,

    #[serde(default = "default_scraper_timeout")]
    pub scraper_timeout_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            api_failure_threshold: default_api_failure_threshold(),
            scraper_failure_threshold: default_scraper_failure_threshold(),
            api_timeout_secs: default_api_timeout(),
            scraper_timeout_secs: default_scraper_timeout(),
        }
    }
}

fn default_api_failure_threshold() -> u32 {
    3
}

fn default_scraper_failure_threshold() -> u32 {
    5
}

fn default_api_timeout() -> u64 {
    10
}

fn default_scraper_timeout() -> u64 {
    60
}

/// Browser session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run headless. Set false only for local debugging.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Proxy server URL (e.g. "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            chrome_args: Vec::new(),
        }
    }
}

/// Upstream price API endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// When unset, acquisition runs scraper-only.
    #[serde(default)]
    pub url: Option<String>,
}

impl Config {
    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a path when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.max_concurrent_parsers == 0 {
            return Err(Error::Config(
                "execution.max_concurrent_parsers must be greater than 0".to_string(),
            ));
        }
        if self.execution.parser_timeout_secs == 0 {
            return Err(Error::Config(
                "execution.parser_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.execution.retry_delay_secs.0 > self.execution.retry_delay_secs.1 {
            return Err(Error::Config(
                "execution.retry_delay_secs min exceeds max".to_string(),
            ));
        }
        if self.anti_detection.delay_between_parsers_secs.0
            > self.anti_detection.delay_between_parsers_secs.1
        {
            return Err(Error::Config(
                "anti_detection.delay_between_parsers_secs min exceeds max".to_string(),
            ));
        }
        if self.validation.price_range.0 >= self.validation.price_range.1 {
            return Err(Error::Config(
                "validation.price_range must be (min, max) with min < max".to_string(),
            ));
        }
        if self.fallback.api_failure_threshold == 0 || self.fallback.scraper_failure_threshold == 0
        {
            return Err(Error::Config(
                "fallback failure thresholds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.max_concurrent_parsers, 2);
        assert_eq!(config.execution.parser_timeout_secs, 60);
        assert_eq!(config.fallback.api_failure_threshold, 3);
        assert_eq!(config.fallback.scraper_failure_threshold, 5);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.validation.price_range, (50.0, 2000.0));
        assert!(config.anti_detection.rotate_user_agents);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "execution:\n  max_concurrent_parsers: 4\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.execution.max_concurrent_parsers, 4);
        assert_eq!(config.execution.retry_attempts, 2);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.execution.max_concurrent_parsers = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn inverted_price_band_is_rejected() {
        let mut config = Config::default();
        config.validation.price_range = (2000.0, 50.0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn inverted_retry_delay_is_rejected() {
        let mut config = Config::default();
        config.execution.retry_delay_secs = (5, 2);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
