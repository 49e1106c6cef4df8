use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::exchange::ExchangeCredentials;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub exchanges: ExchangesConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Base URL of the coordination service API
    pub api_url: String,
    /// API key sent in the auth header
    pub api_key: String,
    /// Client identity; a fresh UUID is registered when absent
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Per-venue API credentials; a venue without credentials is not traded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangesConfig {
    #[serde(default)]
    pub binance: Option<ExchangeCredentials>,
    #[serde(default)]
    pub bittrex: Option<ExchangeCredentials>,
    #[serde(default)]
    pub kucoin: Option<ExchangeCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Pause between ticks in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Consecutive confirming ticks required before a close is trusted
    #[serde(default = "default_certainty_limit")]
    pub certainty_limit: u32,
    /// Ceiling on concurrently open positions
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Fractional price deviation for emulated market orders (0.1 = 10%)
    #[serde(default = "default_deviation")]
    pub deviation: f64,
    /// Exchange fee fraction withheld when sizing a sell (0.001 = 0.1%)
    #[serde(default = "default_sell_fee_rate")]
    pub sell_fee_rate: f64,
    /// Poll the coordinator for user actions every N ticks
    #[serde(default = "default_action_poll_ticks")]
    pub action_poll_ticks: u32,
    /// Post a heartbeat log every N orchestrator ticks
    #[serde(default = "default_heartbeat_ticks")]
    pub heartbeat_ticks: u32,
    /// Wait before confirming an emulated order fill, milliseconds
    #[serde(default = "default_confirm_wait_ms")]
    pub confirm_wait_ms: u64,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_certainty_limit() -> u32 {
    3
}

fn default_max_open_positions() -> usize {
    5
}

fn default_deviation() -> f64 {
    0.1
}

fn default_sell_fee_rate() -> f64 {
    0.001
}

fn default_action_poll_ticks() -> u32 {
    30
}

fn default_heartbeat_ticks() -> u32 {
    120
}

fn default_confirm_wait_ms() -> u64 {
    2000
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            certainty_limit: default_certainty_limit(),
            max_open_positions: default_max_open_positions(),
            deviation: default_deviation(),
            sell_fee_rate: default_sell_fee_rate(),
            action_poll_ticks: default_action_poll_ticks(),
            heartbeat_ticks: default_heartbeat_ticks(),
            confirm_wait_ms: default_confirm_wait_ms(),
        }
    }
}

impl TradingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn confirm_wait(&self) -> Duration {
        Duration::from_millis(self.confirm_wait_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from an optional file plus `SPOTTER_*`
    /// environment overrides (`SPOTTER_COORDINATOR__API_KEY`, etc.).
    pub fn load<P: AsRef<Path>>(config_file: Option<P>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path.as_ref()).required(true));
        } else {
            builder = builder.add_source(File::with_name("config/spotter").required(false));
        }

        builder
            .add_source(
                Environment::with_prefix("SPOTTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trading.certainty_limit == 0 {
            errors.push("trading.certainty_limit must be at least 1".to_string());
        }
        if self.trading.max_open_positions == 0 {
            errors.push("trading.max_open_positions must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.trading.deviation) {
            errors.push("trading.deviation must be in [0, 1)".to_string());
        }
        if !(0.0..1.0).contains(&self.trading.sell_fee_rate) {
            errors.push("trading.sell_fee_rate must be in [0, 1)".to_string());
        }
        if self.coordinator.api_url.is_empty() {
            errors.push("coordinator.api_url must be set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
