use thiserror::Error;

use crate::exchange::ExchangeKind;

/// Main error type for the trading agent
#[derive(Error, Debug)]
pub enum SpotterError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Exchange errors
    #[error("Exchange {venue} error: {reason}")]
    Exchange { venue: ExchangeKind, reason: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Pair not found: {pair}")]
    PairNotFound { pair: String },

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    // Order sizing errors
    #[error("Order quantity rejected: requested {requested}, rounded {rounded}")]
    QuantityRejected { requested: f64, rounded: f64 },

    // Order execution errors
    #[error("Order {order_id} unconfirmed: submitted {submitted}, filled {filled}")]
    FillUnconfirmed {
        order_id: String,
        submitted: f64,
        filled: f64,
    },

    // Signal admission errors
    #[error("Insufficient balance for {asset}: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: String,
        requested: f64,
        available: f64,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SpotterError {
    /// Recoverable errors leave the trade in its current state and may be
    /// retried on a later tick; everything else is fatal for the operation
    /// that raised it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SpotterError::QuantityRejected { .. } | SpotterError::PairNotFound { .. }
        )
    }
}

/// Result type alias for SpotterError
pub type Result<T> = std::result::Result<T, SpotterError>;
