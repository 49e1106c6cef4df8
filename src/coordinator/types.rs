use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Limits, Trade};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Log severity understood by the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    System,
    Info,
    Error,
}

/// One structured log line for the coordination service.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub text: String,
    pub level: LogLevel,
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(text: impl Into<String>, level: LogLevel) -> Self {
        Self {
            text: text.into(),
            level,
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, LogLevel::Info)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, LogLevel::Error)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, LogLevel::System)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Buy,
    Sell,
}

/// A buy/sell execution reported back for bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct TradeEvent {
    pub action: EventAction,
    pub basic_token: String,
    pub token: String,
    pub amount: f64,
    /// Buy events report the entry price; sell events the latest price.
    pub price: f64,
    pub profit: f64,
    pub signal: serde_json::Value,
    pub timestamp: String,
}

impl TradeEvent {
    pub fn from_trade(action: EventAction, trade: &Trade) -> Self {
        let price = match action {
            EventAction::Buy => trade.price.buy,
            EventAction::Sell => trade.price.current,
        };
        Self {
            action,
            basic_token: trade.quote.clone(),
            token: trade.base.clone(),
            amount: trade.amount,
            price,
            profit: trade.metrics.profit,
            signal: trade.signal.clone(),
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// A user-forced action on a live trade, polled at a coarse interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedAction {
    None,
    Cancel,
    Sell,
}

impl RequestedAction {
    /// Wire states: 1 = cancel requested, 2 = sell requested; anything
    /// else (including absence) means no action.
    pub fn from_state(state: Option<i64>) -> Self {
        match state {
            Some(1) => RequestedAction::Cancel,
            Some(2) => RequestedAction::Sell,
            _ => RequestedAction::None,
        }
    }
}

/// Identity of the signal that authorized a purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub token: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub basic_token: Option<String>,
}

/// Close limits plus per-quote-asset notional amounts attached to a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    pub limit: Limits,
    /// Quote asset -> amount to spend (zero or missing skips that asset).
    pub token: HashMap<String, f64>,
}

/// Full signal payload pulled from the coordination service. An absent
/// `settings` block means nothing new to act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub signal: Signal,
    #[serde(default)]
    pub settings: Option<SignalSettings>,
}

impl SignalEnvelope {
    /// Opaque payload carried on the trade for event correlation.
    pub fn passthrough(&self) -> serde_json::Value {
        serde_json::json!({ "signal": self.signal })
    }
}
