//! Remote coordination service client.
//!
//! The coordination service issues buy signals, receives structured logs
//! and trade events, and tracks per-trade cancel/sell requests from the
//! user. Log and event posting is best-effort telemetry: failures are
//! logged locally and swallowed, never surfaced into trading logic.

mod client;
mod types;

pub use client::CoordinatorClient;
pub use types::{
    EventAction, LogEntry, LogLevel, RequestedAction, Signal, SignalEnvelope, SignalSettings,
    TradeEvent,
};
