pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod pricing;

pub use config::AppConfig;
pub use coordinator::{CoordinatorClient, LogEntry, LogLevel, RequestedAction, SignalEnvelope};
pub use domain::{Certainty, CloseTrigger, Limits, PriceState, Trade, TradeMetrics, TradeState};
pub use engine::{CloseReason, Lifecycle, MonitorSettings, Orchestrator, TickReport, TradeOutcome};
pub use error::{Result, SpotterError};
pub use exchange::{build_exchange, ExchangeClient, ExchangeKind, Fill};
pub use pricing::{round_to_step, BookLevel, BookSide, LotSizeFilter};
