pub mod lifecycle;
pub mod monitor;
pub mod orchestrator;

pub use lifecycle::{CloseReason, Lifecycle, TickReport};
pub use monitor::{monitor_trade, MonitorSettings, TradeOutcome};
pub use orchestrator::{FilterCache, Orchestrator, PositionRegistry};
