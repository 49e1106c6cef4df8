pub mod certainty;
pub mod limits;
pub mod price;
pub mod trade;

pub use certainty::{Certainty, CloseTrigger};
pub use limits::Limits;
pub use price::{PriceState, TradeMetrics};
pub use trade::{Trade, TradeState};
