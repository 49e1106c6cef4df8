pub mod book;
pub mod filters;

pub use book::{buy_limit_price, sell_limit_price, vwap_for_notional, BookLevel, BookSide};
pub use filters::{round_to_step, LotSizeFilter};
