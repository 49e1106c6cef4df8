use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[cfg(test)]
use mockall::automock;

use crate::error::{Result, SpotterError};
use crate::pricing::{BookLevel, BookSide, LotSizeFilter};

/// Supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Binance,
    Bittrex,
    Kucoin,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Bittrex => "bittrex",
            Self::Kucoin => "kucoin",
        }
    }

    /// Venue-specific pair symbol for a base/quote asset pair.
    pub fn pair_symbol(&self, base: &str, quote: &str) -> String {
        match self {
            Self::Binance => format!("{}{}", base, quote),
            Self::Bittrex => format!("{}-{}", quote, base),
            Self::Kucoin => format!("{}-{}", base, quote),
        }
    }

    /// Whether the venue accepts true market orders; the others emulate
    /// them with book-walked aggressive limit orders.
    pub fn has_native_market_orders(&self) -> bool {
        matches!(self, Self::Binance)
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "bittrex" => Ok(Self::Bittrex),
            "kucoin" => Ok(Self::Kucoin),
            _ => Err("invalid exchange; expected binance|bittrex|kucoin"),
        }
    }
}

pub fn parse_exchange_kind(raw: &str) -> Result<ExchangeKind> {
    ExchangeKind::from_str(raw).map_err(|e| SpotterError::Internal(e.to_string()))
}

/// Confirmed full fill of a market (or market-emulating) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    /// Volume-weighted average execution price; zero when the venue did
    /// not report one.
    pub avg_price: f64,
    pub filled_qty: f64,
}

/// Per-venue exchange connectivity.
///
/// `market_buy`/`market_sell` only return once the venue confirms a FULL
/// fill; a partial or unconfirmed fill after the venue's wait budget
/// surfaces as `FillUnconfirmed` and is never silently retried.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Best current trade price for the pair.
    async fn ticker_price(&self, pair: &str) -> Result<f64>;

    /// Order-book snapshot for one side, best price first.
    async fn order_book(&self, pair: &str, side: BookSide) -> Result<Vec<BookLevel>>;

    async fn market_buy(&self, pair: &str, qty: f64) -> Result<Fill>;

    async fn market_sell(&self, pair: &str, qty: f64) -> Result<Fill>;

    /// Available balance per asset.
    async fn balances(&self) -> Result<HashMap<String, f64>>;

    /// Lot-size constraints for every tradable pair on the venue.
    async fn lot_filters(&self) -> Result<HashMap<String, LotSizeFilter>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_symbols_follow_venue_conventions() {
        assert_eq!(ExchangeKind::Binance.pair_symbol("LTC", "BTC"), "LTCBTC");
        assert_eq!(ExchangeKind::Bittrex.pair_symbol("LTC", "BTC"), "BTC-LTC");
        assert_eq!(ExchangeKind::Kucoin.pair_symbol("LTC", "BTC"), "LTC-BTC");
    }

    #[test]
    fn parse_exchange_kind_round_trips() {
        for kind in [
            ExchangeKind::Binance,
            ExchangeKind::Bittrex,
            ExchangeKind::Kucoin,
        ] {
            assert_eq!(parse_exchange_kind(kind.as_str()).expect("parse"), kind);
        }
        assert!(parse_exchange_kind("mtgox").is_err());
    }

    #[test]
    fn only_binance_has_native_market_orders() {
        assert!(ExchangeKind::Binance.has_native_market_orders());
        assert!(!ExchangeKind::Bittrex.has_native_market_orders());
        assert!(!ExchangeKind::Kucoin.has_native_market_orders());
    }
}
