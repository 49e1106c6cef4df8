//! Order-book walking for slippage-bounded price estimation.
//!
//! Two venues in this system have no native market orders; market
//! execution is emulated by walking a REST order-book snapshot to find the
//! level that covers the requested size, then placing an aggressive limit
//! order at that level's price padded by a deviation factor. The same walk
//! (in value terms) doubles as the per-tick price estimator for open
//! positions.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpotterError};

/// One (price, quantity) level of an order-book snapshot, best price first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

impl BookLevel {
    pub fn new(price: f64, qty: f64) -> Self {
        Self { price, qty }
    }
}

/// Which side of the book a snapshot represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bids,
    Asks,
}

/// Walk levels best-to-worst until the cumulative base quantity covers
/// `target_qty`; returns the last consumed level's price. An exhausted
/// book yields the worst level's price (best-effort).
fn walk_for_qty(levels: &[BookLevel], target_qty: f64) -> Result<f64> {
    let mut cumulative = 0.0;
    let mut last_price = None;

    for level in levels {
        cumulative += level.qty;
        last_price = Some(level.price);
        if cumulative >= target_qty {
            break;
        }
    }

    last_price.ok_or_else(|| SpotterError::MarketDataUnavailable("empty order book".to_string()))
}

/// Aggressive limit price for a buy covering `target_qty`, padded upward
/// by the fractional `deviation` (0.1 = 10% worse than the walked level).
pub fn buy_limit_price(asks: &[BookLevel], target_qty: f64, deviation: f64) -> Result<f64> {
    Ok(walk_for_qty(asks, target_qty)? * (1.0 + deviation))
}

/// Aggressive limit price for a sell covering `target_qty`, padded
/// downward by the fractional `deviation`.
pub fn sell_limit_price(bids: &[BookLevel], target_qty: f64, deviation: f64) -> Result<f64> {
    Ok(walk_for_qty(bids, target_qty)? * (1.0 - deviation))
}

/// Volume-weighted average price of the levels needed to cover
/// `target_notional` in quote-currency value. An exhausted book yields the
/// VWAP of every level consumed (best-effort).
pub fn vwap_for_notional(levels: &[BookLevel], target_notional: f64) -> Result<f64> {
    let mut sum_qty = 0.0;
    let mut sum_notional = 0.0;

    for level in levels {
        sum_qty += level.qty;
        sum_notional += level.price * level.qty;
        if sum_notional >= target_notional {
            break;
        }
    }

    if sum_qty <= 0.0 {
        return Err(SpotterError::MarketDataUnavailable(
            "empty order book".to_string(),
        ));
    }
    Ok(sum_notional / sum_qty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asks() -> Vec<BookLevel> {
        vec![
            BookLevel::new(100.0, 1.0),
            BookLevel::new(101.0, 2.0),
            BookLevel::new(105.0, 10.0),
        ]
    }

    #[test]
    fn buy_walk_stops_at_covering_level() {
        // 2.5 units: first level (1.0) + part of second -> reference 101.0
        let price = buy_limit_price(&asks(), 2.5, 0.1).expect("walk");
        assert!((price - 101.0 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn sell_walk_pads_price_downward() {
        let bids = vec![BookLevel::new(99.0, 2.0), BookLevel::new(95.0, 5.0)];
        let price = sell_limit_price(&bids, 1.0, 0.1).expect("walk");
        assert!((price - 99.0 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn exhausted_book_uses_worst_level() {
        // 50 units swallow the whole book; last level price is used
        let price = buy_limit_price(&asks(), 50.0, 0.0).expect("walk");
        assert!((price - 105.0).abs() < 1e-9);
    }

    #[test]
    fn empty_book_is_an_error() {
        assert!(buy_limit_price(&[], 1.0, 0.1).is_err());
        assert!(vwap_for_notional(&[], 10.0).is_err());
    }

    #[test]
    fn vwap_covers_target_notional() {
        // levels: 100*1 = 100, then 101*2 = 202; target 150 consumes both
        let price = vwap_for_notional(&asks()[..2], 150.0).expect("vwap");
        let expected = (100.0 + 202.0) / 3.0;
        assert!((price - expected).abs() < 1e-9);
    }

    #[test]
    fn vwap_exhausted_book_is_best_effort() {
        let levels = vec![BookLevel::new(10.0, 1.0)];
        let price = vwap_for_notional(&levels, 1_000_000.0).expect("vwap");
        assert!((price - 10.0).abs() < 1e-9);
    }
}
