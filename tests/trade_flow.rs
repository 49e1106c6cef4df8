//! End-to-end lifecycle tests against a scripted in-memory exchange.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use spotter::domain::{Limits, Trade, TradeState};
use spotter::engine::{Lifecycle, TickReport};
use spotter::error::{Result, SpotterError};
use spotter::exchange::{ExchangeClient, ExchangeKind, Fill};
use spotter::pricing::{BookLevel, BookSide, LotSizeFilter};

/// Plays back a fixed price path; orders always fill in full unless the
/// test arms `fail_sells`.
struct ScriptedExchange {
    prices: Mutex<VecDeque<f64>>,
    last_price: Mutex<f64>,
    sells: Mutex<Vec<f64>>,
    fail_sells: bool,
}

impl ScriptedExchange {
    fn new(entry: f64, path: &[f64]) -> Self {
        Self {
            prices: Mutex::new(path.iter().copied().collect()),
            last_price: Mutex::new(entry),
            sells: Mutex::new(Vec::new()),
            fail_sells: false,
        }
    }

    fn with_failing_sells(mut self) -> Self {
        self.fail_sells = true;
        self
    }

    fn next_price(&self) -> f64 {
        let mut prices = self.prices.lock().unwrap();
        let mut last = self.last_price.lock().unwrap();
        if let Some(price) = prices.pop_front() {
            *last = price;
        }
        *last
    }

    fn current_price(&self) -> f64 {
        *self.last_price.lock().unwrap()
    }

    fn sold_quantities(&self) -> Vec<f64> {
        self.sells.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Binance
    }

    async fn ticker_price(&self, _pair: &str) -> Result<f64> {
        Ok(self.current_price())
    }

    async fn order_book(&self, _pair: &str, _side: BookSide) -> Result<Vec<BookLevel>> {
        Ok(vec![BookLevel::new(self.next_price(), 1_000_000_000.0)])
    }

    async fn market_buy(&self, _pair: &str, qty: f64) -> Result<Fill> {
        Ok(Fill {
            order_id: "buy-1".to_string(),
            avg_price: self.current_price(),
            filled_qty: qty,
        })
    }

    async fn market_sell(&self, _pair: &str, qty: f64) -> Result<Fill> {
        if self.fail_sells {
            return Err(SpotterError::FillUnconfirmed {
                order_id: "sell-1".to_string(),
                submitted: qty,
                filled: qty / 2.0,
            });
        }
        self.sells.lock().unwrap().push(qty);
        Ok(Fill {
            order_id: "sell-1".to_string(),
            avg_price: self.current_price(),
            filled_qty: qty,
        })
    }

    async fn balances(&self) -> Result<HashMap<String, f64>> {
        Ok(HashMap::from([("BTC".to_string(), 10.0)]))
    }

    async fn lot_filters(&self) -> Result<HashMap<String, LotSizeFilter>> {
        Ok(HashMap::from([(
            "LTCBTC".to_string(),
            LotSizeFilter::new(0.0001, 1_000_000.0, 0.0001),
        )]))
    }
}

fn new_trade(limits: Limits) -> Trade {
    let mut trade = Trade::new(
        "LTC",
        "BTC",
        ExchangeKind::Binance,
        1000.0,
        limits,
        LotSizeFilter::new(0.0001, 1_000_000.0, 0.0001),
        serde_json::json!({"signal": {"id": 1}}),
    );
    trade.price.buy = 100.0;
    trade.buy_qty = trade.amount / trade.price.buy;
    trade
}

#[tokio::test]
async fn profit_certainty_confirms_on_consecutive_ticks() {
    // profit path 3% / 6% / 6% / 2%; two confirming ticks required
    let exchange = Arc::new(ScriptedExchange::new(100.0, &[103.0, 106.0, 106.0, 102.0]));
    let lifecycle = Lifecycle::new(exchange.clone(), true, 2, 0.001);

    let mut trade = new_trade(Limits {
        profit: 5.0,
        ..Default::default()
    });
    lifecycle.open(&mut trade).await.expect("open");
    assert_eq!(trade.state, TradeState::Open);

    let mut closed_on_tick = None;
    for tick in 0..4 {
        let mut report = TickReport::default();
        let _ = lifecycle.tick(&mut trade, &mut report).await;
        if closed_on_tick.is_none() && !trade.is_open() {
            closed_on_tick = Some(tick);
        }
    }

    // first 6% tick only arms the counter; the second confirms the close
    assert_eq!(closed_on_tick, Some(2));
    assert_eq!(trade.state, TradeState::Closed);

    // exactly one sell, sized as the bought quantity less the fee estimate
    let sells = exchange.sold_quantities();
    assert_eq!(sells.len(), 1);
    let expected = 10.0 * (1.0 - 0.001);
    assert!((sells[0] - expected).abs() < 1e-4);
}

#[tokio::test]
async fn single_breach_does_not_close() {
    let exchange = Arc::new(ScriptedExchange::new(100.0, &[106.0, 103.0, 106.0, 103.0]));
    let lifecycle = Lifecycle::new(exchange.clone(), true, 2, 0.001);

    let mut trade = new_trade(Limits {
        profit: 5.0,
        ..Default::default()
    });
    lifecycle.open(&mut trade).await.expect("open");

    for _ in 0..4 {
        let mut report = TickReport::default();
        let _ = lifecycle.tick(&mut trade, &mut report).await;
    }

    // the run resets on every miss, so the position never closes
    assert_eq!(trade.state, TradeState::Open);
    assert!(exchange.sold_quantities().is_empty());
}

#[tokio::test]
async fn dump_locks_in_receding_gains() {
    // rally to 110, then retreat past the 5% dump limit while still green
    let exchange = Arc::new(ScriptedExchange::new(100.0, &[110.0, 104.0]));
    let lifecycle = Lifecycle::new(exchange.clone(), true, 1, 0.001);

    let mut trade = new_trade(Limits {
        dump: 5.0,
        ..Default::default()
    });
    lifecycle.open(&mut trade).await.expect("open");

    let mut report = TickReport::default();
    lifecycle.tick(&mut trade, &mut report).await.expect("tick");
    assert!(trade.is_open());

    lifecycle.tick(&mut trade, &mut report).await.expect("tick");
    assert_eq!(trade.state, TradeState::Closed);
    assert_eq!(exchange.sold_quantities().len(), 1);
}

#[tokio::test]
async fn underwater_dump_never_triggers() {
    // fall straight under water: far from the peak but never profitable
    let exchange = Arc::new(ScriptedExchange::new(100.0, &[92.0, 90.0, 88.0]));
    let lifecycle = Lifecycle::new(exchange.clone(), true, 1, 0.001);

    let mut trade = new_trade(Limits {
        dump: 5.0,
        ..Default::default()
    });
    lifecycle.open(&mut trade).await.expect("open");

    for _ in 0..3 {
        let mut report = TickReport::default();
        lifecycle.tick(&mut trade, &mut report).await.expect("tick");
    }

    assert_eq!(trade.state, TradeState::Open);
    assert!(exchange.sold_quantities().is_empty());
}

#[tokio::test]
async fn time_limit_fires_without_certainty() {
    let exchange = Arc::new(ScriptedExchange::new(100.0, &[100.5]));
    let lifecycle = Lifecycle::new(exchange.clone(), true, 3, 0.001);

    let mut trade = new_trade(Limits {
        time: 60,
        ..Default::default()
    });
    lifecycle.open(&mut trade).await.expect("open");
    trade.opened_at = Utc::now() - Duration::minutes(61);

    let mut report = TickReport::default();
    lifecycle.tick(&mut trade, &mut report).await.expect("tick");

    assert_eq!(trade.state, TradeState::Closed);
    assert_eq!(exchange.sold_quantities().len(), 1);
}

#[tokio::test]
async fn unconfirmed_sell_is_terminal() {
    let exchange =
        Arc::new(ScriptedExchange::new(100.0, &[106.0, 106.0]).with_failing_sells());
    let lifecycle = Lifecycle::new(exchange.clone(), true, 1, 0.001);

    let mut trade = new_trade(Limits {
        profit: 5.0,
        ..Default::default()
    });
    lifecycle.open(&mut trade).await.expect("open");

    let mut report = TickReport::default();
    let err = lifecycle
        .tick(&mut trade, &mut report)
        .await
        .expect_err("sell should fail");
    assert!(matches!(err, SpotterError::FillUnconfirmed { .. }));
    assert_eq!(trade.state, TradeState::Error);

    // terminal: a further tick is a no-op, nothing is retried
    let mut report = TickReport::default();
    lifecycle.tick(&mut trade, &mut report).await.expect("noop");
    assert_eq!(trade.state, TradeState::Error);
}

#[tokio::test]
async fn stop_loss_closes_after_confirmation() {
    let exchange = Arc::new(ScriptedExchange::new(100.0, &[94.0, 93.0]));
    let lifecycle = Lifecycle::new(exchange.clone(), true, 2, 0.001);

    let mut trade = new_trade(Limits {
        loss: 5.0,
        ..Default::default()
    });
    lifecycle.open(&mut trade).await.expect("open");

    let mut report = TickReport::default();
    lifecycle.tick(&mut trade, &mut report).await.expect("tick");
    assert!(trade.is_open());

    lifecycle.tick(&mut trade, &mut report).await.expect("tick");
    assert_eq!(trade.state, TradeState::Closed);
}
