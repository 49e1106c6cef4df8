//! Per-trade state machine: open, tick, close.
//!
//! The lifecycle owns no state of its own; it advances a `Trade` passed by
//! mutable borrow, issuing at most one buy or sell at a time per trade.
//! Exchange failures never escape a tick: they are converted into log
//! entries on the tick report and, where the state machine demands it,
//! into a terminal `Error` state.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::coordinator::{EventAction, LogEntry, TradeEvent};
use crate::domain::{CloseTrigger, Trade, TradeState};
use crate::error::Result;
use crate::exchange::ExchangeClient;
use crate::pricing::{round_to_step, vwap_for_notional, BookSide};

/// Why a position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A certainty counter reached the confirmation threshold.
    Limit(CloseTrigger),
    /// Maximum holding time exceeded.
    Time,
    /// User asked for an immediate sell.
    Request,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Limit(trigger) => write!(f, "{} limit", trigger),
            CloseReason::Time => write!(f, "time limit"),
            CloseReason::Request => write!(f, "user request"),
        }
    }
}

/// Logs and events accumulated during one tick, flushed to the
/// coordination service by the monitor afterwards.
#[derive(Debug, Default)]
pub struct TickReport {
    pub logs: Vec<LogEntry>,
    pub events: Vec<TradeEvent>,
}

/// Drives one trade through its lifecycle against a single venue.
#[derive(Clone)]
pub struct Lifecycle {
    exchange: Arc<dyn ExchangeClient>,
    production: bool,
    certainty_limit: u32,
    sell_fee_rate: f64,
}

impl Lifecycle {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        production: bool,
        certainty_limit: u32,
        sell_fee_rate: f64,
    ) -> Self {
        Self {
            exchange,
            production,
            certainty_limit,
            sell_fee_rate,
        }
    }

    /// Execute the opening buy. The caller has already estimated
    /// `trade.price.buy` from the ticker and sized `trade.buy_qty`.
    ///
    /// On a quantity rejection or venue failure the trade stays `Pending`
    /// and the error propagates so the caller can drop the signal.
    pub async fn open(&self, trade: &mut Trade) -> Result<()> {
        let qty = round_to_step(trade.buy_qty, &trade.filter)?;

        if self.production {
            let fill = self.exchange.market_buy(&trade.pair(), qty).await?;
            trade.mark_open(fill.filled_qty, fill.avg_price);
            debug!(
                pair = %trade.pair(),
                qty = fill.filled_qty,
                price = trade.price.buy,
                "buy filled"
            );
        } else {
            // dev mode: simulate the fill at the estimated entry price
            trade.mark_open(qty, 0.0);
        }
        Ok(())
    }

    /// One monitoring tick: refresh the price, update the certainty
    /// counters and close when a trigger is confirmed.
    pub async fn tick(&self, trade: &mut Trade, report: &mut TickReport) -> Result<()> {
        if !trade.is_open() {
            return Ok(());
        }

        let price = self.sample_price(trade).await?;
        trade.apply_sample(price);
        trade.certainty.observe(&trade.metrics, &trade.limits);

        if let Some(trigger) = trade.certainty.breached(self.certainty_limit) {
            return self.close(trade, CloseReason::Limit(trigger), report).await;
        }
        if trade.holding_expired(Utc::now()) {
            return self.close(trade, CloseReason::Time, report).await;
        }
        Ok(())
    }

    /// Sell-side estimate of the executable price for this position's
    /// notional; falls back to the plain ticker price when the book is
    /// unavailable.
    async fn sample_price(&self, trade: &Trade) -> Result<f64> {
        if let Ok(levels) = self.exchange.order_book(&trade.pair(), BookSide::Bids).await {
            if let Ok(price) = vwap_for_notional(&levels, trade.amount) {
                return Ok(price);
            }
        }
        self.exchange.ticker_price(&trade.pair()).await
    }

    /// Close the position through a sell.
    ///
    /// A sell-size rejection leaves the trade `Open` (it is re-evaluated
    /// on every subsequent tick); any other sell failure is terminal and
    /// moves the trade to `Error` for manual resolution.
    pub async fn close(
        &self,
        trade: &mut Trade,
        reason: CloseReason,
        report: &mut TickReport,
    ) -> Result<()> {
        if !self.production {
            trade.state = TradeState::Closed;
            self.report_sold(trade, reason, report);
            return Ok(());
        }

        let target = trade.buy_qty * (1.0 - self.sell_fee_rate);
        let qty = match round_to_step(target, &trade.filter) {
            Ok(qty) => qty,
            Err(e) => {
                report.logs.push(LogEntry::error(format!(
                    "Invalid amount to sell for {}: {} (will retry)",
                    trade.label(),
                    e
                )));
                return Err(e);
            }
        };

        match self.exchange.market_sell(&trade.pair(), qty).await {
            Ok(fill) => {
                if fill.avg_price > 0.0 {
                    trade.apply_sample(fill.avg_price);
                }
                trade.state = TradeState::Closed;
                self.report_sold(trade, reason, report);
                Ok(())
            }
            Err(e) => {
                trade.state = TradeState::Error;
                report.logs.push(LogEntry::error(format!(
                    "Error while selling pair {}: {}",
                    trade.label(),
                    e
                )));
                Err(e)
            }
        }
    }

    /// User-requested cancel: terminal without touching the exchange.
    pub fn cancel(&self, trade: &mut Trade, report: &mut TickReport) {
        trade.state = TradeState::Closed;
        report.logs.push(LogEntry::info(format!(
            "Canceling trade {} due to user request after {}",
            trade.label(),
            trade.holding_label(Utc::now())
        )));
    }

    fn report_sold(&self, trade: &Trade, reason: CloseReason, report: &mut TickReport) {
        report.logs.push(LogEntry::info(format!(
            "Placed market sell for {} with {}% profit [dump: {}%] on {} after {}",
            trade.label(),
            trade.metrics.profit,
            trade.metrics.dump,
            reason,
            trade.holding_label(Utc::now())
        )));
        report.events.push(TradeEvent::from_trade(EventAction::Sell, trade));
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("exchange", &self.exchange.kind())
            .field("production", &self.production)
            .field("certainty_limit", &self.certainty_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Limits;
    use crate::error::SpotterError;
    use crate::exchange::traits::MockExchangeClient;
    use crate::exchange::{ExchangeKind, Fill};
    use crate::pricing::LotSizeFilter;

    fn pending_trade() -> Trade {
        let mut trade = Trade::new(
            "LTC",
            "BTC",
            ExchangeKind::Binance,
            0.5,
            Limits {
                profit: 5.0,
                ..Default::default()
            },
            LotSizeFilter::new(0.01, 100000.0, 0.01),
            serde_json::json!({}),
        );
        trade.price.buy = 0.01;
        trade.buy_qty = 50.0;
        trade
    }

    fn open_trade() -> Trade {
        let mut trade = pending_trade();
        trade.mark_open(50.0, 0.01);
        trade
    }

    #[tokio::test]
    async fn open_records_realized_fill_and_transitions() {
        let mut mock = MockExchangeClient::new();
        mock.expect_market_buy()
            .withf(|pair, qty| pair == "LTCBTC" && (*qty - 50.0).abs() < 1e-9)
            .returning(|_, qty| {
                Ok(Fill {
                    order_id: "1".to_string(),
                    avg_price: 0.0102,
                    filled_qty: qty,
                })
            });

        let lifecycle = Lifecycle::new(Arc::new(mock), true, 3, 0.001);
        let mut trade = pending_trade();
        lifecycle.open(&mut trade).await.expect("open");

        assert_eq!(trade.state, TradeState::Open);
        assert_eq!(trade.price.buy, 0.0102);
        assert_eq!(trade.price.max, 0.0102);
        assert_eq!(trade.buy_qty, 50.0);
    }

    #[tokio::test]
    async fn open_rejects_unroundable_quantity_without_ordering() {
        // no market_buy expectation: the call must never reach the venue
        let mock = MockExchangeClient::new();
        let lifecycle = Lifecycle::new(Arc::new(mock), true, 3, 0.001);

        let mut trade = pending_trade();
        trade.buy_qty = 0.004;
        trade.filter = LotSizeFilter::new(0.01, 100000.0, 0.01);

        let err = lifecycle.open(&mut trade).await.expect_err("rejected");
        assert!(matches!(err, SpotterError::QuantityRejected { .. }));
        assert_eq!(trade.state, TradeState::Pending);
    }

    #[tokio::test]
    async fn open_in_dev_mode_simulates_fill() {
        let mock = MockExchangeClient::new();
        let lifecycle = Lifecycle::new(Arc::new(mock), false, 3, 0.001);

        let mut trade = pending_trade();
        lifecycle.open(&mut trade).await.expect("open");
        assert_eq!(trade.state, TradeState::Open);
        // estimated entry survives the simulated fill
        assert_eq!(trade.price.buy, 0.01);
    }

    #[tokio::test]
    async fn full_sell_fill_closes_the_trade() {
        let mut mock = MockExchangeClient::new();
        mock.expect_market_sell().returning(|_, qty| {
            Ok(Fill {
                order_id: "2".to_string(),
                avg_price: 0.0105,
                filled_qty: qty,
            })
        });

        let lifecycle = Lifecycle::new(Arc::new(mock), true, 3, 0.001);
        let mut trade = open_trade();
        let mut report = TickReport::default();
        lifecycle
            .close(&mut trade, CloseReason::Request, &mut report)
            .await
            .expect("close");

        assert_eq!(trade.state, TradeState::Closed);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].action, EventAction::Sell);
        // realized sell price flows into the reported metrics
        assert_eq!(trade.price.current, 0.0105);
    }

    #[tokio::test]
    async fn unconfirmed_sell_fill_is_terminal_error() {
        let mut mock = MockExchangeClient::new();
        mock.expect_market_sell().returning(|_, qty| {
            Err(SpotterError::FillUnconfirmed {
                order_id: "3".to_string(),
                submitted: qty,
                filled: qty / 2.0,
            })
        });

        let lifecycle = Lifecycle::new(Arc::new(mock), true, 3, 0.001);
        let mut trade = open_trade();
        let mut report = TickReport::default();
        let err = lifecycle
            .close(&mut trade, CloseReason::Time, &mut report)
            .await
            .expect_err("unconfirmed");

        assert!(matches!(err, SpotterError::FillUnconfirmed { .. }));
        assert_eq!(trade.state, TradeState::Error);
        assert!(report.events.is_empty());
    }

    #[tokio::test]
    async fn sell_size_rejection_keeps_the_trade_open() {
        // no market_sell expectation: rejection happens before the venue
        let mock = MockExchangeClient::new();
        let lifecycle = Lifecycle::new(Arc::new(mock), true, 3, 0.001);

        let mut trade = open_trade();
        trade.buy_qty = 0.005;
        let mut report = TickReport::default();
        let err = lifecycle
            .close(&mut trade, CloseReason::Limit(CloseTrigger::Profit), &mut report)
            .await
            .expect_err("rejected");

        assert!(err.is_recoverable());
        assert_eq!(trade.state, TradeState::Open);
    }

    #[tokio::test]
    async fn cancel_closes_without_touching_the_exchange() {
        let mock = MockExchangeClient::new();
        let lifecycle = Lifecycle::new(Arc::new(mock), true, 3, 0.001);

        let mut trade = open_trade();
        let mut report = TickReport::default();
        lifecycle.cancel(&mut trade, &mut report);

        assert_eq!(trade.state, TradeState::Closed);
        assert!(report.events.is_empty());
        assert_eq!(report.logs.len(), 1);
    }

    #[tokio::test]
    async fn tick_closes_on_expired_holding_time() {
        // dev mode: close path needs no exchange, but the price sample does
        let mut mock = MockExchangeClient::new();
        mock.expect_order_book()
            .returning(|_, _| Ok(vec![crate::pricing::BookLevel::new(0.01, 1000.0)]));

        let lifecycle = Lifecycle::new(Arc::new(mock), false, 3, 0.001);
        let mut trade = open_trade();
        trade.limits.time = 60;
        trade.opened_at = Utc::now() - chrono::Duration::minutes(61);

        let mut report = TickReport::default();
        lifecycle.tick(&mut trade, &mut report).await.expect("tick");
        assert_eq!(trade.state, TradeState::Closed);
    }

    #[tokio::test]
    async fn tick_falls_back_to_ticker_when_book_is_empty() {
        let mut mock = MockExchangeClient::new();
        mock.expect_order_book().returning(|_, _| Ok(vec![]));
        mock.expect_ticker_price().returning(|_| Ok(0.0099));

        let lifecycle = Lifecycle::new(Arc::new(mock), false, 3, 0.001);
        let mut trade = open_trade();
        let mut report = TickReport::default();
        lifecycle.tick(&mut trade, &mut report).await.expect("tick");

        assert_eq!(trade.price.current, 0.0099);
        assert_eq!(trade.state, TradeState::Open);
    }
}
