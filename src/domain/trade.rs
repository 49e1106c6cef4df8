use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Certainty, Limits, PriceState, TradeMetrics};
use crate::exchange::ExchangeKind;
use crate::pricing::LotSizeFilter;

/// Trade lifecycle states. `Closed` and `Error` are terminal: the position
/// stops ticking and requires no (or manual) further action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeState {
    /// Signal accepted, buy not yet confirmed.
    Pending,
    /// Buy filled, position under monitoring.
    Open,
    /// Sell filled or trade cancelled.
    Closed,
    /// Sell attempt failed in production; manual intervention required.
    Error,
}

impl TradeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeState::Pending => "PENDING",
            TradeState::Open => "OPEN",
            TradeState::Closed => "CLOSED",
            TradeState::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeState::Closed | TradeState::Error)
    }
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One monitored position: the aggregate root owned exclusively by its
/// monitor task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Base asset being bought (e.g. "LTC").
    pub base: String,
    /// Quote asset funding the purchase (e.g. "BTC", "USDT").
    pub quote: String,
    pub exchange: ExchangeKind,
    /// Quote-currency notional requested by the signal.
    pub amount: f64,
    /// Base-asset quantity actually bought.
    pub buy_qty: f64,
    pub state: TradeState,
    pub limits: Limits,
    pub price: PriceState,
    pub metrics: TradeMetrics,
    pub certainty: Certainty,
    pub filter: LotSizeFilter,
    pub opened_at: DateTime<Utc>,
    /// Opaque signal payload, passed through to event reporting.
    pub signal: serde_json::Value,
}

impl Trade {
    pub fn new(
        base: impl Into<String>,
        quote: impl Into<String>,
        exchange: ExchangeKind,
        amount: f64,
        limits: Limits,
        filter: LotSizeFilter,
        signal: serde_json::Value,
    ) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
            exchange,
            amount,
            buy_qty: 0.0,
            state: TradeState::Pending,
            limits,
            price: PriceState::default(),
            metrics: TradeMetrics::default(),
            certainty: Certainty::default(),
            filter,
            opened_at: Utc::now(),
            signal,
        }
    }

    /// Venue-specific pair symbol for this trade.
    pub fn pair(&self) -> String {
        self.exchange.pair_symbol(&self.base, &self.quote)
    }

    /// Human-readable quote/base label used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}/{}", self.quote, self.base)
    }

    pub fn is_open(&self) -> bool {
        self.state == TradeState::Open
    }

    /// Record the confirmed opening fill and enter `Open`.
    pub fn mark_open(&mut self, filled_qty: f64, avg_price: f64) {
        self.buy_qty = filled_qty;
        if avg_price > 0.0 {
            self.price.buy = avg_price;
        }
        self.price.max = self.price.buy;
        self.opened_at = Utc::now();
        self.state = TradeState::Open;
    }

    /// Apply a sampled price and refresh the derived metrics.
    pub fn apply_sample(&mut self, price: f64) {
        self.price.record_sample(price);
        self.metrics = self.price.metrics();
    }

    /// True once the position has been held strictly longer than the
    /// configured maximum holding time.
    pub fn holding_expired(&self, now: DateTime<Utc>) -> bool {
        self.limits.time_enabled()
            && now - self.opened_at > Duration::minutes(self.limits.time as i64)
    }

    /// Elapsed holding time rendered as "H hours M minutes" for reports.
    pub fn holding_label(&self, now: DateTime<Utc>) -> String {
        let elapsed = (now - self.opened_at).max(Duration::zero());
        let hours = elapsed.num_hours();
        let minutes = elapsed.num_minutes() - hours * 60;
        format!("{} hours {} minutes", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(limits: Limits) -> Trade {
        Trade::new(
            "LTC",
            "BTC",
            ExchangeKind::Binance,
            0.5,
            limits,
            LotSizeFilter::new(0.01, 100000.0, 0.01),
            serde_json::json!({}),
        )
    }

    #[test]
    fn terminal_states_stop_ticking() {
        assert!(!TradeState::Pending.is_terminal());
        assert!(!TradeState::Open.is_terminal());
        assert!(TradeState::Closed.is_terminal());
        assert!(TradeState::Error.is_terminal());
    }

    #[test]
    fn mark_open_seeds_peak_from_fill() {
        let mut t = trade(Limits::default());
        t.price.buy = 100.0;
        t.mark_open(1.5, 101.5);
        assert_eq!(t.state, TradeState::Open);
        assert_eq!(t.buy_qty, 1.5);
        assert_eq!(t.price.buy, 101.5);
        assert_eq!(t.price.max, 101.5);
    }

    #[test]
    fn zero_fill_price_keeps_estimated_entry() {
        let mut t = trade(Limits::default());
        t.price.buy = 100.0;
        t.mark_open(1.5, 0.0);
        assert_eq!(t.price.buy, 100.0);
    }

    #[test]
    fn holding_expiry_is_strict() {
        let mut t = trade(Limits {
            time: 60,
            ..Default::default()
        });
        t.state = TradeState::Open;

        let opened = t.opened_at;
        assert!(!t.holding_expired(opened + Duration::minutes(60)));
        assert!(t.holding_expired(opened + Duration::minutes(61)));
    }

    #[test]
    fn disabled_time_limit_never_expires() {
        let t = trade(Limits::default());
        assert!(!t.holding_expired(t.opened_at + Duration::days(365)));
    }

    #[test]
    fn label_is_quote_over_base() {
        let t = trade(Limits::default());
        assert_eq!(t.label(), "BTC/LTC");
    }
}
