use serde::{Deserialize, Serialize};

/// Running price snapshot for one position, mutated every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceState {
    /// Realized average execution price of the opening order. Set once at
    /// fill, immutable afterwards.
    pub buy: f64,
    /// Most recent sampled/estimated price.
    pub current: f64,
    /// Previous tick's `current` (diagnostic, for up/down display).
    pub last: f64,
    /// Highest `current` observed since open. Non-decreasing while the
    /// position stays open.
    pub max: f64,
}

/// Per-tick derived percentages against the entry and the peak.
/// `profit` and `loss` share one formula; `loss` is the downside view of
/// the same number.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeMetrics {
    pub profit: f64,
    pub dump: f64,
    pub loss: f64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl PriceState {
    /// Record a freshly sampled price, shifting `current` into `last` and
    /// ratcheting `max`.
    pub fn record_sample(&mut self, price: f64) {
        self.last = self.current;
        self.current = price;
        self.max = self.max.max(self.current);
    }

    /// Derive the percent metrics for the current sample, rounded to two
    /// decimals.
    pub fn metrics(&self) -> TradeMetrics {
        let change = if self.buy > 0.0 {
            round2((self.current - self.buy) * 100.0 / self.buy)
        } else {
            0.0
        };
        let dump = if self.max > 0.0 {
            round2((self.current - self.max) * 100.0 / self.max)
        } else {
            0.0
        };
        TradeMetrics {
            profit: change,
            dump,
            loss: change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_is_non_decreasing() {
        let mut price = PriceState {
            buy: 100.0,
            max: 100.0,
            ..Default::default()
        };
        let samples = [101.0, 99.0, 105.0, 50.0, 104.9, 105.0];
        let mut prev_max = price.max;
        for s in samples {
            price.record_sample(s);
            assert!(price.max >= prev_max);
            prev_max = price.max;
        }
        assert_eq!(price.max, 105.0);
    }

    #[test]
    fn last_tracks_previous_sample() {
        let mut price = PriceState {
            buy: 10.0,
            max: 10.0,
            ..Default::default()
        };
        price.record_sample(11.0);
        price.record_sample(12.0);
        assert_eq!(price.last, 11.0);
        assert_eq!(price.current, 12.0);
    }

    #[test]
    fn metrics_round_to_two_decimals() {
        let mut price = PriceState {
            buy: 3.0,
            max: 3.0,
            ..Default::default()
        };
        price.record_sample(3.1);
        let m = price.metrics();
        // (3.1 - 3.0) * 100 / 3.0 = 3.333.. -> 3.33
        assert_eq!(m.profit, 3.33);
        assert_eq!(m.loss, m.profit);
    }

    #[test]
    fn dump_measures_retreat_from_peak() {
        let mut price = PriceState {
            buy: 100.0,
            max: 100.0,
            ..Default::default()
        };
        price.record_sample(110.0);
        price.record_sample(104.5);
        let m = price.metrics();
        assert_eq!(m.profit, 4.5);
        assert_eq!(m.dump, -5.0);
    }

    #[test]
    fn zero_buy_price_yields_zero_metrics() {
        let price = PriceState::default();
        let m = price.metrics();
        assert_eq!(m.profit, 0.0);
        assert_eq!(m.dump, 0.0);
    }
}
