use serde::{Deserialize, Serialize};

/// Close thresholds attached to a signal. Set once at trade creation,
/// immutable afterwards. A zero value disables that trigger.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Limits {
    /// Take-profit threshold, percent.
    #[serde(default)]
    pub profit: f64,
    /// Drawdown-from-peak threshold, percent.
    #[serde(default)]
    pub dump: f64,
    /// Stop-loss threshold, percent.
    #[serde(default)]
    pub loss: f64,
    /// Maximum holding time, minutes.
    #[serde(default)]
    pub time: u64,
}

impl Limits {
    pub fn profit_enabled(&self) -> bool {
        self.profit > 0.0
    }

    pub fn dump_enabled(&self) -> bool {
        self.dump > 0.0
    }

    pub fn loss_enabled(&self) -> bool {
        self.loss > 0.0
    }

    pub fn time_enabled(&self) -> bool {
        self.time > 0
    }
}
