//! Consecutive-tick confirmation counters.
//!
//! A close trigger is only trusted once its condition has held for a
//! configured number of consecutive ticks. A single non-matching tick
//! fully clears the run; there is no decay or smoothing.

use serde::{Deserialize, Serialize};

use super::{Limits, TradeMetrics};

/// Which trigger kind confirmed a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseTrigger {
    Profit,
    Dump,
    Loss,
}

impl std::fmt::Display for CloseTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseTrigger::Profit => write!(f, "profit"),
            CloseTrigger::Dump => write!(f, "dump"),
            CloseTrigger::Loss => write!(f, "loss"),
        }
    }
}

/// Run-length counters, one per trigger kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Certainty {
    pub profit: u32,
    pub dump: u32,
    pub loss: u32,
}

impl Certainty {
    /// Evaluate this tick's metrics against the configured limits,
    /// advancing or resetting each counter. Disabled limits (zero) never
    /// advance their counter.
    pub fn observe(&mut self, metrics: &TradeMetrics, limits: &Limits) {
        if limits.profit_enabled() {
            if metrics.profit >= limits.profit {
                self.profit += 1;
            } else {
                self.profit = 0;
            }
        }

        // Dump protection only arms while the position is still net
        // profitable (strictly above break-even).
        if limits.dump_enabled() {
            if metrics.dump < 0.0 && metrics.profit > 0.0 && metrics.dump.abs() >= limits.dump {
                self.dump += 1;
            } else {
                self.dump = 0;
            }
        }

        if limits.loss_enabled() {
            if metrics.loss < 0.0 && metrics.loss.abs() >= limits.loss {
                self.loss += 1;
            } else {
                self.loss = 0;
            }
        }
    }

    /// First counter at or above the confirmation threshold, if any.
    /// Profit is observed first, then dump, then loss.
    pub fn breached(&self, certainty_limit: u32) -> Option<CloseTrigger> {
        if self.profit >= certainty_limit {
            Some(CloseTrigger::Profit)
        } else if self.dump >= certainty_limit {
            Some(CloseTrigger::Dump)
        } else if self.loss >= certainty_limit {
            Some(CloseTrigger::Loss)
        } else {
            None
        }
    }
}
