//! Per-position monitor task.
//!
//! Each open position is watched by exactly one tokio task running a
//! blocking poll loop: sleep, tick the state machine, flush telemetry,
//! repeat until the trade reaches a terminal state. The task is the sole
//! writer of its `Trade`; cancellation is cooperative and observed at
//! tick boundaries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::coordinator::{CoordinatorClient, LogEntry, RequestedAction};
use crate::domain::{Trade, TradeState};
use crate::engine::{CloseReason, Lifecycle, TickReport};
use crate::exchange::ExchangeKind;

/// Monitor loop tuning.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Pause between ticks.
    pub interval: Duration,
    /// Poll the coordinator for user actions every N ticks.
    pub action_poll_ticks: u32,
}

/// Terminal summary of a monitored trade, reported back to the
/// orchestrator when the task ends.
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub base: String,
    pub quote: String,
    pub exchange: ExchangeKind,
    pub state: TradeState,
    pub profit: f64,
}

impl TradeOutcome {
    fn from_trade(trade: &Trade) -> Self {
        Self {
            base: trade.base.clone(),
            quote: trade.quote.clone(),
            exchange: trade.exchange,
            state: trade.state,
            profit: trade.metrics.profit,
        }
    }

    /// Registry key of the position this outcome belongs to.
    pub fn position_key(&self) -> String {
        format!("{}:{}", self.exchange, self.exchange.pair_symbol(&self.base, &self.quote))
    }
}

/// Watch one open trade until it reaches a terminal state.
pub async fn monitor_trade(
    mut trade: Trade,
    lifecycle: Lifecycle,
    coordinator: Arc<CoordinatorClient>,
    settings: MonitorSettings,
    mut shutdown: watch::Receiver<bool>,
    outcome_tx: mpsc::Sender<TradeOutcome>,
) {
    let label = trade.label();
    info!(trade = %label, exchange = %trade.exchange, "monitor started");

    let mut tick_index: u32 = 0;
    while trade.is_open() {
        if *shutdown.borrow() {
            warn!(trade = %label, "shutdown requested; leaving position open");
            break;
        }

        let mut report = TickReport::default();

        if let Err(e) = lifecycle.tick(&mut trade, &mut report).await {
            if e.is_recoverable() {
                warn!(trade = %label, "tick deferred: {}", e);
            } else {
                warn!(trade = %label, "tick failed: {}", e);
            }
        }

        // user actions are polled at a coarser cadence than the tick
        if trade.is_open() && tick_index % settings.action_poll_ticks == 0 {
            match coordinator.requested_action(&trade).await {
                Ok(RequestedAction::Cancel) => {
                    lifecycle.cancel(&mut trade, &mut report);
                }
                Ok(RequestedAction::Sell) => {
                    report.logs.push(LogEntry::info(format!(
                        "Manually closing trade {} due to user request",
                        label
                    )));
                    if let Err(e) = lifecycle
                        .close(&mut trade, CloseReason::Request, &mut report)
                        .await
                    {
                        warn!(trade = %label, "requested sell failed: {}", e);
                    }
                }
                Ok(RequestedAction::None) => {}
                Err(e) => warn!(trade = %label, "action poll failed: {}", e),
            }
        }

        if !trade.is_open() {
            report
                .logs
                .push(LogEntry::info(format!("Closing trade on {}", label)));
        }

        coordinator.post_logs(&report.logs).await;
        coordinator.post_events(&report.events).await;

        tick_index = tick_index.wrapping_add(1);
        if trade.is_open() {
            tokio::select! {
                _ = tokio::time::sleep(settings.interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    info!(trade = %label, state = %trade.state, "monitor finished");
    let _ = outcome_tx.send(TradeOutcome::from_trade(&trade)).await;
}
