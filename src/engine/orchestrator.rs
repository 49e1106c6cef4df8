//! Signal admission and fleet supervision.
//!
//! The orchestrator runs the outer poll loop: pull a signal when there is
//! capacity, validate it against venue filters and balances, execute the
//! opening buy and hand the position to a dedicated monitor task. It is
//! the only component that creates positions; monitors report terminal
//! outcomes back over a channel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::coordinator::{
    CoordinatorClient, EventAction, LogEntry, SignalEnvelope, TradeEvent,
};
use crate::domain::Trade;
use crate::engine::{monitor_trade, Lifecycle, MonitorSettings, TradeOutcome};
use crate::error::{Result, SpotterError};
use crate::exchange::{parse_exchange_kind, ExchangeClient, ExchangeKind};
use crate::pricing::LotSizeFilter;

/// Immutable per-venue filter snapshot, replaced wholesale on refresh so
/// concurrent readers never observe a partial update.
pub struct FilterCache {
    snapshot: RwLock<Arc<HashMap<String, LotSizeFilter>>>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub async fn get(&self, pair: &str) -> Option<LotSizeFilter> {
        self.snapshot.read().await.get(pair).copied()
    }

    /// Fetch the venue's full filter listing and swap the snapshot.
    pub async fn refresh(&self, client: &dyn ExchangeClient) -> Result<usize> {
        let filters = client.lot_filters().await?;
        let count = filters.len();
        *self.snapshot.write().await = Arc::new(filters);
        Ok(count)
    }
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks which positions are live and enforces the concurrency ceiling.
/// Admission and release are atomic: a key is either admitted within
/// capacity or rejected, never half-counted.
pub struct PositionRegistry {
    capacity: usize,
    open: Mutex<HashSet<String>>,
}

impl PositionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            open: Mutex::new(HashSet::new()),
        }
    }

    /// Admit a position key if the ceiling allows and no position for the
    /// same venue pair is already live.
    pub fn try_admit(&self, key: &str) -> bool {
        let mut open = self.open.lock().expect("registry lock poisoned");
        if open.len() >= self.capacity || open.contains(key) {
            return false;
        }
        open.insert(key.to_string());
        true
    }

    pub fn release(&self, key: &str) {
        self.open.lock().expect("registry lock poisoned").remove(key);
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().expect("registry lock poisoned").len()
    }

    pub fn has_capacity(&self) -> bool {
        self.open_count() < self.capacity
    }
}

/// The outer loop owning signal intake and position admission.
pub struct Orchestrator {
    config: AppConfig,
    production: bool,
    coordinator: Arc<CoordinatorClient>,
    exchanges: HashMap<ExchangeKind, Arc<dyn ExchangeClient>>,
    filters: HashMap<ExchangeKind, Arc<FilterCache>>,
    registry: Arc<PositionRegistry>,
    shutdown: watch::Receiver<bool>,
    outcome_tx: mpsc::Sender<TradeOutcome>,
    outcome_rx: mpsc::Receiver<TradeOutcome>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        production: bool,
        coordinator: Arc<CoordinatorClient>,
        exchanges: HashMap<ExchangeKind, Arc<dyn ExchangeClient>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let registry = Arc::new(PositionRegistry::new(config.trading.max_open_positions));
        let filters = exchanges
            .keys()
            .map(|kind| (*kind, Arc::new(FilterCache::new())))
            .collect();
        let (outcome_tx, outcome_rx) = mpsc::channel(32);

        Self {
            config,
            production,
            coordinator,
            exchanges,
            filters,
            registry,
            shutdown,
            outcome_tx,
            outcome_rx,
        }
    }

    /// Main loop: heartbeat, outcome bookkeeping, signal intake.
    pub async fn run(&mut self) -> Result<()> {
        self.bootstrap().await;

        let interval = self.config.trading.interval();
        let heartbeat_ticks = self.config.trading.heartbeat_ticks.max(1);
        let mut tick: u64 = 0;

        loop {
            if *self.shutdown.borrow() {
                info!("shutdown requested; orchestrator stopping");
                break;
            }

            let mut logs = Vec::new();
            if tick % heartbeat_ticks as u64 == 0 {
                logs.push(LogEntry::system("Heartbeat"));
            }

            while let Ok(outcome) = self.outcome_rx.try_recv() {
                self.registry.release(&outcome.position_key());
                logs.push(LogEntry::info(format!(
                    "Trade {}/{} finished in state {} with {}% profit",
                    outcome.quote, outcome.base, outcome.state, outcome.profit
                )));
            }

            if self.registry.has_capacity() {
                match self.coordinator.pull_signal().await {
                    Ok(Some(envelope)) if envelope.settings.is_some() => {
                        self.handle_signal(envelope, &mut logs).await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("signal pull failed: {}", e),
                }
            }

            self.coordinator.post_logs(&logs).await;

            tick = tick.wrapping_add(1);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.changed() => {}
            }
        }
        Ok(())
    }

    /// Startup: seed the signal cursor and warm the filter caches.
    async fn bootstrap(&self) {
        if let Err(e) = self.coordinator.refresh_last_signal().await {
            warn!("could not sync signal cursor: {}", e);
        }
        for (kind, cache) in &self.filters {
            let client = &self.exchanges[kind];
            match cache.refresh(client.as_ref()).await {
                Ok(count) => info!(exchange = %kind, pairs = count, "filters loaded"),
                Err(e) => error!(exchange = %kind, "filter load failed: {}", e),
            }
        }
    }

    /// Validate one signal and open a position per funded quote asset.
    async fn handle_signal(&self, envelope: SignalEnvelope, logs: &mut Vec<LogEntry>) {
        let settings = match &envelope.settings {
            Some(settings) => settings.clone(),
            None => return,
        };
        let token = envelope.signal.token.clone();

        let kind = match envelope.signal.exchange.as_deref() {
            Some(raw) => match parse_exchange_kind(raw) {
                Ok(kind) => kind,
                Err(_) => {
                    logs.push(LogEntry::error(format!(
                        "Unknown exchange '{}' in signal for {}",
                        envelope.signal.exchange.as_deref().unwrap_or(""),
                        token
                    )));
                    return;
                }
            },
            None => ExchangeKind::Binance,
        };

        let Some(client) = self.exchanges.get(&kind) else {
            logs.push(LogEntry::error(format!(
                "Exchange {} is not configured; dropping signal for {}",
                kind, token
            )));
            return;
        };

        logs.push(LogEntry::info(format!(
            "New {} signal for {}",
            envelope.signal.strength.as_deref().unwrap_or("unrated"),
            token
        )));

        let balances = match client.balances().await {
            Ok(balances) => balances,
            Err(e) => {
                logs.push(LogEntry::error(format!(
                    "Could not fetch {} balances: {}",
                    kind, e
                )));
                return;
            }
        };

        // deterministic order across quote assets
        let mut allocations: Vec<_> = settings.token.iter().collect();
        allocations.sort_by(|a, b| a.0.cmp(b.0));

        let mut events = Vec::new();
        for (quote, &amount) in allocations {
            if amount <= 0.0 {
                logs.push(LogEntry::info(format!(
                    "Ignoring {}/{} according to settings",
                    quote, token
                )));
                continue;
            }

            let pair = kind.pair_symbol(&token, quote);
            let filter = match self.lookup_filter(kind, client.as_ref(), &pair).await {
                Ok(filter) => filter,
                Err(e) => {
                    logs.push(LogEntry::error(format!(
                        "No such pair ({}/{}) on {}: {}",
                        quote, token, kind, e
                    )));
                    continue;
                }
            };

            let available = balances.get(quote).copied().unwrap_or(0.0);
            if amount > available {
                let reason = SpotterError::InsufficientBalance {
                    asset: quote.clone(),
                    requested: amount,
                    available,
                };
                logs.push(LogEntry::info(format!(
                    "Ignoring {}/{}: {}",
                    quote, token, reason
                )));
                continue;
            }

            let key = format!("{}:{}", kind, pair);
            if !self.registry.try_admit(&key) {
                logs.push(LogEntry::info(format!(
                    "Ignoring {}/{}: position ceiling reached or pair already traded",
                    quote, token
                )));
                continue;
            }

            let price = match client.ticker_price(&pair).await {
                Ok(price) if price > 0.0 => price,
                Ok(_) | Err(_) => {
                    logs.push(LogEntry::error(format!(
                        "No usable price for {} on {}",
                        pair, kind
                    )));
                    self.registry.release(&key);
                    continue;
                }
            };

            let mut trade = Trade::new(
                token.clone(),
                quote.clone(),
                kind,
                amount,
                settings.limit,
                filter,
                envelope.passthrough(),
            );
            trade.price.buy = price;
            trade.buy_qty = amount / price;

            let lifecycle = Lifecycle::new(
                client.clone(),
                self.production,
                self.config.trading.certainty_limit,
                self.config.trading.sell_fee_rate,
            );

            match lifecycle.open(&mut trade).await {
                Ok(()) => {
                    logs.push(LogEntry::info(format!(
                        "Placed market buy for {}/{} at price {:.8}",
                        quote, token, trade.price.buy
                    )));
                    events.push(TradeEvent::from_trade(EventAction::Buy, &trade));

                    let settings = MonitorSettings {
                        interval: self.config.trading.interval(),
                        action_poll_ticks: self.config.trading.action_poll_ticks.max(1),
                    };
                    tokio::spawn(monitor_trade(
                        trade,
                        lifecycle,
                        self.coordinator.clone(),
                        settings,
                        self.shutdown.clone(),
                        self.outcome_tx.clone(),
                    ));
                }
                Err(e) => {
                    self.registry.release(&key);
                    logs.push(LogEntry::error(format!(
                        "Buy failed for {}/{}: {}",
                        quote, token, e
                    )));
                }
            }
        }

        self.coordinator.post_events(&events).await;
    }

    /// Filter lookup with one refresh-and-retry on a miss (the venue may
    /// have listed the pair since startup).
    async fn lookup_filter(
        &self,
        kind: ExchangeKind,
        client: &dyn ExchangeClient,
        pair: &str,
    ) -> Result<LotSizeFilter> {
        let cache = self.filters.get(&kind).ok_or_else(|| {
            SpotterError::Internal(format!("no filter cache for {}", kind))
        })?;
        if let Some(filter) = cache.get(pair).await {
            return Ok(filter);
        }
        if let Err(e) = cache.refresh(client).await {
            warn!(exchange = %kind, "filter refresh failed: {}", e);
        }
        cache.get(pair).await.ok_or(SpotterError::PairNotFound {
            pair: pair.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_enforces_ceiling_and_uniqueness() {
        let registry = PositionRegistry::new(2);
        assert!(registry.try_admit("binance:LTCBTC"));
        assert!(!registry.try_admit("binance:LTCBTC"), "duplicate pair");
        assert!(registry.try_admit("binance:XRPBTC"));
        assert!(!registry.try_admit("binance:ADABTC"), "over ceiling");

        registry.release("binance:LTCBTC");
        assert!(registry.try_admit("binance:ADABTC"));
        assert_eq!(registry.open_count(), 2);
    }

    #[test]
    fn registry_release_is_idempotent() {
        let registry = PositionRegistry::new(1);
        assert!(registry.try_admit("kucoin:LTC-BTC"));
        registry.release("kucoin:LTC-BTC");
        registry.release("kucoin:LTC-BTC");
        assert_eq!(registry.open_count(), 0);
    }

    #[tokio::test]
    async fn filter_cache_swaps_snapshots_wholesale() {
        use crate::exchange::traits::MockExchangeClient;

        let cache = FilterCache::new();
        assert!(cache.get("LTCBTC").await.is_none());

        let mut mock = MockExchangeClient::new();
        mock.expect_lot_filters().returning(|| {
            let mut filters = HashMap::new();
            filters.insert(
                "LTCBTC".to_string(),
                LotSizeFilter::new(0.01, 100000.0, 0.01),
            );
            Ok(filters)
        });

        let count = cache.refresh(&mock).await.expect("refresh");
        assert_eq!(count, 1);
        let filter = cache.get("LTCBTC").await.expect("filter");
        assert_eq!(filter.step_size, 0.01);
    }
}
