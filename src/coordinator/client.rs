use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

use crate::domain::Trade;
use crate::error::{Result, SpotterError};

use super::types::{LogEntry, RequestedAction, SignalEnvelope, TradeEvent};

const AUTH_HEADER: &str = "X-AUTH-TOKEN";

/// HTTP client for the remote coordination service.
///
/// Signal pulls use a last-seen-signal cursor so a signal is consumed at
/// most once per client. All calls carry the API key and a `production`
/// marker header; dev-mode log text is additionally prefixed `[dev] ` so
/// rehearsal traffic is distinguishable server-side.
pub struct CoordinatorClient {
    http: Client,
    api_url: String,
    api_key: String,
    client_id: String,
    production: bool,
    last_signal_id: AtomicI64,
}

impl CoordinatorClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        client_id: impl Into<String>,
        production: bool,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("spotter-coordinator/0.1")
            .build()
            .map_err(|e| SpotterError::Internal(format!("failed to build HTTP client: {}", e)))?;

        let mut api_url = api_url.into();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }

        Ok(Self {
            http,
            api_url,
            api_key: api_key.into(),
            client_id: client_id.into(),
            production,
            last_signal_id: AtomicI64::new(0),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn last_signal_id(&self) -> i64 {
        self.last_signal_id.load(Ordering::SeqCst)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header(AUTH_HEADER, &self.api_key)
            .header("production", if self.production { "1" } else { "0" })
    }

    /// Register this client and seed the signal cursor.
    pub async fn register(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "client")
            .json(&json!({ "client_id": self.client_id }))
            .send()
            .await?;
        let body: Value = resp.error_for_status()?.json().await?;
        if let Some(id) = body.get("lastSignalId").and_then(|v| v.as_i64()) {
            self.last_signal_id.store(id, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Sync the signal cursor to the newest known signal without acting
    /// on it (startup, and after a trading round completes).
    pub async fn refresh_last_signal(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, "signal/last")
            .query(&[("client_id", self.client_id.as_str())])
            .send()
            .await?;
        let body: Value = resp.error_for_status()?.json().await?;
        if let Some(id) = body
            .get("signal")
            .and_then(|s| s.get("id"))
            .and_then(|v| v.as_i64())
        {
            self.last_signal_id.store(id, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Pull the next signal past the cursor, advancing the cursor when one
    /// arrives. `None` when there is nothing new this tick.
    pub async fn pull_signal(&self) -> Result<Option<SignalEnvelope>> {
        let last = self.last_signal_id().to_string();
        let resp = self
            .request(reqwest::Method::GET, "signal")
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("last_signal_id", last.as_str()),
            ])
            .send()
            .await?;
        let body: Value = resp.error_for_status()?.json().await?;

        if body.get("signal").map(|s| s.is_object()) != Some(true) {
            return Ok(None);
        }
        let envelope: SignalEnvelope = serde_json::from_value(body)?;
        self.last_signal_id.store(envelope.signal.id, Ordering::SeqCst);
        Ok(Some(envelope))
    }

    /// Check whether the user requested a cancel or sell on this trade.
    pub async fn requested_action(&self, trade: &Trade) -> Result<RequestedAction> {
        let signal_id = trade
            .signal
            .get("signal")
            .and_then(|s| s.get("id"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            .to_string();

        let resp = self
            .request(reqwest::Method::GET, "event/state")
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("signal_id", signal_id.as_str()),
                ("token", trade.base.as_str()),
                ("basic_token", trade.quote.as_str()),
            ])
            .send()
            .await?;
        let body: Value = resp.error_for_status()?.json().await?;
        Ok(RequestedAction::from_state(
            body.get("state").and_then(|v| v.as_i64()),
        ))
    }

    /// Post a batch of log lines. Best-effort: failures are swallowed.
    pub async fn post_logs(&self, logs: &[LogEntry]) {
        if logs.is_empty() {
            return;
        }

        let body: Vec<Value> = logs
            .iter()
            .map(|l| {
                let text = if self.production {
                    l.text.clone()
                } else {
                    format!("[dev] {}", l.text)
                };
                json!({ "text": text, "level": l.level, "timestamp": l.timestamp })
            })
            .collect();

        let result = self
            .request(reqwest::Method::POST, "logs")
            .query(&[("client_id", self.client_id.as_str())])
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => debug!(count = logs.len(), "posted logs to coordinator"),
            Err(e) => warn!("failed to post logs to coordinator: {}", e),
        }
    }

    /// Post a batch of trade events. Best-effort: failures are swallowed.
    pub async fn post_events(&self, events: &[TradeEvent]) {
        if events.is_empty() {
            return;
        }

        let result = self
            .request(reqwest::Method::POST, "events")
            .query(&[("client_id", self.client_id.as_str())])
            .json(events)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => debug!(count = events.len(), "posted events to coordinator"),
            Err(e) => warn!("failed to post events to coordinator: {}", e),
        }
    }
}
