//! Bittrex REST adapter (v1.1 API).
//!
//! Bittrex has no market orders; buys and sells walk the opposite side of
//! the order book for a deviation-padded reference price, place an
//! aggressive limit order, then poll once after a short confirmation wait.
//! Anything short of a full fill after that wait is surfaced as
//! `FillUnconfirmed` for operator attention.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha512;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, SpotterError};
use crate::exchange::{ExchangeClient, ExchangeKind, Fill};
use crate::pricing::{self, BookLevel, BookSide, LotSizeFilter};

const DEFAULT_BITTREX_API_BASE: &str = "https://api.bittrex.com/api/v1.1";

/// Bittrex only publishes a minimum trade size; quantities are otherwise
/// quoted to eight decimals.
const BITTREX_STEP_SIZE: f64 = 1e-8;
const BITTREX_MAX_QTY: f64 = 1e9;

type HmacSha512 = Hmac<Sha512>;

#[derive(Clone)]
pub struct BittrexClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    /// Fractional price deviation allowed when emulating market orders.
    deviation: f64,
    /// Wait before the single fill-confirmation poll.
    confirm_wait: Duration,
}

fn venue_error(reason: impl Into<String>) -> SpotterError {
    SpotterError::Exchange {
        venue: ExchangeKind::Bittrex,
        reason: reason.into(),
    }
}

fn field_f64(value: &Value, key: &str) -> Result<f64> {
    value
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| venue_error(format!("missing numeric field {}", key)))
}

impl BittrexClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: String,
        api_secret: String,
        deviation: f64,
        confirm_wait: Duration,
    ) -> Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BITTREX_API_BASE)
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .user_agent("spotter-bittrex-adapter/0.1")
            .build()
            .map_err(|e| SpotterError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
            deviation,
            confirm_wait,
        })
    }

    async fn get_public(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).query(query).send().await?;
        self.unwrap_envelope(path, resp).await
    }

    /// Signed v1.1 call: apikey + nonce in the query, HMAC-SHA512 of the
    /// full URI in the `apisign` header.
    async fn get_signed(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut full = vec![
            ("apikey".to_string(), self.api_key.clone()),
            (
                "nonce".to_string(),
                Utc::now().timestamp_millis().to_string(),
            ),
        ];
        full.extend(query.iter().map(|(k, v)| (k.to_string(), v.clone())));

        let encoded = full
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}{}?{}", self.base_url, path, encoded);

        let mut mac = HmacSha512::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| SpotterError::Auth(format!("invalid Bittrex secret: {}", e)))?;
        mac.update(url.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let resp = self
            .http
            .get(&url)
            .header("apisign", signature)
            .send()
            .await?;
        self.unwrap_envelope(path, resp).await
    }

    /// Every v1.1 response is `{success, message, result}`.
    async fn unwrap_envelope(&self, path: &str, resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(venue_error(format!("{} -> {}: {}", path, status, body)));
        }
        if body.get("success").and_then(|v| v.as_bool()) != Some(true) {
            let message = body
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            return Err(venue_error(format!("{} rejected: {}", path, message)));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    fn parse_book(result: &Value) -> Result<Vec<BookLevel>> {
        let raw = result
            .as_array()
            .ok_or_else(|| venue_error("order book result is not a list"))?;
        let mut levels = Vec::with_capacity(raw.len());
        for entry in raw {
            levels.push(BookLevel::new(
                field_f64(entry, "Rate")?,
                field_f64(entry, "Quantity")?,
            ));
        }
        Ok(levels)
    }

    /// Emulated market order: aggressive limit at the book-walked price,
    /// then one bounded poll for the fill.
    async fn emulated_order(&self, pair: &str, buy: bool, qty: f64) -> Result<Fill> {
        let (book_side, endpoint) = if buy {
            (BookSide::Asks, "/market/buylimit")
        } else {
            (BookSide::Bids, "/market/selllimit")
        };

        let levels = self.order_book(pair, book_side).await?;
        let rate = if buy {
            pricing::buy_limit_price(&levels, qty, self.deviation)?
        } else {
            pricing::sell_limit_price(&levels, qty, self.deviation)?
        };

        let result = self
            .get_signed(
                endpoint,
                &[
                    ("market", pair.to_string()),
                    ("quantity", format!("{}", qty)),
                    ("rate", format!("{:.8}", rate)),
                ],
            )
            .await?;
        let order_id = result
            .get("uuid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| venue_error("order placement missing uuid"))?
            .to_string();

        tokio::time::sleep(self.confirm_wait).await;

        let order = self
            .get_signed("/account/getorder", &[("uuid", order_id.clone())])
            .await?;
        let quantity = field_f64(&order, "Quantity")?;
        let remaining = field_f64(&order, "QuantityRemaining")?;
        let filled = quantity - remaining;

        if (filled - qty).abs() > pricing::filters::STEP_EPSILON {
            return Err(SpotterError::FillUnconfirmed {
                order_id,
                submitted: qty,
                filled,
            });
        }

        let avg_price = order
            .get("PricePerUnit")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        Ok(Fill {
            order_id,
            avg_price,
            filled_qty: filled,
        })
    }
}

#[async_trait]
impl ExchangeClient for BittrexClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bittrex
    }

    async fn ticker_price(&self, pair: &str) -> Result<f64> {
        let result = self
            .get_public("/public/getticker", &[("market", pair.to_string())])
            .await?;
        field_f64(&result, "Last")
    }

    async fn order_book(&self, pair: &str, side: BookSide) -> Result<Vec<BookLevel>> {
        // v1.1 names the sides by taker intent: asks are "sell" orders
        let book_type = match side {
            BookSide::Asks => "sell",
            BookSide::Bids => "buy",
        };
        let result = self
            .get_public(
                "/public/getorderbook",
                &[
                    ("market", pair.to_string()),
                    ("type", book_type.to_string()),
                ],
            )
            .await?;
        Self::parse_book(&result)
    }

    async fn market_buy(&self, pair: &str, qty: f64) -> Result<Fill> {
        self.emulated_order(pair, true, qty).await
    }

    async fn market_sell(&self, pair: &str, qty: f64) -> Result<Fill> {
        self.emulated_order(pair, false, qty).await
    }

    async fn balances(&self) -> Result<HashMap<String, f64>> {
        let result = self.get_signed("/account/getbalances", &[]).await?;
        let raw = result
            .as_array()
            .ok_or_else(|| venue_error("balances result is not a list"))?;

        let mut balances = HashMap::with_capacity(raw.len());
        for entry in raw {
            let currency = entry
                .get("Currency")
                .and_then(|v| v.as_str())
                .ok_or_else(|| venue_error("balance entry missing Currency"))?;
            let available = entry
                .get("Available")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            balances.insert(currency.to_string(), available);
        }
        Ok(balances)
    }

    async fn lot_filters(&self) -> Result<HashMap<String, LotSizeFilter>> {
        let result = self.get_public("/public/getmarkets", &[]).await?;
        let raw = result
            .as_array()
            .ok_or_else(|| venue_error("markets result is not a list"))?;

        let mut filters = HashMap::with_capacity(raw.len());
        for entry in raw {
            let name = match entry.get("MarketName").and_then(|v| v.as_str()) {
                Some(n) => n,
                None => continue,
            };
            let min = entry
                .get("MinTradeSize")
                .and_then(|v| v.as_f64())
                .unwrap_or(BITTREX_STEP_SIZE);
            filters.insert(
                name.to_string(),
                LotSizeFilter::new(min, BITTREX_MAX_QTY, BITTREX_STEP_SIZE),
            );
        }
        Ok(filters)
    }
}
