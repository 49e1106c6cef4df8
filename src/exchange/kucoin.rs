//! KuCoin REST adapter.
//!
//! Like Bittrex, KuCoin trades here go through emulated market orders:
//! book walk, deviation-padded limit order, one bounded confirmation poll.
//! Signed endpoints carry the KC-API-* header set with a base64 HMAC-SHA256
//! signature over `timestamp + method + endpoint + body`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, SpotterError};
use crate::exchange::{ExchangeClient, ExchangeKind, Fill};
use crate::pricing::{self, BookLevel, BookSide, LotSizeFilter};

const DEFAULT_KUCOIN_API_BASE: &str = "https://api.kucoin.com";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct KucoinClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    deviation: f64,
    confirm_wait: Duration,
}

fn venue_error(reason: impl Into<String>) -> SpotterError {
    SpotterError::Exchange {
        venue: ExchangeKind::Kucoin,
        reason: reason.into(),
    }
}

fn parse_f64(value: &Value, context: &str) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| venue_error(format!("unparseable number in {}: {}", context, value)))
}

impl KucoinClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: String,
        api_secret: String,
        api_passphrase: String,
        deviation: f64,
        confirm_wait: Duration,
    ) -> Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_KUCOIN_API_BASE)
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .user_agent("spotter-kucoin-adapter/0.1")
            .build()
            .map_err(|e| SpotterError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
            api_passphrase,
            deviation,
            confirm_wait,
        })
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        signed: bool,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let body_text = body.as_ref().map(|b| b.to_string()).unwrap_or_default();

        let mut req = self.http.request(method.clone(), &url);

        if signed {
            let timestamp = Utc::now().timestamp_millis().to_string();
            let payload = format!("{}{}{}{}", timestamp, method.as_str(), endpoint, body_text);
            let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
                .map_err(|e| SpotterError::Auth(format!("invalid KuCoin secret: {}", e)))?;
            mac.update(payload.as_bytes());
            let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

            req = req
                .header("KC-API-KEY", &self.api_key)
                .header("KC-API-SIGN", signature)
                .header("KC-API-TIMESTAMP", timestamp)
                .header("KC-API-PASSPHRASE", &self.api_passphrase);
        }

        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let envelope: Value = resp.json().await?;
        if !status.is_success() {
            return Err(venue_error(format!(
                "{} -> {}: {}",
                endpoint, status, envelope
            )));
        }
        // KuCoin wraps everything as {code, data}; "200000" is success
        if envelope.get("code").and_then(|v| v.as_str()) != Some("200000") {
            return Err(venue_error(format!("{} rejected: {}", endpoint, envelope)));
        }
        Ok(envelope.get("data").cloned().unwrap_or(Value::Null))
    }

    fn parse_book_side(data: &Value, side: BookSide) -> Result<Vec<BookLevel>> {
        let key = match side {
            BookSide::Bids => "bids",
            BookSide::Asks => "asks",
        };
        let raw = data
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| venue_error(format!("order book missing {}", key)))?;

        let mut levels = Vec::with_capacity(raw.len());
        for entry in raw {
            let pair = entry
                .as_array()
                .filter(|a| a.len() >= 2)
                .ok_or_else(|| venue_error("malformed order book level"))?;
            levels.push(BookLevel::new(
                parse_f64(&pair[0], "book price")?,
                parse_f64(&pair[1], "book qty")?,
            ));
        }
        Ok(levels)
    }

    async fn emulated_order(&self, pair: &str, buy: bool, qty: f64) -> Result<Fill> {
        let book_side = if buy { BookSide::Asks } else { BookSide::Bids };
        let levels = self.order_book(pair, book_side).await?;
        let price = if buy {
            pricing::buy_limit_price(&levels, qty, self.deviation)?
        } else {
            pricing::sell_limit_price(&levels, qty, self.deviation)?
        };

        let data = self
            .request(
                Method::POST,
                "/api/v1/orders",
                Some(json!({
                    "clientOid": Uuid::new_v4().to_string(),
                    "side": if buy { "buy" } else { "sell" },
                    "symbol": pair,
                    "type": "limit",
                    "price": format!("{:.8}", price),
                    "size": format!("{}", qty),
                })),
                true,
            )
            .await?;
        let order_id = data
            .get("orderId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| venue_error("order placement missing orderId"))?
            .to_string();

        tokio::time::sleep(self.confirm_wait).await;

        let order = self
            .request(
                Method::GET,
                &format!("/api/v1/orders/{}", order_id),
                None,
                true,
            )
            .await?;
        let filled = parse_f64(order.get("dealSize").unwrap_or(&Value::Null), "dealSize")?;

        if (filled - qty).abs() > pricing::filters::STEP_EPSILON {
            return Err(SpotterError::FillUnconfirmed {
                order_id,
                submitted: qty,
                filled,
            });
        }

        let deal_funds = order
            .get("dealFunds")
            .map(|v| parse_f64(v, "dealFunds"))
            .transpose()?
            .unwrap_or(0.0);
        let avg_price = if filled > 0.0 { deal_funds / filled } else { 0.0 };

        Ok(Fill {
            order_id,
            avg_price,
            filled_qty: filled,
        })
    }
}

#[async_trait]
impl ExchangeClient for KucoinClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Kucoin
    }

    async fn ticker_price(&self, pair: &str) -> Result<f64> {
        let data = self
            .request(
                Method::GET,
                &format!("/api/v1/market/orderbook/level1?symbol={}", pair),
                None,
                false,
            )
            .await?;
        parse_f64(data.get("price").unwrap_or(&Value::Null), "level1 price")
    }

    async fn order_book(&self, pair: &str, side: BookSide) -> Result<Vec<BookLevel>> {
        let data = self
            .request(
                Method::GET,
                &format!("/api/v1/market/orderbook/level2_50?symbol={}", pair),
                None,
                false,
            )
            .await?;
        Self::parse_book_side(&data, side)
    }

    async fn market_buy(&self, pair: &str, qty: f64) -> Result<Fill> {
        self.emulated_order(pair, true, qty).await
    }

    async fn market_sell(&self, pair: &str, qty: f64) -> Result<Fill> {
        self.emulated_order(pair, false, qty).await
    }

    async fn balances(&self) -> Result<HashMap<String, f64>> {
        let data = self
            .request(Method::GET, "/api/v1/accounts", None, true)
            .await?;
        let raw = data
            .as_array()
            .ok_or_else(|| venue_error("accounts response is not a list"))?;

        let mut balances = HashMap::new();
        for entry in raw {
            // only the trade account funds orders
            if entry.get("type").and_then(|v| v.as_str()) != Some("trade") {
                continue;
            }
            let currency = entry
                .get("currency")
                .and_then(|v| v.as_str())
                .ok_or_else(|| venue_error("account entry missing currency"))?;
            let available =
                parse_f64(entry.get("available").unwrap_or(&Value::Null), "available")?;
            balances.insert(currency.to_string(), available);
        }
        Ok(balances)
    }

    async fn lot_filters(&self) -> Result<HashMap<String, LotSizeFilter>> {
        let data = self
            .request(Method::GET, "/api/v1/symbols", None, false)
            .await?;
        let raw = data
            .as_array()
            .ok_or_else(|| venue_error("symbols response is not a list"))?;

        let mut filters = HashMap::with_capacity(raw.len());
        for entry in raw {
            let symbol = match entry.get("symbol").and_then(|v| v.as_str()) {
                Some(s) => s,
                None => continue,
            };
            filters.insert(
                symbol.to_string(),
                LotSizeFilter::new(
                    parse_f64(entry.get("baseMinSize").unwrap_or(&Value::Null), "baseMinSize")?,
                    parse_f64(entry.get("baseMaxSize").unwrap_or(&Value::Null), "baseMaxSize")?,
                    parse_f64(
                        entry.get("baseIncrement").unwrap_or(&Value::Null),
                        "baseIncrement",
                    )?,
                ),
            );
        }
        Ok(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_level2_book() {
        let data = json!({
            "asks": [["0.0110", "2"], ["0.0115", "6"]],
            "bids": [["0.0108", "4"]],
        });
        let asks = KucoinClient::parse_book_side(&data, BookSide::Asks).expect("asks");
        assert_eq!(asks[1], BookLevel::new(0.0115, 6.0));
        let bids = KucoinClient::parse_book_side(&data, BookSide::Bids).expect("bids");
        assert_eq!(bids[0], BookLevel::new(0.0108, 4.0));
    }
}
