//! Binance REST adapter.
//!
//! The only venue in the set with true market orders: buys and sells go
//! straight to `POST /api/v3/order` with `type=MARKET` and the realized
//! average price is recovered from the response `fills` array. Signed
//! endpoints carry an HMAC-SHA256 hex signature over the urlencoded query
//! string.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;

use crate::error::{Result, SpotterError};
use crate::exchange::{ExchangeClient, ExchangeKind, Fill};
use crate::pricing::{BookLevel, BookSide, LotSizeFilter};

const DEFAULT_BINANCE_API_BASE: &str = "https://api.binance.com";
const DEPTH_LIMIT: u32 = 50;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

fn parse_f64(value: &Value, context: &str) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| SpotterError::Exchange {
        venue: ExchangeKind::Binance,
        reason: format!("unparseable number in {}: {}", context, value),
    })
}

fn venue_error(reason: impl Into<String>) -> SpotterError {
    SpotterError::Exchange {
        venue: ExchangeKind::Binance,
        reason: reason.into(),
    }
}

impl BinanceClient {
    pub fn new(base_url: Option<&str>, api_key: String, api_secret: String) -> Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BINANCE_API_BASE)
            .trim_end_matches('/')
            .to_string();

        let http = Client::builder()
            .user_agent("spotter-binance-adapter/0.1")
            .build()
            .map_err(|e| SpotterError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
        })
    }

    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| SpotterError::Auth(format!("invalid Binance secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn get_public(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).query(query).send().await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(venue_error(format!("{} -> {}: {}", path, status, body)));
        }
        Ok(body)
    }

    async fn request_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        query.push((
            "timestamp".to_string(),
            Utc::now().timestamp_millis().to_string(),
        ));

        let encoded = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&encoded)?;
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, encoded, signature
        );

        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(venue_error(format!("{} -> {}: {}", path, status, body)));
        }
        Ok(body)
    }

    /// Places a native market order and validates the full-fill invariant.
    async fn market_order(&self, pair: &str, side: &str, qty: f64) -> Result<Fill> {
        let body = self
            .request_signed(
                reqwest::Method::POST,
                "/api/v3/order",
                &[
                    ("symbol", pair.to_string()),
                    ("side", side.to_string()),
                    ("type", "MARKET".to_string()),
                    ("quantity", format!("{}", qty)),
                ],
            )
            .await?;

        let order_id = body
            .get("orderId")
            .map(|v| v.to_string())
            .ok_or_else(|| venue_error(format!("order response missing orderId: {}", body)))?;
        let executed = parse_f64(
            body.get("executedQty").unwrap_or(&Value::Null),
            "executedQty",
        )?;

        if (executed - qty).abs() > crate::pricing::filters::STEP_EPSILON {
            return Err(SpotterError::FillUnconfirmed {
                order_id,
                submitted: qty,
                filled: executed,
            });
        }

        // realized average from the fills breakdown
        let mut notional = 0.0;
        if let Some(fills) = body.get("fills").and_then(|f| f.as_array()) {
            for fill in fills {
                let price = parse_f64(fill.get("price").unwrap_or(&Value::Null), "fill price")?;
                let fqty = parse_f64(fill.get("qty").unwrap_or(&Value::Null), "fill qty")?;
                notional += price * fqty;
            }
        }
        let avg_price = if executed > 0.0 { notional / executed } else { 0.0 };

        Ok(Fill {
            order_id,
            avg_price,
            filled_qty: executed,
        })
    }

    fn parse_depth_side(body: &Value, side: BookSide) -> Result<Vec<BookLevel>> {
        let key = match side {
            BookSide::Bids => "bids",
            BookSide::Asks => "asks",
        };
        let raw = body
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| venue_error(format!("depth response missing {}", key)))?;

        let mut levels = Vec::with_capacity(raw.len());
        for entry in raw {
            let pair = entry
                .as_array()
                .filter(|a| a.len() >= 2)
                .ok_or_else(|| venue_error("malformed depth level"))?;
            levels.push(BookLevel::new(
                parse_f64(&pair[0], "depth price")?,
                parse_f64(&pair[1], "depth qty")?,
            ));
        }
        Ok(levels)
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Binance
    }

    async fn ticker_price(&self, pair: &str) -> Result<f64> {
        let body = self
            .get_public("/api/v3/ticker/price", &[("symbol", pair.to_string())])
            .await?;
        parse_f64(body.get("price").unwrap_or(&Value::Null), "ticker price")
    }

    async fn order_book(&self, pair: &str, side: BookSide) -> Result<Vec<BookLevel>> {
        let body = self
            .get_public(
                "/api/v3/depth",
                &[
                    ("symbol", pair.to_string()),
                    ("limit", DEPTH_LIMIT.to_string()),
                ],
            )
            .await?;
        Self::parse_depth_side(&body, side)
    }

    async fn market_buy(&self, pair: &str, qty: f64) -> Result<Fill> {
        self.market_order(pair, "BUY", qty).await
    }

    async fn market_sell(&self, pair: &str, qty: f64) -> Result<Fill> {
        self.market_order(pair, "SELL", qty).await
    }

    async fn balances(&self) -> Result<HashMap<String, f64>> {
        let body = self
            .request_signed(reqwest::Method::GET, "/api/v3/account", &[])
            .await?;
        let raw = body
            .get("balances")
            .and_then(|v| v.as_array())
            .ok_or_else(|| venue_error("account response missing balances"))?;

        let mut balances = HashMap::with_capacity(raw.len());
        for entry in raw {
            let asset = entry
                .get("asset")
                .and_then(|v| v.as_str())
                .ok_or_else(|| venue_error("balance entry missing asset"))?;
            let free = parse_f64(entry.get("free").unwrap_or(&Value::Null), "balance free")?;
            balances.insert(asset.to_string(), free);
        }
        Ok(balances)
    }

    async fn lot_filters(&self) -> Result<HashMap<String, LotSizeFilter>> {
        let body = self.get_public("/api/v3/exchangeInfo", &[]).await?;
        let symbols = body
            .get("symbols")
            .and_then(|v| v.as_array())
            .ok_or_else(|| venue_error("exchangeInfo missing symbols"))?;

        let mut filters = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let name = match symbol.get("symbol").and_then(|v| v.as_str()) {
                Some(n) => n,
                None => continue,
            };
            let Some(entries) = symbol.get("filters").and_then(|v| v.as_array()) else {
                continue;
            };
            for entry in entries {
                if entry.get("filterType").and_then(|v| v.as_str()) == Some("LOT_SIZE") {
                    filters.insert(
                        name.to_string(),
                        LotSizeFilter::new(
                            parse_f64(entry.get("minQty").unwrap_or(&Value::Null), "minQty")?,
                            parse_f64(entry.get("maxQty").unwrap_or(&Value::Null), "maxQty")?,
                            parse_f64(entry.get("stepSize").unwrap_or(&Value::Null), "stepSize")?,
                        ),
                    );
                }
            }
        }
        Ok(filters)
    }
}
