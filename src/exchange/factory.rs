use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SpotterError};

use super::{BinanceClient, BittrexClient, ExchangeClient, ExchangeKind, KucoinClient};

/// API credentials for one venue, as configured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    /// Required by KuCoin only.
    #[serde(default)]
    pub api_passphrase: String,
    /// Override the venue's default REST base URL (testing).
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Create the exchange client for an explicit venue kind.
pub fn build_exchange(
    kind: ExchangeKind,
    credentials: &ExchangeCredentials,
    deviation: f64,
    confirm_wait: Duration,
) -> Result<Arc<dyn ExchangeClient>> {
    let base_url = credentials.base_url.as_deref();
    match kind {
        ExchangeKind::Binance => Ok(Arc::new(BinanceClient::new(
            base_url,
            credentials.api_key.clone(),
            credentials.api_secret.clone(),
        )?)),
        ExchangeKind::Bittrex => Ok(Arc::new(BittrexClient::new(
            base_url,
            credentials.api_key.clone(),
            credentials.api_secret.clone(),
            deviation,
            confirm_wait,
        )?)),
        ExchangeKind::Kucoin => {
            if credentials.api_passphrase.is_empty() {
                return Err(SpotterError::Auth(
                    "KuCoin requires an API passphrase".to_string(),
                ));
            }
            Ok(Arc::new(KucoinClient::new(
                base_url,
                credentials.api_key.clone(),
                credentials.api_secret.clone(),
                credentials.api_passphrase.clone(),
                deviation,
                confirm_wait,
            )?))
        }
    }
}
