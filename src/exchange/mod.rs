pub mod binance;
pub mod bittrex;
pub mod factory;
pub mod kucoin;
pub mod traits;

pub use binance::BinanceClient;
pub use bittrex::BittrexClient;
pub use factory::{build_exchange, ExchangeCredentials};
pub use kucoin::KucoinClient;
pub use traits::{parse_exchange_kind, ExchangeClient, ExchangeKind, Fill};
