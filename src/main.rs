use clap::Parser;
use spotter::cli::Cli;
use spotter::config::AppConfig;
use spotter::coordinator::CoordinatorClient;
use spotter::engine::Orchestrator;
use spotter::error::{Result, SpotterError};
use spotter::exchange::{build_exchange, ExchangeClient, ExchangeKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config.logging.level);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {}", e);
        }
        return Err(SpotterError::Internal("invalid configuration".to_string()));
    }

    let production = !cli.dev;
    info!(production, "spotter starting");

    let coordinator = build_coordinator(&config, production).await?;
    let exchanges = build_exchanges(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut orchestrator =
        Orchestrator::new(config, production, coordinator, exchanges, shutdown_rx);
    orchestrator.run().await
}

async fn build_coordinator(
    config: &AppConfig,
    production: bool,
) -> Result<Arc<CoordinatorClient>> {
    let (client_id, needs_registration) = match &config.coordinator.client_id {
        Some(id) => (id.clone(), false),
        None => (Uuid::new_v4().to_string(), true),
    };

    let coordinator = Arc::new(CoordinatorClient::new(
        config.coordinator.api_url.clone(),
        config.coordinator.api_key.clone(),
        client_id,
        production,
    )?);

    if needs_registration {
        match coordinator.register().await {
            Ok(()) => info!(client_id = coordinator.client_id(), "registered new client"),
            Err(e) => warn!("client registration failed: {}", e),
        }
    }
    Ok(coordinator)
}

fn build_exchanges(config: &AppConfig) -> Result<HashMap<ExchangeKind, Arc<dyn ExchangeClient>>> {
    let deviation = config.trading.deviation;
    let confirm_wait = config.trading.confirm_wait();

    let mut exchanges: HashMap<ExchangeKind, Arc<dyn ExchangeClient>> = HashMap::new();
    for (kind, credentials) in [
        (ExchangeKind::Binance, &config.exchanges.binance),
        (ExchangeKind::Bittrex, &config.exchanges.bittrex),
        (ExchangeKind::Kucoin, &config.exchanges.kucoin),
    ] {
        if let Some(credentials) = credentials {
            exchanges.insert(
                kind,
                build_exchange(kind, credentials, deviation, confirm_wait)?,
            );
            info!(exchange = %kind, "venue configured");
        }
    }

    if exchanges.is_empty() {
        return Err(SpotterError::Internal(
            "no exchange credentials configured".to_string(),
        ));
    }
    Ok(exchanges)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
