//! Coopwise wallet service entrypoint
//!
//! Usage: `coopwise-wallet [env]` where `env` picks `config/{env}.yaml`
//! (default `dev`). Without a `postgres_url` the service runs on the
//! in-memory store, which is the dev/mock mode.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;

use coopwise_wallet::api;
use coopwise_wallet::cache::WalletCache;
use coopwise_wallet::config::AppConfig;
use coopwise_wallet::ledger::models::Currency;
use coopwise_wallet::ledger::store::LedgerStore;
use coopwise_wallet::ledger::{MemoryLedgerStore, PgLedgerStore};
use coopwise_wallet::logging;
use coopwise_wallet::notify::TracingSink;
use coopwise_wallet::rails::{CardRail, CashAgentRail, MockRail, OnChainRail, RailRegistry};
use coopwise_wallet::rates::{CachedRates, FixedRateProvider, HttpRateProvider, RateProvider};
use coopwise_wallet::settlement::SettlementEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::args().nth(1).unwrap_or_else(|| "dev".to_string());
    let config = AppConfig::load(&env)?;
    let _guard = logging::init_logging(&config);

    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        "starting coopwise-wallet"
    );

    let store: Arc<dyn LedgerStore> = match &config.postgres_url {
        Some(url) => {
            let store = PgLedgerStore::connect(url, config.pg_max_connections.unwrap_or(10))
                .await
                .context("connecting to postgres")?;
            tracing::info!("ledger store: postgres");
            Arc::new(store)
        }
        None => {
            tracing::warn!("no postgres_url configured, running on the in-memory store");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let mut rails = RailRegistry::new();
    if config.rails.mock.enabled {
        rails.register(Arc::new(MockRail::new(
            config.rails.mock.webhook_secret.clone(),
        )));
    }
    if let Some(card) = &config.rails.card {
        rails.register(Arc::new(CardRail::new(
            card.base_url.clone(),
            card.secret_key.clone(),
            card.webhook_secret.clone(),
        )));
    }
    if let Some(agent) = &config.rails.agent {
        let mut allowed = Vec::new();
        for source in &agent.allowed_sources {
            match source.parse() {
                Ok(ip) => allowed.push(ip),
                Err(_) => tracing::warn!(source = %source, "ignoring unparseable allowlist entry"),
            }
        }
        rails.register(Arc::new(CashAgentRail::new(
            agent.endpoint.clone(),
            agent.secret_key.clone(),
            agent.webhook_secret.clone(),
            allowed,
        )));
    }
    if let Some(chain) = &config.rails.chain {
        rails.register(Arc::new(OnChainRail::new(
            chain.rpc_url.clone(),
            chain.min_confirmations,
            chain.webhook_secret.clone(),
        )));
    }

    let provider: Arc<dyn RateProvider> = match &config.rates.endpoint {
        Some(endpoint) => Arc::new(HttpRateProvider::new(
            endpoint.clone(),
            config.rates.secret_key.clone(),
        )),
        None => {
            let local_per_stable = Decimal::from_str(&config.rates.fixed_local_per_stable)
                .context("parsing rates.fixed_local_per_stable")?;
            anyhow::ensure!(
                local_per_stable > Decimal::ZERO,
                "rates.fixed_local_per_stable must be positive"
            );
            let rate = Decimal::ONE / local_per_stable;
            let rates = HashMap::from([
                (Currency::NGN, rate),
                (Currency::GHS, rate),
                (Currency::KES, rate),
            ]);
            tracing::warn!(rate = %rate, "no rate endpoint configured, using the fixed rate");
            Arc::new(FixedRateProvider::new(rates))
        }
    };
    let rates = Arc::new(CachedRates::new(provider, config.rates.ttl_secs));

    let cache = Arc::new(WalletCache::new(Duration::from_secs(
        config.snapshot_ttl_secs(),
    )));
    let engine = SettlementEngine::new(store, rails, rates, cache, Arc::new(TracingSink));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing server address")?;
    api::serve(engine, addr).await
}
