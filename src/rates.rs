//! Exchange-Rate Providers
//!
//! Sources for the local-currency -> stable-unit rate stamped on ledger
//! entries at initiation. Production fetches from the rate service and
//! caches per currency with a short TTL; dev/tests run on a fixed rate.

use std::collections::HashMap;

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::ledger::models::Currency;

/// Default TTL for cached rate quotes
pub const RATE_TTL_SECONDS: u64 = 30;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("Rate service unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed rate response: {0}")]
    Malformed(String),

    #[error("Non-positive rate for {currency}: {rate}")]
    NonPositive { currency: Currency, rate: Decimal },

    #[error("No rate configured for {0}")]
    Unsupported(Currency),
}

/// Source of conversion rates, local currency -> stable unit
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn rate(&self, currency: Currency) -> Result<Decimal, RateError>;
}

/// Static rates for dev and tests
pub struct FixedRateProvider {
    rates: HashMap<Currency, Decimal>,
}

impl FixedRateProvider {
    pub fn new(rates: HashMap<Currency, Decimal>) -> Self {
        Self { rates }
    }

    /// Single-currency convenience constructor
    pub fn single(currency: Currency, rate: Decimal) -> Self {
        Self::new(HashMap::from([(currency, rate)]))
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn rate(&self, currency: Currency) -> Result<Decimal, RateError> {
        let rate = *self
            .rates
            .get(&currency)
            .ok_or(RateError::Unsupported(currency))?;
        if rate <= Decimal::ZERO {
            return Err(RateError::NonPositive { currency, rate });
        }
        Ok(rate)
    }
}

const MARKET_RATE_QUERY: &str = r#"
query MarketRate($currencyCode: P2PPaymentCurrency!) {
  marketRate(currencyCode: $currencyCode) {
    depositRate
  }
}
"#;

#[derive(Deserialize)]
struct MarketRateData {
    #[serde(rename = "marketRate")]
    market_rate: MarketRate,
}

#[derive(Deserialize)]
struct MarketRate {
    /// Units of local currency per stable unit
    #[serde(rename = "depositRate")]
    deposit_rate: Decimal,
}

/// Live rates from the rate service's GraphQL endpoint
pub struct HttpRateProvider {
    endpoint: String,
    secret_key: String,
}

impl HttpRateProvider {
    pub fn new(endpoint: String, secret_key: String) -> Self {
        Self {
            endpoint,
            secret_key,
        }
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn rate(&self, currency: Currency) -> Result<Decimal, RateError> {
        let response = crate::rails::HTTP_CLIENT
            .post(&self.endpoint)
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "query": MARKET_RATE_QUERY,
                "variables": { "currencyCode": currency },
            }))
            .send()
            .await
            .map_err(|e| RateError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RateError::Unavailable(format!(
                "rate service returned {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct Envelope {
            data: Option<MarketRateData>,
        }
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| RateError::Malformed(e.to_string()))?;
        let quoted = envelope
            .data
            .ok_or_else(|| RateError::Malformed("rate response without data".to_string()))?
            .market_rate
            .deposit_rate;

        if quoted <= Decimal::ZERO {
            return Err(RateError::NonPositive {
                currency,
                rate: quoted,
            });
        }
        // The service quotes local units per stable unit
        Ok(Decimal::ONE / quoted)
    }
}

/// TTL cache in front of any provider. A stale-but-bounded rate is fine
/// here: the rate on an entry is a snapshot anyway.
pub struct CachedRates {
    inner: Arc<dyn RateProvider>,
    cache: Mutex<TimedCache<Currency, Decimal>>,
}

impl CachedRates {
    pub fn new(inner: Arc<dyn RateProvider>, ttl_seconds: u64) -> Self {
        Self {
            inner,
            cache: Mutex::new(TimedCache::with_lifespan(ttl_seconds)),
        }
    }
}

#[async_trait]
impl RateProvider for CachedRates {
    async fn rate(&self, currency: Currency) -> Result<Decimal, RateError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(rate) = cache.cache_get(&currency) {
                return Ok(*rate);
            }
        }

        // Fetch outside the lock; a duplicate fetch under contention is
        // harmless
        let rate = self.inner.rate(currency).await?;

        let mut cache = self.cache.lock().await;
        cache.cache_set(currency, rate);
        Ok(rate)
    }
}
