use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use tracing::{debug, warn};

use super::OracleError;

const CRYPTOCOMPARE_BASE: &str = "https://min-api.cryptocompare.com";
pub const FIAT_CURRENCY: &str = "USD";

/// 캐시된 시세
#[derive(Debug, Clone, PartialEq)]
pub struct PriceData {
    pub symbol: String,
    pub price_usd: f64,
    /// unix seconds
    pub timestamp: i64,
}

impl PriceData {
    pub fn new(symbol: &str, price_usd: f64) -> Self {
        Self { symbol: symbol.to_string(), price_usd, timestamp: chrono::Utc::now().timestamp() }
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        let age = chrono::Utc::now().timestamp() - self.timestamp;
        age < 0 || age as u64 > max_age.as_secs()
    }
}

/// Symbol → USD price source.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, OracleError>;
}

/// CryptoCompare `pricemulti` client
pub struct CryptoCompareFeed {
    client: Client,
    base_url: String,
}

impl CryptoCompareFeed {
    pub fn new() -> Self {
        Self::with_base_url(CRYPTOCOMPARE_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self { client: Client::new(), base_url: base_url.trim_end_matches('/').to_string() }
    }
}

impl Default for CryptoCompareFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceFeed for CryptoCompareFeed {
    async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, OracleError> {
        let url = format!("{}/data/pricemulti", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("fsyms", symbols.join(",")), ("tsyms", FIAT_CURRENCY.to_string())])
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Network(format!("status {}", response.status())));
        }

        let body: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        Ok(body
            .into_iter()
            .filter_map(|(symbol, per_currency)| per_currency.get(FIAT_CURRENCY).map(|p| (symbol, *p)))
            .collect())
    }
}

/// Price lookups served from a cache while entries are younger than the caller's max age.
pub struct CachedPriceOracle<F: PriceFeed> {
    feed: F,
    cache: DashMap<String, PriceData>,
}

impl<F: PriceFeed> CachedPriceOracle<F> {
    pub fn new(feed: F) -> Self {
        Self { feed, cache: DashMap::new() }
    }

    pub async fn price(&self, symbol: &str, max_age: Duration) -> Result<f64, OracleError> {
        if let Some(cached) = self.cache.get(symbol) {
            if !cached.is_stale(max_age) {
                return Ok(cached.price_usd);
            }
        }

        match self.feed.fetch_prices(&[symbol.to_string()]).await {
            Ok(prices) => {
                let price = *prices.get(symbol).ok_or_else(|| OracleError::PriceNotFound(symbol.to_string()))?;
                debug!("💲 {} = {} {}", symbol, price, FIAT_CURRENCY);
                self.cache.insert(symbol.to_string(), PriceData::new(symbol, price));
                Ok(price)
            }
            Err(e) => {
                // stale beats nothing
                if let Some(cached) = self.cache.get(symbol) {
                    warn!("⚠️ price fetch for {} failed, using cached value: {}", symbol, e);
                    return Ok(cached.price_usd);
                }
                Err(e)
            }
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFeed {
        calls: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl PriceFeed for CountingFeed {
        async fn fetch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                return Err(OracleError::Network("down".to_string()));
            }
            Ok(symbols.iter().map(|s| (s.clone(), 2000.0)).collect())
        }
    }

    #[tokio::test]
    async fn test_cache_within_max_age() {
        let oracle = CachedPriceOracle::new(CountingFeed { calls: AtomicUsize::new(0), fail_after: usize::MAX });
        assert_eq!(oracle.price("ETH", Duration::from_secs(60)).await.unwrap(), 2000.0);
        assert_eq!(oracle.price("ETH", Duration::from_secs(60)).await.unwrap(), 2000.0);
        assert_eq!(oracle.feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_value_used_when_feed_fails() {
        let oracle = CachedPriceOracle::new(CountingFeed { calls: AtomicUsize::new(0), fail_after: 1 });
        oracle.price("ETH", Duration::from_secs(60)).await.unwrap();
        {
            let mut entry = oracle.cache.get_mut("ETH").unwrap();
            entry.timestamp -= 3600;
        }
        assert_eq!(oracle.price("ETH", Duration::from_secs(60)).await.unwrap(), 2000.0);
        assert!(oracle.price("SNT", Duration::from_secs(60)).await.is_err());
    }

    #[test]
    fn test_pricemulti_shape() {
        let raw = r#"{"ETH":{"USD":2512.3},"USDC":{"USD":1.0}}"#;
        let body: HashMap<String, HashMap<String, f64>> = serde_json::from_str(raw).unwrap();
        assert_eq!(body["ETH"]["USD"], 2512.3);
    }
}
