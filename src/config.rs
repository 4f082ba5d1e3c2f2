use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub const DEFAULT_EXCHANGE_RATE_URL: &str = "https://open.er-api.com/v6/latest/USD";
pub const DEFAULT_CRYPTO_PRICES_URL: &str = "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&ids=bitcoin,ethereum,tether,usd-coin,binancecoin&order=market_cap_desc";
pub const DEFAULT_SELLER_ADDRESS: &str = "0x1234567890123456789012345678901234567890";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub exchange_rate_url: String,
    pub crypto_prices_url: String,
    pub rate_cache_ttl_secs: u64,
    pub price_cache_ttl_secs: u64,
    pub price_fetch_timeout_ms: u64,
    pub http_timeout_secs: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
    pub status_poll_interval_secs: u64,
    pub oracle_latency_ms: u64,
    pub seller_address: String,
    pub default_gas_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange_rate_url: DEFAULT_EXCHANGE_RATE_URL.to_string(),
            crypto_prices_url: DEFAULT_CRYPTO_PRICES_URL.to_string(),
            rate_cache_ttl_secs: 60 * 60,
            price_cache_ttl_secs: 5 * 60,
            price_fetch_timeout_ms: 5000,
            http_timeout_secs: 30,
            circuit_breaker_threshold: 3,
            circuit_breaker_reset_secs: 60,
            status_poll_interval_secs: 5,
            oracle_latency_ms: 1000,
            seller_address: DEFAULT_SELLER_ADDRESS.to_string(),
            default_gas_limit: 21000,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let defaults = Config::default();

        Ok(Config {
            exchange_rate_url: env::var("EXCHANGE_RATE_URL").unwrap_or(defaults.exchange_rate_url),
            crypto_prices_url: env::var("CRYPTO_PRICES_URL").unwrap_or(defaults.crypto_prices_url),
            rate_cache_ttl_secs: parse_or("RATE_CACHE_TTL_SECS", defaults.rate_cache_ttl_secs)?,
            price_cache_ttl_secs: parse_or("PRICE_CACHE_TTL_SECS", defaults.price_cache_ttl_secs)?,
            price_fetch_timeout_ms: parse_or(
                "PRICE_FETCH_TIMEOUT_MS",
                defaults.price_fetch_timeout_ms,
            )?,
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            circuit_breaker_threshold: parse_or(
                "CIRCUIT_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            )?,
            circuit_breaker_reset_secs: parse_or(
                "CIRCUIT_BREAKER_RESET_SECS",
                defaults.circuit_breaker_reset_secs,
            )?,
            status_poll_interval_secs: parse_or(
                "STATUS_POLL_INTERVAL_SECS",
                defaults.status_poll_interval_secs,
            )?,
            oracle_latency_ms: parse_or("ORACLE_LATENCY_MS", defaults.oracle_latency_ms)?,
            seller_address: env::var("SELLER_ADDRESS").unwrap_or(defaults.seller_address),
            default_gas_limit: parse_or("DEFAULT_GAS_LIMIT", defaults.default_gas_limit)?,
        })
    }

    pub fn rate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_cache_ttl_secs)
    }

    pub fn price_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.price_cache_ttl_secs)
    }

    pub fn price_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.price_fetch_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    pub fn oracle_latency(&self) -> Duration {
        Duration::from_millis(self.oracle_latency_ms)
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        Err(_) => Ok(default),
    }
}
