//! Time-windowed access to fiat exchange rates and crypto spot prices.
//!
//! Both caches always answer: a fresh snapshot when the upstream provider cooperates, the
//! last good snapshot when it does not, and a static table when nothing was ever fetched.

use arc_swap::ArcSwapOption;
use bigdecimal::BigDecimal;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{CryptoPrice, CryptoPriceSnapshot, ExchangeRateSnapshot};
use crate::error::ConversionError;
use crate::ports::{CryptoPriceProvider, ExchangeRateProvider};

/// Display currencies offered for conversion previews.
pub const SUPPORTED_CURRENCIES: &[(&str, &str)] = &[
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("JPY", "Japanese Yen"),
    ("CAD", "Canadian Dollar"),
    ("AUD", "Australian Dollar"),
    ("CNY", "Chinese Yuan"),
    ("INR", "Indian Rupee"),
    ("BRL", "Brazilian Real"),
    ("CHF", "Swiss Franc"),
    ("KRW", "South Korean Won"),
    ("SGD", "Singapore Dollar"),
    ("NZD", "New Zealand Dollar"),
    ("MXN", "Mexican Peso"),
    ("HKD", "Hong Kong Dollar"),
];

struct Cached<T> {
    value: Arc<T>,
    loaded_at: Instant,
}

impl<T> Cached<T> {
    fn fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

pub struct RateCache {
    rate_provider: Arc<dyn ExchangeRateProvider>,
    price_provider: Arc<dyn CryptoPriceProvider>,
    rates: ArcSwapOption<Cached<ExchangeRateSnapshot>>,
    prices: ArcSwapOption<Cached<CryptoPriceSnapshot>>,
    rate_ttl: Duration,
    price_ttl: Duration,
    price_timeout: Duration,
    price_tickets: AtomicU64,
    /// Ticket of the newest price fetch written to `prices`.
    price_applied: Mutex<u64>,
}

impl RateCache {
    pub fn new(
        rate_provider: Arc<dyn ExchangeRateProvider>,
        price_provider: Arc<dyn CryptoPriceProvider>,
        rate_ttl: Duration,
        price_ttl: Duration,
        price_timeout: Duration,
    ) -> Self {
        Self {
            rate_provider,
            price_provider,
            rates: ArcSwapOption::empty(),
            prices: ArcSwapOption::empty(),
            rate_ttl,
            price_ttl,
            price_timeout,
            price_tickets: AtomicU64::new(0),
            price_applied: Mutex::new(0),
        }
    }

    pub fn from_config(
        config: &Config,
        rate_provider: Arc<dyn ExchangeRateProvider>,
        price_provider: Arc<dyn CryptoPriceProvider>,
    ) -> Self {
        Self::new(
            rate_provider,
            price_provider,
            config.rate_cache_ttl(),
            config.price_cache_ttl(),
            config.price_fetch_timeout(),
        )
    }

    /// Drops both cached snapshots and restarts price-fetch ordering.
    pub fn clear(&self) {
        let mut applied = self.price_applied.lock();
        self.rates.store(None);
        self.prices.store(None);
        self.price_tickets.store(0, Ordering::SeqCst);
        *applied = 0;
    }

    pub async fn get_exchange_rates(&self) -> Arc<ExchangeRateSnapshot> {
        let cached = self.rates.load_full();
        if let Some(entry) = cached.as_ref().filter(|c| c.fresh(self.rate_ttl)) {
            debug!("serving cached exchange rates");
            return entry.value.clone();
        }

        match self.rate_provider.fetch_rates().await {
            Ok(raw) => {
                let rates = to_decimal_rates(raw);
                if rates.is_empty() {
                    warn!("exchange rate provider returned an empty table");
                } else {
                    let snapshot = Arc::new(ExchangeRateSnapshot {
                        rates,
                        fetched_at: Utc::now(),
                    });
                    self.rates.store(Some(Arc::new(Cached {
                        value: snapshot.clone(),
                        loaded_at: Instant::now(),
                    })));
                    return snapshot;
                }
            }
            Err(e) => warn!("Error fetching exchange rates: {}", e),
        }

        match cached {
            Some(entry) => {
                debug!("falling back to last good exchange rates");
                entry.value.clone()
            }
            None => {
                debug!("falling back to static exchange rates");
                Arc::new(static_exchange_rates())
            }
        }
    }

    pub async fn get_crypto_prices(&self) -> Arc<CryptoPriceSnapshot> {
        let cached = self.prices.load_full();
        if let Some(entry) = cached.as_ref().filter(|c| c.fresh(self.price_ttl)) {
            debug!("serving cached crypto prices");
            return entry.value.clone();
        }

        let ticket = self.price_tickets.fetch_add(1, Ordering::SeqCst) + 1;

        // A fetch that loses the race is dropped here, so its result can never reach the cache.
        match timeout(self.price_timeout, self.price_provider.fetch_prices()).await {
            Ok(Ok(prices)) if !prices.is_empty() => return self.apply_prices(ticket, prices),
            Ok(Ok(_)) => warn!("market data provider returned no prices"),
            Ok(Err(e)) => warn!("Error fetching crypto prices: {}", e),
            Err(_) => warn!("crypto price fetch timed out after {:?}", self.price_timeout),
        }

        match self.prices.load_full() {
            Some(entry) => {
                debug!("using cached crypto prices");
                entry.value.clone()
            }
            None => {
                debug!("using static crypto prices");
                Arc::new(static_crypto_prices())
            }
        }
    }

    /// Writes a completed fetch unless a later-issued fetch already landed.
    fn apply_prices(&self, ticket: u64, prices: Vec<CryptoPrice>) -> Arc<CryptoPriceSnapshot> {
        let mut applied = self.price_applied.lock();
        if *applied > ticket {
            debug!(ticket, applied = *applied, "discarding superseded price fetch");
            if let Some(entry) = self.prices.load_full() {
                return entry.value.clone();
            }
        }

        let snapshot = Arc::new(CryptoPriceSnapshot {
            prices,
            fetched_at: Utc::now(),
        });
        self.prices.store(Some(Arc::new(Cached {
            value: snapshot.clone(),
            loaded_at: Instant::now(),
        })));
        *applied = ticket;
        snapshot
    }

    /// Converts a USD amount into `target`. USD is the identity.
    pub async fn convert_currency(
        &self,
        amount_usd: &BigDecimal,
        target: &str,
    ) -> Result<BigDecimal, ConversionError> {
        let code = target.trim().to_ascii_uppercase();
        if code == "USD" {
            return Ok(amount_usd.clone());
        }

        let snapshot = self.get_exchange_rates().await;
        snapshot
            .rates
            .get(&code)
            .map(|rate| amount_usd * rate)
            .ok_or(ConversionError::UnsupportedCurrency(code))
    }

    /// Units of `code` per 1 USD, if known.
    pub async fn rate_for(&self, code: &str) -> Option<BigDecimal> {
        let code = code.trim().to_ascii_uppercase();
        if code == "USD" {
            return Some(BigDecimal::from(1));
        }
        self.get_exchange_rates().await.rates.get(&code).cloned()
    }

    pub async fn find_coin(&self, coin_id: &str) -> Option<CryptoPrice> {
        self.get_crypto_prices().await.find(coin_id).cloned()
    }
}

/// Amount denominated in a coin, rounded to 8 decimal places.
pub fn crypto_amount(amount_usd: &BigDecimal, price: &CryptoPrice) -> Option<BigDecimal> {
    if price.current_price <= BigDecimal::from(0) || *amount_usd <= BigDecimal::from(0) {
        return None;
    }
    Some((amount_usd / &price.current_price).round(8))
}

fn to_decimal_rates(raw: HashMap<String, f64>) -> HashMap<String, BigDecimal> {
    raw.into_iter()
        .filter_map(|(code, rate)| {
            BigDecimal::from_str(&rate.to_string())
                .ok()
                .map(|rate| (code.to_ascii_uppercase(), rate))
        })
        .collect()
}

fn decimal(digits: i64, scale: i64) -> BigDecimal {
    BigDecimal::new(digits.into(), scale)
}

/// USD-pegged majors used when no rates were ever fetched.
pub fn static_exchange_rates() -> ExchangeRateSnapshot {
    let rates = [
        ("USD", decimal(1, 0)),
        ("EUR", decimal(92, 2)),
        ("GBP", decimal(79, 2)),
        ("JPY", decimal(15121, 2)),
        ("CAD", decimal(138, 2)),
        ("AUD", decimal(153, 2)),
    ]
    .into_iter()
    .map(|(code, rate)| (code.to_string(), rate))
    .collect();

    ExchangeRateSnapshot {
        rates,
        fetched_at: Utc::now(),
    }
}

/// Placeholder prices for the tracked coins used when no prices were ever fetched.
pub fn static_crypto_prices() -> CryptoPriceSnapshot {
    CryptoPriceSnapshot {
        prices: vec![
            CryptoPrice::new("bitcoin", "btc", "Bitcoin", decimal(65000, 0), 2.5),
            CryptoPrice::new("ethereum", "eth", "Ethereum", decimal(3500, 0), 1.8),
            CryptoPrice::new("tether", "usdt", "Tether", decimal(1, 0), 0.1),
            CryptoPrice::new("usd-coin", "usdc", "USD Coin", decimal(1, 0), 0.05),
            CryptoPrice::new("binancecoin", "bnb", "Binance Coin", decimal(650, 0), 3.2),
        ],
        fetched_at: Utc::now(),
    }
}
