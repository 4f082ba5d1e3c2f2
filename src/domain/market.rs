//! Market data snapshots served by the rate cache.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Spot price of one tracked coin in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoPrice {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: BigDecimal,
    pub price_change_percentage_24h: Option<f64>,
}

impl CryptoPrice {
    pub fn new(
        id: &str,
        symbol: &str,
        name: &str,
        current_price: BigDecimal,
        price_change_percentage_24h: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            current_price,
            price_change_percentage_24h: Some(price_change_percentage_24h),
        }
    }
}

/// Units of each currency per 1 USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateSnapshot {
    pub rates: HashMap<String, BigDecimal>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoPriceSnapshot {
    pub prices: Vec<CryptoPrice>,
    pub fetched_at: DateTime<Utc>,
}

impl CryptoPriceSnapshot {
    pub fn find(&self, coin_id: &str) -> Option<&CryptoPrice> {
        self.prices.iter().find(|p| p.id == coin_id)
    }
}
