use async_trait::async_trait;
use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::Error as FailsafeError;
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use super::{breaker_state, circuit_breaker, http_client, Breaker};
use crate::domain::CryptoPrice;
use crate::error::ProviderError;
use crate::ports::CryptoPriceProvider;

/// One entry of the `/coins/markets` array
#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    symbol: String,
    name: String,
    current_price: f64,
    price_change_percentage_24h: Option<f64>,
}

impl MarketEntry {
    fn into_price(self) -> Result<CryptoPrice, ProviderError> {
        let current_price = BigDecimal::from_str(&self.current_price.to_string())
            .map_err(|e| ProviderError::InvalidResponse(format!("price for {}: {}", self.id, e)))?;

        Ok(CryptoPrice {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            current_price,
            price_change_percentage_24h: self.price_change_percentage_24h,
        })
    }
}

/// HTTP client for the CoinGecko market-data API.
#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    url: String,
    circuit_breaker: Breaker,
}

impl CoinGeckoClient {
    pub fn new(url: String) -> Self {
        Self::with_circuit_breaker(url, Duration::from_secs(30), 3, 60)
    }

    pub fn with_circuit_breaker(
        url: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        CoinGeckoClient {
            client: http_client(timeout),
            url,
            circuit_breaker: circuit_breaker(failure_threshold, reset_timeout_secs),
        }
    }

    pub fn circuit_state(&self) -> &'static str {
        breaker_state(&self.circuit_breaker)
    }
}

#[async_trait]
impl CryptoPriceProvider for CoinGeckoClient {
    async fn fetch_prices(&self) -> Result<Vec<CryptoPrice>, ProviderError> {
        let client = self.client.clone();
        let url = self.url.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?.error_for_status()?;
                let entries = response.json::<Vec<MarketEntry>>().await?;

                entries
                    .into_iter()
                    .map(MarketEntry::into_price)
                    .collect::<Result<Vec<_>, _>>()
            })
            .await;

        match result {
            Ok(prices) => Ok(prices),
            Err(FailsafeError::Rejected) => Err(ProviderError::CircuitBreakerOpen(
                "market data circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_prices_with_mock() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"[
            {"id":"bitcoin","symbol":"btc","name":"Bitcoin","current_price":65000,"price_change_percentage_24h":2.5},
            {"id":"ethereum","symbol":"eth","name":"Ethereum","current_price":3500.25,"price_change_percentage_24h":null}
        ]"#;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v3/coins/markets.*".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let client = CoinGeckoClient::new(format!(
            "{}/api/v3/coins/markets?vs_currency=usd&ids=bitcoin,ethereum",
            server.url()
        ));
        let prices = client.fetch_prices().await.unwrap();

        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].current_price, BigDecimal::from(65000));
        assert_eq!(prices[1].current_price, BigDecimal::from_str("3500.25").unwrap());
        assert_eq!(prices[1].price_change_percentage_24h, None);
    }

    #[tokio::test]
    async fn test_fetch_prices_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let client = CoinGeckoClient::new(server.url());
        let result = client.fetch_prices().await;

        assert!(matches!(result, Err(ProviderError::RequestError(_))));
        assert_eq!(client.circuit_state(), "closed");
    }
}
