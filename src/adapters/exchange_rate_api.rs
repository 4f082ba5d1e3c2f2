use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::Error as FailsafeError;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{breaker_state, circuit_breaker, http_client, Breaker};
use crate::error::ProviderError;
use crate::ports::ExchangeRateProvider;

/// Response from the `/latest/USD` endpoint
#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: Option<String>,
    rates: Option<HashMap<String, f64>>,
}

/// HTTP client for a USD-based exchange rate API (open.er-api.com shape).
#[derive(Clone)]
pub struct ExchangeRateApiClient {
    client: Client,
    url: String,
    circuit_breaker: Breaker,
}

impl ExchangeRateApiClient {
    pub fn new(url: String) -> Self {
        Self::with_circuit_breaker(url, Duration::from_secs(30), 3, 60)
    }

    pub fn with_circuit_breaker(
        url: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        ExchangeRateApiClient {
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
impl ExchangeRateProvider for ExchangeRateApiClient {
    async fn fetch_rates(&self) -> Result<HashMap<String, f64>, ProviderError> {
        let client = self.client.clone();
        let url = self.url.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?.error_for_status()?;
                let body = response.json::<LatestRatesResponse>().await?;

                match body.rates {
                    Some(rates) if !rates.is_empty() => Ok(rates),
                    _ => Err(ProviderError::InvalidResponse(format!(
                        "no rates in response (result: {})",
                        body.result.as_deref().unwrap_or("missing")
                    ))),
                }
            })
            .await;

        match result {
            Ok(rates) => Ok(rates),
            Err(FailsafeError::Rejected) => Err(ProviderError::CircuitBreakerOpen(
                "exchange rate API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ExchangeRateApiClient::new("https://open.er-api.com/v6/latest/USD".to_string());
        assert_eq!(client.url, "https://open.er-api.com/v6/latest/USD");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_fetch_rates_with_mock() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v6/latest/USD")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"success","base_code":"USD","rates":{"USD":1,"EUR":0.92,"GBP":0.79}}"#)
            .create_async()
            .await;

        let client = ExchangeRateApiClient::new(format!("{}/v6/latest/USD", server.url()));
        let rates = client.fetch_rates().await.unwrap();

        assert_eq!(rates.get("EUR"), Some(&0.92));
        assert_eq!(rates.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_rates_without_rates_is_invalid() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v6/latest/USD")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"error","error-type":"quota-reached"}"#)
            .create_async()
            .await;

        let client = ExchangeRateApiClient::new(format!("{}/v6/latest/USD", server.url()));
        let result = client.fetch_rates().await;

        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v6/latest/USD")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = ExchangeRateApiClient::with_circuit_breaker(
            format!("{}/v6/latest/USD", server.url()),
            Duration::from_secs(5),
            3,
            30,
        );

        for _ in 0..3 {
            let _ = client.fetch_rates().await;
        }

        let result = client.fetch_rates().await;
        assert!(matches!(result, Err(ProviderError::CircuitBreakerOpen(_))));
        assert_eq!(client.circuit_state(), "open");
    }
}
