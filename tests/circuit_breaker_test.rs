use offer_engine::adapters::{CoinGeckoClient, ExchangeRateApiClient};
use offer_engine::ports::ExchangeRateProvider;
use std::time::Duration;

#[tokio::test]
async fn test_circuit_breaker_state() {
    let rates = ExchangeRateApiClient::new("https://open.er-api.com/v6/latest/USD".to_string());
    let prices = CoinGeckoClient::new("https://api.coingecko.com/api/v3/coins/markets".to_string());

    // Initially, circuits should be closed
    assert_eq!(rates.circuit_state(), "closed");
    assert_eq!(prices.circuit_state(), "closed");
}

#[tokio::test]
async fn test_circuit_breaker_opens_on_unreachable_provider() {
    // Nothing listens on port 9; every call fails at connect time.
    let client = ExchangeRateApiClient::with_circuit_breaker(
        "http://127.0.0.1:9/latest".to_string(),
        Duration::from_secs(2),
        2,
        30,
    );

    for _ in 0..2 {
        assert!(client.fetch_rates().await.is_err());
    }
    assert_eq!(client.circuit_state(), "open");
}
