pub mod coingecko;
pub mod exchange_rate_api;
pub mod memory_store;
pub mod session;
pub mod simulated_oracle;
pub mod simulated_wallet;

pub use coingecko::CoinGeckoClient;
pub use exchange_rate_api::ExchangeRateApiClient;
pub use memory_store::MemoryDocumentStore;
pub use session::SessionHandle;
pub use simulated_oracle::SimulatedOracle;
pub use simulated_wallet::SimulatedWallet;

use failsafe::{backoff, failure_policy, Config as BreakerConfig, StateMachine};
use reqwest::Client;
use std::time::Duration;

pub(crate) type Breaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

pub(crate) fn circuit_breaker(failure_threshold: u32, reset_timeout_secs: u64) -> Breaker {
    let backoff = backoff::equal_jittered(
        Duration::from_secs(reset_timeout_secs),
        Duration::from_secs(reset_timeout_secs * 2),
    );
    let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
    BreakerConfig::new().failure_policy(policy).build()
}

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_default()
}

pub(crate) fn breaker_state(breaker: &Breaker) -> &'static str {
    if breaker.is_call_permitted() {
        "closed"
    } else {
        "open"
    }
}
