//! Contracts for the collaborators the payment engine consumes.
//!
//! Services only hold `Arc<dyn ...>` handles to these traits; `crate::adapters` provides
//! HTTP-backed and in-process implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::watch;

use crate::domain::{CryptoPrice, TransactionStatus};
use crate::error::{OracleError, ProviderError, RpcError, StoreError};

/// Signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
}

pub trait IdentityProvider: Send + Sync {
    /// One-shot session query.
    fn current_user(&self) -> Option<User>;

    /// Change subscription. Dropping the receiver unsubscribes.
    fn on_auth_change(&self) -> watch::Receiver<Option<User>>;
}

/// Equality filter on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Document returned by a store query, with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub body: Value,
}

/// Remote, eventually consistent document database. Writes may fail independently of reads.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, collection: &str, doc: Value) -> Result<String, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Merges `patch` into an existing document; `StoreError::NotFound` if it does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError>;

    async fn query(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
        order: Option<OrderBy>,
    ) -> Result<Vec<StoredDocument>, StoreError>;
}

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// USD-based rate table: currency code to units per 1 USD.
    async fn fetch_rates(&self) -> Result<HashMap<String, f64>, ProviderError>;
}

#[async_trait]
pub trait CryptoPriceProvider: Send + Sync {
    async fn fetch_prices(&self) -> Result<Vec<CryptoPrice>, ProviderError>;
}

/// Transfer request in the wallet's native units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub value_wei: u128,
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas_wei: Option<u128>,
    pub max_priority_fee_per_gas_wei: Option<u128>,
}

/// Browser-resident wallet primitives.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompts for account access and returns the authorized accounts.
    async fn request_accounts(&self) -> Result<Vec<String>, RpcError>;

    /// Accounts already authorized, without prompting.
    async fn accounts(&self) -> Result<Vec<String>, RpcError>;

    async fn get_balance(&self, address: &str) -> Result<u128, RpcError>;

    /// Returns the transfer hash.
    async fn send_transaction(&self, request: TransferRequest) -> Result<String, RpcError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: TransactionStatus,
    pub confirmations: u32,
}

/// External source of truth for whether a submitted transfer has settled.
#[async_trait]
pub trait StatusOracle: Send + Sync {
    async fn check_status(&self, reference: &str) -> Result<StatusSnapshot, OracleError>;
}
