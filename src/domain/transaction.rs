//! Transaction domain entity.
//! Framework-agnostic representation of a submitted offer payment.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement status persisted in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// `Confirmed` and `Failed` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }

    /// Ordering used to keep delivered updates monotonic. Both terminal states share the top rank.
    pub fn severity(&self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::Processing => 1,
            TransactionStatus::Confirmed | TransactionStatus::Failed => 2,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Bank,
    Crypto,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Crypto => "crypto",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "bank" => Ok(PaymentMethod::Bank),
            "crypto" => Ok(PaymentMethod::Crypto),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// Fee components recorded on a transaction, all in the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub processor_fee: BigDecimal,
    pub network_fee: BigDecimal,
    pub platform_fee: BigDecimal,
    pub total_fee: BigDecimal,
}

impl Fees {
    pub fn zero() -> Self {
        Self {
            processor_fee: BigDecimal::from(0),
            network_fee: BigDecimal::from(0),
            platform_fee: BigDecimal::from(0),
            total_fee: BigDecimal::from(0),
        }
    }
}

/// Listing the offer is made against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRef {
    pub id: String,
    pub title: String,
}

/// Input for creating a ledger record.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub hash: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub recipient: String,
    pub sender: String,
    pub fees: Fees,
    pub property: Option<PropertyRef>,
    pub crypto_amount: Option<BigDecimal>,
    pub crypto_symbol: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Durable transaction record.
///
/// `id` is not part of the stored document body: the store that accepted the write assigns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(skip)]
    pub id: String,
    pub hash: String,
    pub status: TransactionStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub confirmations: u32,
    pub recipient: String,
    pub sender: String,
    pub fees: Fees,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_amount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_symbol: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Transaction {
    /// Builds a fresh `pending` record with no confirmations. The caller assigns `id`.
    pub fn new(input: NewTransaction) -> Self {
        let (property_id, property_title) = match input.property {
            Some(p) => (Some(p.id), Some(p.title)),
            None => (None, None),
        };

        Self {
            id: String::new(),
            hash: input.hash,
            status: TransactionStatus::Pending,
            amount: input.amount,
            currency: input.currency,
            payment_method: input.payment_method,
            timestamp: Utc::now().timestamp_millis(),
            confirmations: 0,
            recipient: input.recipient,
            sender: input.sender,
            fees: input.fees,
            property_id,
            property_title,
            crypto_amount: input.crypto_amount,
            crypto_symbol: input.crypto_symbol,
            metadata: input.metadata,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
