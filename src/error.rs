use std::fmt;
use thiserror::Error;

/// Closed set of wallet connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletErrorKind {
    NotInstalled,
    UserRejected,
    AlreadyProcessing,
    Unauthorized,
    UnsupportedChain,
    Unknown,
}

impl WalletErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletErrorKind::NotInstalled => "NOT_INSTALLED",
            WalletErrorKind::UserRejected => "USER_REJECTED",
            WalletErrorKind::AlreadyProcessing => "ALREADY_PROCESSING",
            WalletErrorKind::Unauthorized => "UNAUTHORIZED",
            WalletErrorKind::UnsupportedChain => "UNSUPPORTED_CHAIN",
            WalletErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for WalletErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} ({code}): {message}")]
pub struct WalletError {
    pub code: String,
    pub message: String,
    pub kind: WalletErrorKind,
}

impl WalletError {
    pub fn new(kind: WalletErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
        }
    }

    pub fn not_installed() -> Self {
        Self::new(
            WalletErrorKind::NotInstalled,
            "NO_ETHEREUM_PROVIDER",
            "No wallet extension is installed. Install a wallet to connect.",
        )
    }
}

/// Closed set of transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    InsufficientFunds,
    Rejected,
    NetworkError,
    Unknown,
}

impl TransactionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TransactionErrorKind::Rejected => "REJECTED",
            TransactionErrorKind::NetworkError => "NETWORK_ERROR",
            TransactionErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TransactionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} ({code}): {message}")]
pub struct TransactionError {
    pub code: String,
    pub message: String,
    pub kind: TransactionErrorKind,
}

impl TransactionError {
    pub fn new(
        kind: TransactionErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
        }
    }

    pub fn insufficient_funds() -> Self {
        Self::new(
            TransactionErrorKind::InsufficientFunds,
            "INSUFFICIENT_FUNDS",
            "Insufficient funds in your wallet to complete this transaction",
        )
    }
}

/// Error from the transfer path, which may need to connect the wallet first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Raw failure reported by a wallet RPC call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to encode transaction: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Transaction not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Status oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown reference: {0}")]
    UnknownReference(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Currency {0} not supported")]
    UnsupportedCurrency(String),
}

/// Failures surfaced by the payment flow.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("You must be signed in to make an offer")]
    AuthRequired,

    #[error("Your session has expired. Please sign in again to continue.")]
    AuthExpired,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Wallet(WalletError),

    #[error(transparent)]
    Transaction(TransactionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transaction {transaction_id} failed to settle")]
    SettlementFailed { transaction_id: String },

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

impl PaymentError {
    /// Stable tag callers branch on.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::AuthRequired => "AUTH_REQUIRED",
            PaymentError::AuthExpired => "AUTH_EXPIRED",
            PaymentError::Validation(_) => "VALIDATION",
            PaymentError::Wallet(e) => e.kind.as_str(),
            PaymentError::Transaction(e) => e.kind.as_str(),
            PaymentError::Ledger(_) => "LEDGER_ERROR",
            PaymentError::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            PaymentError::InvalidState { .. } => "INVALID_STATE",
        }
    }

    /// Whether the flow offers a replay of the same composed offer.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Wallet(e) => e.kind != WalletErrorKind::NotInstalled,
            PaymentError::Transaction(_)
            | PaymentError::Ledger(_)
            | PaymentError::SettlementFailed { .. }
            | PaymentError::AuthExpired => true,
            PaymentError::AuthRequired
            | PaymentError::Validation(_)
            | PaymentError::InvalidState { .. } => false,
        }
    }
}

impl From<TransferError> for PaymentError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Wallet(e) => PaymentError::Wallet(e),
            TransferError::Transaction(e) => PaymentError::Transaction(e),
        }
    }
}

impl From<WalletError> for PaymentError {
    fn from(err: WalletError) -> Self {
        PaymentError::Wallet(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_error_kind_tags() {
        assert_eq!(WalletErrorKind::NotInstalled.as_str(), "NOT_INSTALLED");
        assert_eq!(WalletErrorKind::UnsupportedChain.as_str(), "UNSUPPORTED_CHAIN");
    }

    #[test]
    fn test_transfer_error_maps_to_payment_error() {
        let err: PaymentError = TransferError::from(TransactionError::insufficient_funds()).into();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_installed_is_not_retryable() {
        let err = PaymentError::from(WalletError::not_installed());
        assert_eq!(err.code(), "NOT_INSTALLED");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_expired_code() {
        assert_eq!(PaymentError::AuthExpired.code(), "AUTH_EXPIRED");
        assert!(PaymentError::AuthExpired.is_retryable());
    }

    #[test]
    fn test_validation_error_display() {
        let err = PaymentError::Validation("Please select a cryptocurrency".to_string());
        assert_eq!(err.to_string(), "Validation error: Please select a cryptocurrency");
        assert!(!err.is_retryable());
    }
}
