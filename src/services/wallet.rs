//! Capability-gated bridge to a browser-resident wallet.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{
    RpcError, TransactionError, TransactionErrorKind, TransferError, WalletError, WalletErrorKind,
};
use crate::ports::{TransferRequest, WalletProvider};

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;
const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Optional bounds the caller can put on a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Symbol recorded on the receipt; defaults to ETH.
    pub currency: Option<String>,
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas_gwei: Option<u64>,
    pub max_priority_fee_per_gas_gwei: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub value_wei: u128,
}

#[derive(Clone)]
pub struct WalletConnector {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl WalletConnector {
    /// `None` models a browser without a wallet extension.
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_installed(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>, WalletError> {
        self.provider.as_ref().ok_or_else(WalletError::not_installed)
    }

    /// Requests account access and returns the first authorized address.
    pub async fn connect(&self) -> Result<String, WalletError> {
        let provider = self.provider()?;

        let accounts = provider.request_accounts().await.map_err(|e| {
            warn!("Error connecting to wallet: {}", e);
            map_connect_error(e)
        })?;

        let address = accounts.into_iter().next().ok_or_else(|| {
            WalletError::new(
                WalletErrorKind::Unauthorized,
                "NO_ACCOUNTS",
                "The wallet did not authorize any account.",
            )
        })?;

        info!(address = %address, "wallet connected");
        Ok(address)
    }

    /// Sends `amount` (in ether units) to `to`.
    ///
    /// Inputs are validated before the wallet is touched, and the sender's balance is checked
    /// before anything is submitted.
    pub async fn submit_transfer(
        &self,
        amount: &BigDecimal,
        to: &str,
        options: Option<TransferOptions>,
    ) -> Result<TransferReceipt, TransferError> {
        let options = options.unwrap_or_default();

        let value_wei = to_wei(amount).filter(|wei| *wei > 0).ok_or_else(|| {
            TransactionError::new(
                TransactionErrorKind::Unknown,
                "INVALID_AMOUNT",
                "Please enter a valid amount greater than 0",
            )
        })?;

        if !is_valid_address(to) {
            return Err(TransactionError::new(
                TransactionErrorKind::Unknown,
                "INVALID_ADDRESS",
                "Invalid recipient address",
            )
            .into());
        }

        let provider = self.provider()?;

        let mut accounts = provider
            .accounts()
            .await
            .map_err(map_transfer_error)?;
        if accounts.is_empty() {
            accounts = vec![self.connect().await?];
        }
        let from = accounts.swap_remove(0);

        let balance = provider
            .get_balance(&from)
            .await
            .map_err(map_transfer_error)?;
        if balance < value_wei {
            warn!(from = %from, balance, value_wei, "insufficient funds for transfer");
            return Err(TransactionError::insufficient_funds().into());
        }

        let request = TransferRequest {
            from: from.clone(),
            to: to.to_string(),
            value_wei,
            gas_limit: options.gas_limit,
            max_fee_per_gas_wei: options
                .max_fee_per_gas_gwei
                .map(|gwei| u128::from(gwei) * WEI_PER_GWEI),
            max_priority_fee_per_gas_wei: options
                .max_priority_fee_per_gas_gwei
                .map(|gwei| u128::from(gwei) * WEI_PER_GWEI),
        };

        let hash = provider.send_transaction(request).await.map_err(|e| {
            warn!("Error processing payment: {}", e);
            map_transfer_error(e)
        })?;

        info!(hash = %hash, from = %from, to, value_wei, "transfer submitted");
        Ok(TransferReceipt {
            hash,
            from,
            to: to.to_string(),
            amount: amount.clone(),
            currency: options.currency.unwrap_or_else(|| "ETH".to_string()),
            value_wei,
        })
    }
}

/// `0x` followed by 40 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    let Some(hex) = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Converts an ether-denominated amount to wei, truncating sub-wei digits.
pub fn to_wei(amount: &BigDecimal) -> Option<u128> {
    if *amount <= BigDecimal::from(0) {
        return None;
    }
    let wei = (amount * &BigDecimal::from(WEI_PER_ETHER)).with_scale(0);
    wei.to_string().parse::<u128>().ok()
}

fn map_connect_error(err: RpcError) -> WalletError {
    match err.code {
        4001 => WalletError::new(
            WalletErrorKind::UserRejected,
            "4001",
            "You rejected the connection request. Please approve the connection to continue.",
        ),
        -32002 => WalletError::new(
            WalletErrorKind::AlreadyProcessing,
            "-32002",
            "A connection request is already pending. Please check your wallet extension.",
        ),
        4100 => WalletError::new(
            WalletErrorKind::Unauthorized,
            "4100",
            "The requested account or method has not been authorized.",
        ),
        4901 | 4902 => WalletError::new(
            WalletErrorKind::UnsupportedChain,
            err.code.to_string(),
            "The wallet is connected to an unsupported network.",
        ),
        -32603 => WalletError::new(
            WalletErrorKind::Unknown,
            "-32603",
            "The wallet encountered an internal error. Please try again.",
        ),
        code => WalletError::new(WalletErrorKind::Unknown, code.to_string(), err.message),
    }
}

fn map_transfer_error(err: RpcError) -> TransactionError {
    let message = err.message.to_ascii_lowercase();
    if err.code == 4001 {
        TransactionError::new(
            TransactionErrorKind::Rejected,
            "4001",
            "You rejected the transaction. Please approve the transaction to continue.",
        )
    } else if message.contains("insufficient funds") {
        TransactionError::new(
            TransactionErrorKind::InsufficientFunds,
            "INSUFFICIENT_FUNDS",
            "Insufficient funds in your wallet to complete this transaction.",
        )
    } else if message.contains("network") {
        TransactionError::new(
            TransactionErrorKind::NetworkError,
            "NETWORK_ERROR",
            "Network error. Please check your internet connection and try again.",
        )
    } else {
        TransactionError::new(TransactionErrorKind::Unknown, err.code.to_string(), err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedWallet;
    use std::str::FromStr;

    const BUYER: &str = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd";
    const SELLER: &str = "0x1234567890123456789012345678901234567890";

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn connector(wallet: Arc<SimulatedWallet>) -> WalletConnector {
        WalletConnector::new(Some(wallet))
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address(SELLER));
        assert!(is_valid_address("0XABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD"));
        assert!(!is_valid_address("1234567890123456789012345678901234567890"));
        assert!(!is_valid_address("0x1234"));
        assert!(!is_valid_address("0xzz34567890123456789012345678901234567890"));
    }

    #[test]
    fn test_to_wei() {
        assert_eq!(to_wei(&dec("1")), Some(1_000_000_000_000_000_000));
        assert_eq!(to_wei(&dec("0.5")), Some(500_000_000_000_000_000));
        assert_eq!(to_wei(&dec("3.84615385")), Some(3_846_153_850_000_000_000));
        assert_eq!(to_wei(&dec("0")), None);
        assert_eq!(to_wei(&dec("-1")), None);
    }

    #[tokio::test]
    async fn test_connect_without_wallet() {
        let connector = WalletConnector::new(None);
        assert!(!connector.is_installed());

        let err = connector.connect().await.unwrap_err();
        assert_eq!(err.kind, WalletErrorKind::NotInstalled);
    }

    #[tokio::test]
    async fn test_connect_error_mapping() {
        let cases = [
            (4001, WalletErrorKind::UserRejected),
            (-32002, WalletErrorKind::AlreadyProcessing),
            (4100, WalletErrorKind::Unauthorized),
            (4902, WalletErrorKind::UnsupportedChain),
            (-32603, WalletErrorKind::Unknown),
            (42, WalletErrorKind::Unknown),
        ];

        for (code, kind) in cases {
            let wallet = Arc::new(SimulatedWallet::new(BUYER, 0));
            wallet.fail_next_connect(RpcError::new(code, "boom"));
            let err = connector(wallet).connect().await.unwrap_err();
            assert_eq!(err.kind, kind, "code {}", code);
        }
    }

    #[tokio::test]
    async fn test_transfer_validates_before_touching_wallet() {
        let connector = WalletConnector::new(None);

        let err = connector.submit_transfer(&dec("0"), SELLER, None).await.unwrap_err();
        assert!(matches!(err, TransferError::Transaction(ref e) if e.code == "INVALID_AMOUNT"));

        let err = connector.submit_transfer(&dec("1"), "seller", None).await.unwrap_err();
        assert!(matches!(err, TransferError::Transaction(ref e) if e.code == "INVALID_ADDRESS"));

        let err = connector.submit_transfer(&dec("1"), SELLER, None).await.unwrap_err();
        assert!(matches!(err, TransferError::Wallet(ref e) if e.kind == WalletErrorKind::NotInstalled));
    }

    #[tokio::test]
    async fn test_insufficient_funds_fails_fast() {
        let wallet = Arc::new(SimulatedWallet::new(BUYER, 1_000));
        let connector = connector(wallet.clone());

        let err = connector.submit_transfer(&dec("1"), SELLER, None).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Transaction(ref e) if e.kind == TransactionErrorKind::InsufficientFunds
        ));
        assert!(wallet.sent_transfers().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_connects_and_applies_options() {
        let wallet = Arc::new(SimulatedWallet::new(BUYER, 2 * 1_000_000_000_000_000_000));
        let connector = connector(wallet.clone());

        let receipt = connector
            .submit_transfer(
                &dec("1.5"),
                SELLER,
                Some(TransferOptions {
                    currency: Some("ETH".to_string()),
                    gas_limit: Some(21000),
                    max_fee_per_gas_gwei: Some(30),
                    max_priority_fee_per_gas_gwei: Some(2),
                }),
            )
            .await
            .unwrap();

        assert!(receipt.hash.starts_with("0x"));
        assert_eq!(receipt.from, BUYER);
        assert_eq!(receipt.value_wei, 1_500_000_000_000_000_000);

        let sent = wallet.sent_transfers();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].gas_limit, Some(21000));
        assert_eq!(sent[0].max_fee_per_gas_wei, Some(30_000_000_000));
        assert_eq!(sent[0].max_priority_fee_per_gas_wei, Some(2_000_000_000));
    }

    #[tokio::test]
    async fn test_transfer_error_mapping() {
        let cases = [
            (RpcError::new(4001, "User denied"), TransactionErrorKind::Rejected),
            (
                RpcError::new(-32000, "insufficient funds for gas"),
                TransactionErrorKind::InsufficientFunds,
            ),
            (
                RpcError::new(-32000, "network request failed"),
                TransactionErrorKind::NetworkError,
            ),
            (RpcError::new(-1, "nonce too low"), TransactionErrorKind::Unknown),
        ];

        for (rpc, kind) in cases {
            let wallet = Arc::new(SimulatedWallet::new(BUYER, u128::MAX));
            wallet.fail_next_send(rpc);
            let err = connector(wallet)
                .submit_transfer(&dec("1"), SELLER, None)
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::Transaction(ref e) if e.kind == kind));
        }
    }
}
