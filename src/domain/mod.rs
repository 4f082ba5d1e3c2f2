pub mod market;
pub mod transaction;

pub use market::{CryptoPrice, CryptoPriceSnapshot, ExchangeRateSnapshot};
pub use transaction::{Fees, NewTransaction, PaymentMethod, PropertyRef, Transaction, TransactionStatus};
