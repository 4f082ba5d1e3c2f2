pub mod fees;
pub mod ledger;
pub mod orchestrator;
pub mod rate_cache;
pub mod receipt;
pub mod status_channel;
pub mod wallet;

pub use fees::{calculate_fees, calculate_fees_by_name, FeeBreakdown};
pub use ledger::TransactionLedger;
pub use orchestrator::{
    DisplayStatus, FlowState, InlineError, OfferDraft, OfferPreview, OrchestratorDeps,
    PaymentOrchestrator, Resume,
};
pub use rate_cache::{crypto_amount, RateCache, SUPPORTED_CURRENCIES};
pub use status_channel::{PollingStatusChannel, StatusCallback, StatusChannel, Subscription};
pub use wallet::{TransferOptions, TransferReceipt, WalletConnector};
