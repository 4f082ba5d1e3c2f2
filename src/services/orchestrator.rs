//! The buyer-facing offer flow.
//!
//! [`PaymentOrchestrator`] is a single-owner state machine: every method takes `&mut self`, and
//! asynchronous inputs (session transitions, status updates) are consumed through
//! [`PaymentOrchestrator::next_event`]. The session is re-checked on every call.

use bigdecimal::BigDecimal;
use serde_json::{json, Map};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{
    CryptoPrice, NewTransaction, PaymentMethod, PropertyRef, Transaction, TransactionStatus,
};
use crate::error::{PaymentError, WalletErrorKind};
use crate::ports::{IdentityProvider, User};
use crate::services::fees::{calculate_fees, FeeBreakdown};
use crate::services::ledger::TransactionLedger;
use crate::services::rate_cache::{crypto_amount, RateCache};
use crate::services::status_channel::{StatusChannel, Subscription};
use crate::services::wallet::{TransferOptions, WalletConnector};

/// Where a paused attempt picks up once the buyer signs back in.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    Submit,
    Track { transaction_id: String },
}

/// Error as shown inline next to the offer form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineError {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<&PaymentError> for InlineError {
    fn from(err: &PaymentError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Closed,
    AuthRequired,
    ConnectWallet,
    /// Guided installation; shown instead of a `NOT_INSTALLED` error.
    InstallWallet,
    ComposeOffer,
    Submitting,
    Tracking { transaction_id: String },
    Paused { resume: Resume },
    Success { transaction: Transaction },
    Failed { error: InlineError },
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Closed => "closed",
            FlowState::AuthRequired => "auth_required",
            FlowState::ConnectWallet => "connect_wallet",
            FlowState::InstallWallet => "install_wallet",
            FlowState::ComposeOffer => "compose_offer",
            FlowState::Submitting => "submitting",
            FlowState::Tracking { .. } => "tracking",
            FlowState::Paused { .. } => "paused",
            FlowState::Success { .. } => "success",
            FlowState::Failed { .. } => "failed",
        }
    }

    /// States reached before any transaction exists.
    fn is_pre_submit(&self) -> bool {
        matches!(
            self,
            FlowState::ConnectWallet | FlowState::InstallWallet | FlowState::ComposeOffer
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status shown to the buyer while a transaction is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Waiting,
    Processing,
    Success,
    Failed,
}

impl From<TransactionStatus> for DisplayStatus {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Pending => DisplayStatus::Waiting,
            TransactionStatus::Processing => DisplayStatus::Processing,
            TransactionStatus::Confirmed => DisplayStatus::Success,
            TransactionStatus::Failed => DisplayStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfferDraft {
    pub amount: BigDecimal,
    pub method: PaymentMethod,
    pub coin: Option<CryptoPrice>,
    pub display_currency: String,
}

impl Default for OfferDraft {
    fn default() -> Self {
        Self {
            amount: BigDecimal::from(0),
            method: PaymentMethod::Crypto,
            coin: None,
            display_currency: "USD".to_string(),
        }
    }
}

impl OfferDraft {
    fn missing_selection(&self) -> Option<&'static str> {
        if self.amount <= BigDecimal::from(0) {
            return Some("Please enter a valid amount greater than 0");
        }
        if self.method == PaymentMethod::Crypto && self.coin.is_none() {
            return Some("Please select a cryptocurrency");
        }
        None
    }
}

/// Live rendering of the composed offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferPreview {
    pub fees: Option<FeeBreakdown>,
    /// Amount in the selected display currency, when a rate is known.
    pub converted: Option<BigDecimal>,
    pub crypto_amount: Option<BigDecimal>,
    pub can_submit: bool,
}

pub struct OrchestratorDeps {
    pub identity: Arc<dyn IdentityProvider>,
    pub rates: Arc<RateCache>,
    pub wallet: WalletConnector,
    pub ledger: TransactionLedger,
    pub channel: Arc<dyn StatusChannel>,
}

pub struct PaymentOrchestrator {
    identity: Arc<dyn IdentityProvider>,
    rates: Arc<RateCache>,
    wallet: WalletConnector,
    ledger: TransactionLedger,
    channel: Arc<dyn StatusChannel>,
    seller_address: String,
    gas_limit: u64,
    auth_changes: watch::Receiver<Option<User>>,
    auth_open: bool,
    updates_tx: mpsc::UnboundedSender<Transaction>,
    updates_rx: mpsc::UnboundedReceiver<Transaction>,
    state: FlowState,
    property: Option<PropertyRef>,
    draft: OfferDraft,
    wallet_address: Option<String>,
    last_error: Option<InlineError>,
    display: DisplayStatus,
    transaction: Option<Transaction>,
    subscription: Option<Subscription>,
}

impl PaymentOrchestrator {
    pub fn new(deps: OrchestratorDeps, config: &Config) -> Self {
        let auth_changes = deps.identity.on_auth_change();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            identity: deps.identity,
            rates: deps.rates,
            wallet: deps.wallet,
            ledger: deps.ledger,
            channel: deps.channel,
            seller_address: config.seller_address.clone(),
            gas_limit: config.default_gas_limit,
            auth_changes,
            auth_open: true,
            updates_tx,
            updates_rx,
            state: FlowState::Closed,
            property: None,
            draft: OfferDraft::default(),
            wallet_address: None,
            last_error: None,
            display: DisplayStatus::Waiting,
            transaction: None,
            subscription: None,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn display_status(&self) -> DisplayStatus {
        self.display
    }

    pub fn last_error(&self) -> Option<&InlineError> {
        self.last_error.as_ref()
    }

    pub fn wallet_address(&self) -> Option<&str> {
        self.wallet_address.as_deref()
    }

    /// The transaction being tracked, as of the latest update.
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// The composed offer; hidden unless the buyer may compose.
    pub fn offer(&self) -> Option<&OfferDraft> {
        match self.state {
            FlowState::AuthRequired | FlowState::Closed => None,
            _ => Some(&self.draft),
        }
    }

    /// Opens the flow for a listing. The amount starts at the asking price.
    pub fn open(&mut self, property: PropertyRef, asking_price: BigDecimal) -> &FlowState {
        self.reset();
        info!(property_id = %property.id, "offer flow opened");
        self.property = Some(property);
        self.draft.amount = asking_price;
        self.auth_changes.borrow_and_update();

        if self.identity.current_user().is_none() {
            self.enter(FlowState::AuthRequired);
        } else {
            self.route_after_auth();
        }
        &self.state
    }

    /// Connects the wallet for the crypto path.
    pub async fn connect_wallet(&mut self) -> Result<String, PaymentError> {
        self.gate()?;
        if !self.state.is_pre_submit() {
            return Err(self.invalid("connect a wallet"));
        }

        match self.wallet.connect().await {
            Ok(address) => {
                self.wallet_address = Some(address.clone());
                self.last_error = None;
                self.enter(FlowState::ComposeOffer);
                Ok(address)
            }
            Err(e) if e.kind == WalletErrorKind::NotInstalled => {
                self.enter(FlowState::InstallWallet);
                Err(e.into())
            }
            Err(e) => {
                let err = PaymentError::from(e);
                self.last_error = Some(InlineError::from(&err));
                Err(err)
            }
        }
    }

    /// Re-probes for a wallet after the buyer followed the installation guide.
    pub fn refresh_wallet_detection(&mut self, connector: WalletConnector) -> bool {
        if !connector.is_installed() {
            return false;
        }
        self.wallet = connector;
        if self.state == FlowState::InstallWallet {
            self.enter(FlowState::ConnectWallet);
        }
        true
    }

    pub fn set_amount(&mut self, amount: BigDecimal) -> Result<(), PaymentError> {
        self.gate()?;
        self.composing("change the amount")?;
        self.draft.amount = amount;
        Ok(())
    }

    pub fn select_method(&mut self, method: PaymentMethod) -> Result<(), PaymentError> {
        self.gate()?;
        self.composing("change the payment method")?;
        self.draft.method = method;
        self.last_error = None;
        self.route_after_auth();
        Ok(())
    }

    /// Selects a coin by market id; unknown coins are rejected.
    pub async fn select_coin(&mut self, coin_id: &str) -> Result<(), PaymentError> {
        self.gate()?;
        self.composing("select a coin")?;
        let coin = self
            .rates
            .find_coin(coin_id)
            .await
            .ok_or_else(|| PaymentError::Validation(format!("Unsupported cryptocurrency: {}", coin_id)))?;
        self.draft.coin = Some(coin);
        Ok(())
    }

    pub fn set_display_currency(&mut self, code: &str) -> Result<(), PaymentError> {
        self.gate()?;
        self.composing("change the display currency")?;
        self.draft.display_currency = code.trim().to_ascii_uppercase();
        Ok(())
    }

    /// `None` while the offer form is not shown.
    pub async fn preview(&mut self) -> Option<OfferPreview> {
        if self.gate().is_err() || self.state != FlowState::ComposeOffer {
            return None;
        }

        let draft = &self.draft;
        let coin_id = draft.coin.as_ref().map(|c| c.id.as_str());
        let fees = calculate_fees(&draft.amount, draft.method, coin_id);
        let converted = match self
            .rates
            .convert_currency(&draft.amount, &draft.display_currency)
            .await
        {
            Ok(converted) => Some(converted),
            Err(e) => {
                debug!(error = %e, "no conversion preview");
                None
            }
        };
        let crypto = match (&draft.method, &draft.coin) {
            (PaymentMethod::Crypto, Some(coin)) => crypto_amount(&draft.amount, coin),
            _ => None,
        };

        Some(OfferPreview {
            fees,
            converted,
            crypto_amount: crypto,
            can_submit: draft.missing_selection().is_none(),
        })
    }

    /// Executes the composed offer and starts tracking it.
    ///
    /// A session that lapsed since the offer was composed pauses the attempt instead of
    /// discarding it; signing back in resumes it through [`Self::next_event`].
    pub async fn submit(&mut self) -> Result<Transaction, PaymentError> {
        match self.state {
            FlowState::ComposeOffer | FlowState::Paused { resume: Resume::Submit } => {}
            FlowState::AuthRequired => return Err(PaymentError::AuthRequired),
            _ => return Err(self.invalid("submit an offer")),
        }

        if let Some(message) = self.draft.missing_selection() {
            let err = PaymentError::Validation(message.to_string());
            self.last_error = Some(InlineError::from(&err));
            return Err(err);
        }

        let Some(user) = self.identity.current_user() else {
            self.last_error = Some(InlineError::from(&PaymentError::AuthExpired));
            self.enter(FlowState::Paused { resume: Resume::Submit });
            return Err(PaymentError::AuthExpired);
        };

        self.last_error = None;
        self.enter(FlowState::Submitting);

        match self.execute(&user).await {
            Ok(transaction) => Ok(transaction),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn execute(&mut self, user: &User) -> Result<Transaction, PaymentError> {
        let draft = self.draft.clone();
        let coin_id = draft.coin.as_ref().map(|c| c.id.as_str());
        let fees = calculate_fees(&draft.amount, draft.method, coin_id).ok_or_else(|| {
            PaymentError::Validation("Please enter a valid amount greater than 0".to_string())
        })?;

        let mut metadata = Map::new();
        let (hash, crypto, symbol) = match (draft.method, &draft.coin) {
            (PaymentMethod::Crypto, Some(coin)) => {
                let amount = crypto_amount(&draft.amount, coin).ok_or_else(|| {
                    PaymentError::Validation(format!("No usable price for {}", coin.name))
                })?;
                let symbol = coin.symbol.to_ascii_uppercase();
                let receipt = self
                    .wallet
                    .submit_transfer(
                        &amount,
                        &self.seller_address,
                        Some(TransferOptions {
                            currency: Some(symbol.clone()),
                            gas_limit: Some(self.gas_limit),
                            ..TransferOptions::default()
                        }),
                    )
                    .await?;
                metadata.insert("walletAddress".to_string(), json!(receipt.from));
                metadata.insert("valueWei".to_string(), json!(receipt.value_wei.to_string()));
                self.wallet_address = Some(receipt.from);
                (receipt.hash, Some(amount), Some(symbol))
            }
            (PaymentMethod::Crypto, None) => {
                return Err(PaymentError::Validation(
                    "Please select a cryptocurrency".to_string(),
                ))
            }
            (method, _) => (
                format!("{}-{}", method, Uuid::new_v4().simple()),
                None,
                None,
            ),
        };

        let transaction = self
            .ledger
            .create(NewTransaction {
                hash,
                amount: draft.amount.clone(),
                currency: "USD".to_string(),
                payment_method: draft.method,
                recipient: self.seller_address.clone(),
                sender: user.uid.clone(),
                fees: fees.fees(),
                property: self.property.clone(),
                crypto_amount: crypto,
                crypto_symbol: symbol,
                metadata,
            })
            .await?;

        let updates = self.updates_tx.clone();
        let subscription = self.channel.subscribe(
            &transaction.id,
            Arc::new(move |record: Transaction| {
                // The receiver lives as long as the orchestrator.
                let _ = updates.send(record);
            }),
        );
        if let Some(previous) = self.subscription.replace(subscription) {
            previous.unsubscribe();
        }

        self.transaction = Some(transaction.clone());
        self.display = DisplayStatus::Waiting;
        self.enter(FlowState::Tracking {
            transaction_id: transaction.id.clone(),
        });
        Ok(transaction)
    }

    /// Replays the same composed offer after a retryable failure.
    pub async fn retry(&mut self) -> Result<Transaction, PaymentError> {
        match &self.state {
            FlowState::Failed { error } if error.retryable => {}
            _ => return Err(self.invalid("retry")),
        }
        if let Some(previous) = self.subscription.take() {
            previous.unsubscribe();
        }
        self.transaction = None;
        self.display = DisplayStatus::Waiting;
        self.enter(FlowState::ComposeOffer);
        self.submit().await
    }

    /// Waits for the next session transition or status update and applies it.
    ///
    /// Status updates stay queued while the flow is paused.
    pub async fn next_event(&mut self) -> &FlowState {
        let paused = matches!(self.state, FlowState::Paused { .. });
        let auth_open = self.auth_open;
        tokio::select! {
            changed = self.auth_changes.changed(), if auth_open => match changed {
                Ok(()) => {
                    let user = self.auth_changes.borrow_and_update().clone();
                    self.on_auth_change(user).await;
                }
                Err(_) => {
                    warn!("identity provider went away, no further session transitions");
                    self.auth_open = false;
                }
            },
            Some(update) = self.updates_rx.recv(), if !paused => self.on_status(update),
            else => {}
        }
        &self.state
    }

    /// Cancels tracking and resets every selection. A submitted transfer is not recalled.
    pub fn close(&mut self) {
        self.reset();
        info!("offer flow closed");
    }

    fn reset(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        self.updates_tx = updates_tx;
        self.updates_rx = updates_rx;
        self.state = FlowState::Closed;
        self.property = None;
        self.draft = OfferDraft::default();
        self.wallet_address = None;
        self.last_error = None;
        self.display = DisplayStatus::Waiting;
        self.transaction = None;
    }

    async fn on_auth_change(&mut self, user: Option<User>) {
        match (user, self.state.clone()) {
            (None, FlowState::Tracking { transaction_id }) => {
                warn!(transaction_id = %transaction_id, "session expired while tracking, pausing");
                self.last_error = Some(InlineError::from(&PaymentError::AuthExpired));
                self.enter(FlowState::Paused {
                    resume: Resume::Track { transaction_id },
                });
            }
            (None, state) if state.is_pre_submit() => self.enter(FlowState::AuthRequired),
            (Some(_), FlowState::AuthRequired) => self.route_after_auth(),
            (Some(_), FlowState::Paused { resume: Resume::Track { transaction_id } }) => {
                info!(transaction_id = %transaction_id, "session restored, resuming tracking");
                self.last_error = None;
                self.enter(FlowState::Tracking { transaction_id });
            }
            (Some(_), FlowState::Paused { resume: Resume::Submit }) => {
                info!("session restored, resuming submission");
                if let Err(e) = self.submit().await {
                    warn!(code = e.code(), "resumed submission failed: {}", e);
                }
            }
            _ => {}
        }
    }

    fn on_status(&mut self, update: Transaction) {
        let tracking = matches!(
            &self.state,
            FlowState::Tracking { transaction_id } if *transaction_id == update.id
        );
        if !tracking {
            debug!(id = %update.id, "ignoring update for untracked transaction");
            return;
        }

        self.display = update.status.into();
        match update.status {
            TransactionStatus::Confirmed => {
                self.transaction = Some(update.clone());
                self.enter(FlowState::Success { transaction: update });
            }
            TransactionStatus::Failed => {
                let err = PaymentError::SettlementFailed {
                    transaction_id: update.id.clone(),
                };
                self.transaction = Some(update);
                self.last_error = Some(InlineError::from(&err));
                self.enter(FlowState::Failed {
                    error: InlineError::from(&err),
                });
            }
            TransactionStatus::Pending | TransactionStatus::Processing => {
                self.transaction = Some(update);
            }
        }
    }

    /// Clamps the flow to the live session before any buyer action.
    fn gate(&mut self) -> Result<(), PaymentError> {
        if self.identity.current_user().is_some() {
            return Ok(());
        }
        let (next, err) = match &self.state {
            FlowState::Closed => return Err(self.invalid("continue")),
            FlowState::AuthRequired => return Err(PaymentError::AuthRequired),
            FlowState::Paused { .. } => return Err(PaymentError::AuthExpired),
            FlowState::Tracking { transaction_id } => (
                FlowState::Paused {
                    resume: Resume::Track {
                        transaction_id: transaction_id.clone(),
                    },
                },
                PaymentError::AuthExpired,
            ),
            state if state.is_pre_submit() => (FlowState::AuthRequired, PaymentError::AuthRequired),
            _ => return Ok(()),
        };
        self.enter(next);
        Err(err)
    }

    fn composing(&self, action: &'static str) -> Result<(), PaymentError> {
        if self.state.is_pre_submit() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn route_after_auth(&mut self) {
        let next = if self.draft.method == PaymentMethod::Crypto && self.wallet_address.is_none() {
            if self.wallet.is_installed() {
                FlowState::ConnectWallet
            } else {
                FlowState::InstallWallet
            }
        } else {
            FlowState::ComposeOffer
        };
        self.enter(next);
    }

    fn fail(&mut self, err: PaymentError) -> PaymentError {
        if matches!(&err, PaymentError::Wallet(e) if e.kind == WalletErrorKind::NotInstalled) {
            self.enter(FlowState::InstallWallet);
            return err;
        }
        let inline = InlineError::from(&err);
        warn!(code = inline.code, "offer submission failed: {}", err);
        self.last_error = Some(inline.clone());
        self.enter(FlowState::Failed { error: inline });
        err
    }

    fn invalid(&self, action: &'static str) -> PaymentError {
        PaymentError::InvalidState {
            action,
            state: self.state.name(),
        }
    }

    fn enter(&mut self, next: FlowState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "flow state change");
        }
        self.state = next;
    }
}
