//! Near-real-time status propagation for submitted transactions.
//!
//! [`StatusChannel`] is the seam the orchestrator depends on. [`PollingStatusChannel`] is the
//! interval-driven implementation: one tokio task per transaction id polls the status oracle and
//! writes results through the ledger.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{Transaction, TransactionStatus};
use crate::error::LedgerError;
use crate::ports::StatusOracle;
use crate::services::ledger::TransactionLedger;

pub type StatusCallback = Arc<dyn Fn(Transaction) + Send + Sync>;

pub trait StatusChannel: Send + Sync {
    /// Registers `on_update` for `transaction_id`, replacing any earlier registration.
    fn subscribe(&self, transaction_id: &str, on_update: StatusCallback) -> Subscription;

    /// Idempotent. No callback for `transaction_id` fires after this returns.
    fn unsubscribe(&self, transaction_id: &str);
}

/// Handle returned by [`StatusChannel::subscribe`].
///
/// Dropping the handle leaves the subscription running; call [`Subscription::unsubscribe`]
/// to stop it. A handle whose subscription was since replaced is a no-op.
pub struct Subscription {
    transaction_id: String,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(transaction_id: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

struct Registration {
    token: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<HashMap<String, Registration>>,
    next_token: AtomicU64,
}

impl Registry {
    fn is_current(&self, transaction_id: &str, token: u64) -> bool {
        self.entries
            .lock()
            .get(transaction_id)
            .is_some_and(|r| r.token == token)
    }

    /// Removes the registration only if it still belongs to `token`.
    fn release(&self, transaction_id: &str, token: u64) -> Option<Registration> {
        let mut entries = self.entries.lock();
        if entries.get(transaction_id).is_some_and(|r| r.token == token) {
            entries.remove(transaction_id)
        } else {
            None
        }
    }
}

pub struct PollingStatusChannel {
    ledger: TransactionLedger,
    oracle: Arc<dyn StatusOracle>,
    period: Duration,
    registry: Arc<Registry>,
}

impl PollingStatusChannel {
    pub fn new(ledger: TransactionLedger, oracle: Arc<dyn StatusOracle>, period: Duration) -> Self {
        Self {
            ledger,
            oracle,
            period,
            registry: Arc::new(Registry::default()),
        }
    }

    pub fn from_config(
        config: &Config,
        ledger: TransactionLedger,
        oracle: Arc<dyn StatusOracle>,
    ) -> Self {
        Self::new(ledger, oracle, config.status_poll_interval())
    }

    pub fn is_subscribed(&self, transaction_id: &str) -> bool {
        self.registry.entries.lock().contains_key(transaction_id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.entries.lock().len()
    }
}

impl StatusChannel for PollingStatusChannel {
    fn subscribe(&self, transaction_id: &str, on_update: StatusCallback) -> Subscription {
        let token = self.registry.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        let poller = Poller {
            transaction_id: transaction_id.to_string(),
            token,
            ledger: self.ledger.clone(),
            oracle: self.oracle.clone(),
            registry: self.registry.clone(),
            on_update,
            delivered: None,
        };

        // Holding the lock across spawn keeps the new task from observing a missing entry.
        let mut entries = self.registry.entries.lock();
        let task = tokio::spawn(poller.run(self.period));
        if let Some(previous) = entries.insert(transaction_id.to_string(), Registration { token, task }) {
            debug!(transaction_id, "replacing existing status subscription");
            previous.task.abort();
        }
        drop(entries);

        info!(transaction_id, period = ?self.period, "status subscription opened");

        let registry = self.registry.clone();
        let id = transaction_id.to_string();
        Subscription::new(transaction_id, move || {
            if let Some(registration) = registry.release(&id, token) {
                registration.task.abort();
                info!(transaction_id = %id, "status subscription closed");
            }
        })
    }

    fn unsubscribe(&self, transaction_id: &str) {
        if let Some(registration) = self.registry.entries.lock().remove(transaction_id) {
            registration.task.abort();
            info!(transaction_id, "status subscription closed");
        }
    }
}

enum Tick {
    Continue,
    Stop,
}

struct Poller {
    transaction_id: String,
    token: u64,
    ledger: TransactionLedger,
    oracle: Arc<dyn StatusOracle>,
    registry: Arc<Registry>,
    on_update: StatusCallback,
    /// Highest status handed to `on_update` so far.
    delivered: Option<TransactionStatus>,
}

impl Poller {
    async fn run(mut self, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Tick::Stop = self.tick().await {
                break;
            }
        }

        self.registry.release(&self.transaction_id, self.token);
    }

    async fn tick(&mut self) -> Tick {
        let Some(current) = self.ledger.get(&self.transaction_id).await else {
            debug!(transaction_id = %self.transaction_id, "transaction gone, stopping status poll");
            return Tick::Stop;
        };

        if current.is_terminal() {
            self.deliver(current);
            return Tick::Stop;
        }

        let snapshot = match self.oracle.check_status(&current.hash).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(transaction_id = %self.transaction_id, error = %e, "status oracle query failed, retrying next tick");
                return Tick::Continue;
            }
        };

        // Severity never goes backwards, neither against the stored record nor against what
        // the subscriber has already seen.
        let floor = match self.delivered {
            Some(seen) if seen.severity() > current.status.severity() => seen,
            _ => current.status,
        };
        let (status, confirmations) = if snapshot.status.severity() < floor.severity() {
            debug!(
                transaction_id = %self.transaction_id,
                current = %floor,
                reported = %snapshot.status,
                "clamping regressed status"
            );
            (floor, None)
        } else {
            (snapshot.status, Some(snapshot.confirmations))
        };

        let updated = match self
            .ledger
            .update_status(&self.transaction_id, status, confirmations)
            .await
        {
            Ok(updated) => updated,
            Err(LedgerError::NotFound(_)) => return Tick::Stop,
            Err(e) => {
                warn!(transaction_id = %self.transaction_id, error = %e, "status write failed");
                return Tick::Continue;
            }
        };

        let terminal = updated.is_terminal();
        if terminal {
            info!(transaction_id = %self.transaction_id, status = %updated.status, "transaction reached terminal status");
        }
        if !self.deliver(updated) || terminal {
            return Tick::Stop;
        }
        Tick::Continue
    }

    /// Returns false once this poller no longer owns the subscription.
    fn deliver(&mut self, record: Transaction) -> bool {
        if !self.registry.is_current(&self.transaction_id, self.token) {
            return false;
        }
        self.delivered = Some(record.status);
        (self.on_update)(record);
        true
    }
}
