//! Durable transaction store with graceful degradation.
//!
//! Every operation goes through [`TransactionLedger::with_fallback`]: the remote document
//! store is asked first, and the in-process tier answers whenever the remote call fails or
//! has nothing to say. A record that only exists in memory stays authoritative for as long
//! as the remote store cannot produce it. Writes may fail while reads keep working, so a
//! remote copy never replaces a memory copy that is further along in severity.

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{NewTransaction, Transaction, TransactionStatus};
use crate::error::{LedgerError, StoreError};
use crate::ports::{DocumentStore, FieldFilter, OrderBy};

pub const COLLECTION: &str = "transactions";

/// In-process tier: the degraded-mode store and the read cache for every successful write.
#[derive(Default)]
struct MemoryTier {
    records: RwLock<HashMap<String, Transaction>>,
}

impl MemoryTier {
    fn put(&self, record: &Transaction) {
        self.records.write().insert(record.id.clone(), record.clone());
    }

    fn get(&self, id: &str) -> Option<Transaction> {
        self.records.read().get(id).cloned()
    }

    /// Caches a copy read from the remote tier unless the memory copy is further along, and
    /// returns whichever of the two is current.
    fn reconcile(&self, remote: Transaction) -> Transaction {
        let mut records = self.records.write();
        match records.get(&remote.id) {
            Some(local) if local.status.severity() > remote.status.severity() => {
                debug!(
                    id = %remote.id,
                    memory = %local.status,
                    remote = %remote.status,
                    "remote copy is stale, keeping memory copy"
                );
                local.clone()
            }
            _ => {
                records.insert(remote.id.clone(), remote.clone());
                remote
            }
        }
    }

    fn find_by_hash(&self, hash: &str) -> Option<Transaction> {
        self.records.read().values().find(|r| r.hash == hash).cloned()
    }

    fn set_status(
        &self,
        id: &str,
        status: TransactionStatus,
        confirmations: Option<u32>,
    ) -> Option<Transaction> {
        let mut records = self.records.write();
        let record = records.get_mut(id)?;
        record.status = status;
        if let Some(confirmations) = confirmations {
            record.confirmations = confirmations;
        }
        Some(record.clone())
    }

    /// Newest first.
    fn filter(&self, predicate: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut matches: Vec<Transaction> = self
            .records
            .read()
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches
    }
}

#[derive(Clone)]
pub struct TransactionLedger {
    remote: Arc<dyn DocumentStore>,
    memory: Arc<MemoryTier>,
}

impl TransactionLedger {
    pub fn new(remote: Arc<dyn DocumentStore>) -> Self {
        Self {
            remote,
            memory: Arc::new(MemoryTier::default()),
        }
    }

    /// Drops the in-process tier.
    pub fn clear(&self) {
        self.memory.records.write().clear();
    }

    /// Number of records held in the in-process tier.
    pub fn cached_len(&self) -> usize {
        self.memory.records.read().len()
    }

    /// Remote first, memory second.
    ///
    /// `remote` resolves to `Ok(None)` when the remote store answered but has nothing usable,
    /// which defers to `fallback` the same way a remote failure does.
    async fn with_fallback<T, Fut, F>(&self, op: &'static str, remote: Fut, fallback: F) -> T
    where
        Fut: Future<Output = Result<Option<T>, StoreError>>,
        F: FnOnce(&MemoryTier) -> T,
    {
        match remote.await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(op, "remote store had no result, serving from memory");
                fallback(&self.memory)
            }
            Err(e) => {
                warn!(op, error = %e, "remote store failed, using in-memory fallback");
                fallback(&self.memory)
            }
        }
    }

    pub async fn create(&self, input: NewTransaction) -> Result<Transaction, LedgerError> {
        let record = Transaction::new(input);
        let doc = serde_json::to_value(&record)?;

        let created = self
            .with_fallback(
                "create",
                async {
                    let id = self.remote.create(COLLECTION, doc).await?;
                    Ok(Some(record.clone().with_id(id)))
                },
                |_| record.clone().with_id(Uuid::new_v4().simple().to_string()),
            )
            .await;

        self.memory.put(&created);
        info!(
            id = %created.id,
            hash = %created.hash,
            method = %created.payment_method,
            "transaction created"
        );
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> Option<Transaction> {
        self.with_fallback(
            "get",
            async {
                let found = match self.remote.get(COLLECTION, id).await? {
                    Some(body) => decode(id, body)?,
                    None => return Ok(None),
                };
                Ok(Some(Some(self.memory.reconcile(found))))
            },
            |memory| memory.get(id),
        )
        .await
    }

    pub async fn get_by_hash(&self, hash: &str) -> Option<Transaction> {
        self.with_fallback(
            "get_by_hash",
            async {
                let docs = self
                    .remote
                    .query(COLLECTION, Some(FieldFilter::eq("hash", hash)), None)
                    .await?;
                let Some(doc) = docs.into_iter().next() else {
                    return Ok(None);
                };
                let found = decode(&doc.id, doc.body)?;
                Ok(Some(Some(self.memory.reconcile(found))))
            },
            |memory| memory.find_by_hash(hash),
        )
        .await
    }

    /// Applies a status transition and returns the post-update record.
    ///
    /// A record that already reached a terminal status in either tier is returned unchanged.
    pub async fn update_status(
        &self,
        id: &str,
        status: TransactionStatus,
        confirmations: Option<u32>,
    ) -> Result<Transaction, LedgerError> {
        let current = self
            .get(id)
            .await
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if current.is_terminal() {
            if current.status != status {
                warn!(
                    id,
                    current = %current.status,
                    requested = %status,
                    "ignoring transition out of terminal status"
                );
            }
            return Ok(current);
        }

        let mut patch = json!({ "status": status });
        if let Some(confirmations) = confirmations {
            patch["confirmations"] = json!(confirmations);
        }

        let updated = self
            .with_fallback(
                "update_status",
                async {
                    self.remote.update(COLLECTION, id, patch).await?;
                    let Some(body) = self.remote.get(COLLECTION, id).await? else {
                        return Ok(None);
                    };
                    let found = decode(id, body)?;
                    Ok(Some(Some(self.memory.reconcile(found))))
                },
                |memory| memory.set_status(id, status, confirmations),
            )
            .await
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        debug!(id, status = %updated.status, confirmations = updated.confirmations, "status updated");
        Ok(updated)
    }

    /// Transactions sent by `owner_id`, newest first.
    pub async fn list_by_owner(&self, owner_id: &str) -> Vec<Transaction> {
        self.list(
            "list_by_owner",
            Some(FieldFilter::eq("sender", owner_id)),
            |r| r.sender == owner_id,
        )
        .await
    }

    /// Transactions against a listing, newest first.
    pub async fn list_by_property(&self, property_id: &str) -> Vec<Transaction> {
        self.list(
            "list_by_property",
            Some(FieldFilter::eq("propertyId", property_id)),
            |r| r.property_id.as_deref() == Some(property_id),
        )
        .await
    }

    pub async fn list_all(&self) -> Vec<Transaction> {
        self.list("list_all", None, |_| true).await
    }

    async fn list(
        &self,
        op: &'static str,
        filter: Option<FieldFilter>,
        predicate: impl Fn(&Transaction) -> bool,
    ) -> Vec<Transaction> {
        self.with_fallback(
            op,
            async {
                let docs = self
                    .remote
                    .query(COLLECTION, filter, Some(OrderBy::desc("timestamp")))
                    .await?;
                if docs.is_empty() {
                    return Ok(None);
                }
                let records = docs
                    .into_iter()
                    .map(|doc| decode(&doc.id, doc.body).map(|r| self.memory.reconcile(r)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(records))
            },
            |memory| memory.filter(predicate),
        )
        .await
    }
}

fn decode(id: &str, body: Value) -> Result<Transaction, StoreError> {
    serde_json::from_value::<Transaction>(body)
        .map(|record| record.with_id(id))
        .map_err(|e| StoreError::InvalidDocument(format!("{}/{}: {}", COLLECTION, id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryDocumentStore;
    use crate::domain::{Fees, PaymentMethod};
    use bigdecimal::BigDecimal;

    fn input(hash: &str, sender: &str) -> NewTransaction {
        NewTransaction {
            hash: hash.to_string(),
            amount: BigDecimal::from(1000),
            currency: "USD".to_string(),
            payment_method: PaymentMethod::Card,
            recipient: "seller".to_string(),
            sender: sender.to_string(),
            fees: Fees::zero(),
            property: None,
            crypto_amount: None,
            crypto_symbol: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_mirrors_remote_write() {
        let store = Arc::new(MemoryDocumentStore::new());
        let ledger = TransactionLedger::new(store.clone());

        let tx = ledger.create(input("0x1", "buyer")).await.unwrap();

        assert_eq!(store.len(COLLECTION), 1);
        assert_eq!(ledger.cached_len(), 1);
        assert!(store.get(COLLECTION, &tx.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_falls_back_when_remote_write_fails() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_writes(true);
        let ledger = TransactionLedger::new(store.clone());

        let tx = ledger.create(input("0x1", "buyer")).await.unwrap();

        assert!(!tx.id.is_empty());
        assert!(store.is_empty(COLLECTION));
        assert_eq!(ledger.get(&tx.id).await.map(|t| t.hash), Some("0x1".to_string()));
    }

    #[tokio::test]
    async fn test_undecodable_remote_document_falls_back() {
        let store = Arc::new(MemoryDocumentStore::new());
        let ledger = TransactionLedger::new(store.clone());
        let tx = ledger.create(input("0x1", "buyer")).await.unwrap();

        store
            .update(COLLECTION, &tx.id, json!({ "status": "settled-ish" }))
            .await
            .unwrap();

        let fetched = ledger.get(&tx.id).await.unwrap();
        assert_eq!(fetched.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_status_on_missing_record() {
        let ledger = TransactionLedger::new(Arc::new(MemoryDocumentStore::new()));
        let result = ledger
            .update_status("missing", TransactionStatus::Processing, None)
            .await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_reconcile_keeps_memory_copy_that_is_further_along() {
        let memory = MemoryTier::default();
        let remote = Transaction::new(input("0x1", "buyer")).with_id("tx-1");
        let mut local = remote.clone();
        local.status = TransactionStatus::Processing;
        memory.put(&local);

        assert_eq!(memory.reconcile(remote.clone()).status, TransactionStatus::Processing);

        let mut settled = remote;
        settled.status = TransactionStatus::Confirmed;
        settled.confirmations = 4;
        assert_eq!(memory.reconcile(settled).status, TransactionStatus::Confirmed);
        assert_eq!(memory.get("tx-1").map(|r| r.confirmations), Some(4));
    }

    #[tokio::test]
    async fn test_clear_drops_memory_tier() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_writes(true);
        let ledger = TransactionLedger::new(store);
        let tx = ledger.create(input("0x1", "buyer")).await.unwrap();

        ledger.clear();
        assert!(ledger.get(&tx.id).await.is_none());
    }
}
