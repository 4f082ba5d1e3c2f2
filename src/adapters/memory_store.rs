//! In-process `DocumentStore` with switchable outages.
//!
//! Stands in for the remote document database in the CLI simulation and in tests that
//! exercise the ledger's degraded mode.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ports::{DocumentStore, FieldFilter, OrderBy, StoredDocument};

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `get`/`query` fail with `StoreError::Unavailable`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, AtomicOrdering::SeqCst);
    }

    /// Makes every `create`/`update` fail with `StoreError::Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, collection: &str, doc: Value) -> Result<String, StoreError> {
        self.check_writes()?;
        if !doc.is_object() {
            return Err(StoreError::InvalidDocument("document must be an object".to_string()));
        }

        let id = Uuid::new_v4().simple().to_string();
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), doc);
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.check_reads()?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        self.check_writes()?;
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidDocument("patch must be an object".to_string()));
        };

        let mut collections = self.collections.write();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        if let Value::Object(fields) = doc {
            for (key, value) in patch {
                fields.insert(key, value);
            }
        }
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
        order: Option<OrderBy>,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.check_reads()?;
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<StoredDocument> = docs
            .iter()
            .filter(|(_, body)| match &filter {
                Some(f) => body.get(&f.field) == Some(&f.value),
                None => true,
            })
            .map(|(id, body)| StoredDocument {
                id: id.clone(),
                body: body.clone(),
            })
            .collect();

        if let Some(order) = order {
            results.sort_by(|a, b| {
                let ordering = compare_values(a.body.get(&order.field), b.body.get(&order.field));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        Ok(results)
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryDocumentStore::new();
        let id = store.create("transactions", json!({"hash": "0x1"})).await.unwrap();

        let doc = store.get("transactions", &id).await.unwrap().unwrap();
        assert_eq!(doc["hash"], "0x1");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create("transactions", json!({"hash": "0x1", "status": "pending"}))
            .await
            .unwrap();

        store
            .update("transactions", &id, json!({"status": "processing"}))
            .await
            .unwrap();

        let doc = store.get("transactions", &id).await.unwrap().unwrap();
        assert_eq!(doc["status"], "processing");
        assert_eq!(doc["hash"], "0x1");
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let store = MemoryDocumentStore::new();
        let result = store.update("transactions", "nope", json!({"status": "failed"})).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = MemoryDocumentStore::new();
        store.create("t", json!({"sender": "a", "timestamp": 1})).await.unwrap();
        store.create("t", json!({"sender": "b", "timestamp": 2})).await.unwrap();
        store.create("t", json!({"sender": "a", "timestamp": 3})).await.unwrap();

        let docs = store
            .query("t", Some(FieldFilter::eq("sender", "a")), Some(OrderBy::desc("timestamp")))
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].body["timestamp"], 3);
        assert_eq!(docs[1].body["timestamp"], 1);
    }

    #[tokio::test]
    async fn test_outage_switches() {
        let store = MemoryDocumentStore::new();
        store.fail_writes(true);
        assert!(store.create("t", json!({})).await.is_err());

        store.fail_writes(false);
        store.fail_reads(true);
        let id = store.create("t", json!({})).await.unwrap();
        assert!(store.get("t", &id).await.is_err());
    }
}
