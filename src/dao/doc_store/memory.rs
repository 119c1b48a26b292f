//! In-process document store with live subscriptions.
//!
//! Every clone shares the same rows, so several device coordinators built on
//! clones of one store observe each other's writes exactly as they would
//! through a remote store. Faults can be injected to exercise the degraded
//! paths of the sync adapter.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, broadcast::error::RecvError};

use super::{Document, DocumentStore, QueryData, QueryStream, WriteOp};
use crate::dao::{
    models::Collection,
    storage::{StorageError, StorageResult},
};

const CHANGE_CAPACITY: usize = 64;

/// Failure reported by an injected fault.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MemoryStoreFault(String);

#[derive(Debug, Clone)]
enum Change {
    Rows(BTreeSet<Collection>),
    Fault(String),
}

struct Inner {
    rows: Mutex<BTreeMap<(Collection, String), Value>>,
    changes: broadcast::Sender<Change>,
    available: AtomicBool,
}

/// Shared in-memory implementation of [`DocumentStore`].
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                rows: Mutex::new(BTreeMap::new()),
                changes,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Toggle availability; while unavailable every read and write fails.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Deliver an error to every live subscription.
    pub fn inject_subscription_error(&self, message: impl Into<String>) {
        let _ = self.inner.changes.send(Change::Fault(message.into()));
    }

    /// Read a single row, mostly useful for assertions.
    pub async fn get(&self, collection: Collection, key: &str) -> Option<Value> {
        let rows = self.inner.rows.lock().await;
        rows.get(&(collection, key.to_owned())).cloned()
    }

    fn ensure_available(&self, operation: &str) -> StorageResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                format!("memory store offline during {operation}"),
                MemoryStoreFault("store marked unavailable".into()),
            ))
        }
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        self.ensure_available("transact")?;
        let mut rows = self.inner.rows.lock().await;

        // Create-only ops are checked up front so a conflict leaves the
        // transaction entirely unapplied.
        for op in &ops {
            if let WriteOp::Create {
                collection, key, ..
            } = op
            {
                if rows.contains_key(&(*collection, key.clone())) {
                    return Err(StorageError::Conflict {
                        collection: *collection,
                        key: key.clone(),
                    });
                }
            }
        }

        let mut touched = BTreeSet::new();
        for op in ops {
            touched.insert(op.collection());
            match op {
                WriteOp::Put {
                    collection,
                    key,
                    body,
                }
                | WriteOp::Create {
                    collection,
                    key,
                    body,
                } => {
                    rows.insert((collection, key), body);
                }
                WriteOp::Delete { collection, key } => {
                    rows.remove(&(collection, key));
                }
            }
        }
        drop(rows);

        if !touched.is_empty() {
            let _ = self.inner.changes.send(Change::Rows(touched));
        }
        Ok(())
    }

    async fn snapshot(&self, collections: &[Collection]) -> StorageResult<QueryData> {
        self.ensure_available("query")?;
        let rows = self.inner.rows.lock().await;
        let mut data = QueryData::covering(collections);
        for ((collection, key), body) in rows.iter() {
            if collections.contains(collection) {
                data.push(Document {
                    collection: *collection,
                    key: key.clone(),
                    body: body.clone(),
                });
            }
        }
        Ok(data)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn transact(&self, ops: Vec<WriteOp>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.apply(ops).await })
    }

    fn query(&self, collections: Vec<Collection>) -> BoxFuture<'static, StorageResult<QueryData>> {
        let store = self.clone();
        Box::pin(async move { store.snapshot(&collections).await })
    }

    fn subscribe(&self, collections: Vec<Collection>) -> QueryStream {
        let store = self.clone();
        // Subscribe before the first snapshot so no change slips in between.
        let mut changes = self.inner.changes.subscribe();
        Box::pin(async_stream::stream! {
            yield store.snapshot(&collections).await;
            loop {
                match changes.recv().await {
                    Ok(Change::Rows(touched)) => {
                        if collections.iter().any(|c| touched.contains(c)) {
                            yield store.snapshot(&collections).await;
                        }
                    }
                    Ok(Change::Fault(message)) => {
                        yield Err(StorageError::unavailable(
                            "memory store subscription fault".into(),
                            MemoryStoreFault(message),
                        ));
                    }
                    Err(RecvError::Lagged(_)) => {
                        yield store.snapshot(&collections).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_available("health check") })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn create_conflict_rejects_whole_transaction() {
        let store = MemoryDocumentStore::new();
        store
            .transact(vec![WriteOp::Create {
                collection: Collection::InitialStationAssignment,
                key: "1".into(),
                body: json!({ "station_order": ["A", "B", "C", "D"] }),
            }])
            .await
            .unwrap();

        let err = store
            .transact(vec![
                WriteOp::Create {
                    collection: Collection::InitialStationAssignment,
                    key: "1".into(),
                    body: json!({ "station_order": ["E", "D", "C", "B"] }),
                },
                WriteOp::Put {
                    collection: Collection::StationOccupancy,
                    key: "E".into(),
                    body: json!({ "station_id": "E", "state": "occupied" }),
                },
            ])
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(store.get(Collection::StationOccupancy, "E").await.is_none());
        assert_eq!(
            store
                .get(Collection::InitialStationAssignment, "1")
                .await
                .unwrap()["station_order"][0],
            "A"
        );
    }

    #[tokio::test]
    async fn subscription_delivers_initial_and_relevant_changes() {
        let store = MemoryDocumentStore::new();
        let mut stream = store.subscribe(vec![Collection::StationOccupancy]);

        let first = stream.next().await.unwrap().unwrap();
        assert!(first.is_empty(Collection::StationOccupancy));

        // Writes to unrelated collections do not wake the subscriber.
        store
            .transact(vec![WriteOp::delete(Collection::TeamStatuses, "red")])
            .await
            .unwrap();
        store
            .transact(vec![WriteOp::Put {
                collection: Collection::StationOccupancy,
                key: "A".into(),
                body: json!({ "station_id": "A", "state": "open" }),
            }])
            .await
            .unwrap();

        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(next.rows(Collection::StationOccupancy).len(), 1);
    }

    #[tokio::test]
    async fn injected_fault_is_delivered_in_band() {
        let store = MemoryDocumentStore::new();
        let mut stream = store.subscribe(vec![Collection::TeamStatuses]);
        stream.next().await.unwrap().unwrap();

        store.inject_subscription_error("network blip");
        assert!(stream.next().await.unwrap().is_err());

        store
            .transact(vec![WriteOp::Put {
                collection: Collection::TeamStatuses,
                key: "red".into(),
                body: json!({ "team_id": "red", "step_index": 1 }),
            }])
            .await
            .unwrap();
        assert!(stream.next().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn unavailable_store_fails_reads_and_writes() {
        let store = MemoryDocumentStore::new();
        store.set_available(false);
        assert!(store.health_check().await.is_err());
        assert!(store.query(vec![Collection::TeamStatuses]).await.is_err());
        assert!(
            store
                .transact(vec![WriteOp::delete(Collection::TeamStatuses, "red")])
                .await
                .is_err()
        );
    }
}
