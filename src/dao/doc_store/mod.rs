#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use std::collections::BTreeMap;

use futures::{future::BoxFuture, stream::BoxStream};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::dao::{models::Collection, storage::StorageResult};

/// A keyed row of the shared store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: Collection,
    pub key: String,
    pub body: Value,
}

/// One write inside a store transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace the row.
    Put {
        collection: Collection,
        key: String,
        body: Value,
    },
    /// Insert the row only if it does not exist yet. A conflicting create
    /// fails the transaction with [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict)
    /// before any other op is applied.
    Create {
        collection: Collection,
        key: String,
        body: Value,
    },
    /// Remove the row; deleting a missing row is a no-op.
    Delete { collection: Collection, key: String },
}

impl WriteOp {
    /// Build a [`WriteOp::Put`] from a serializable row.
    pub fn put<T: Serialize>(
        collection: Collection,
        key: impl Into<String>,
        row: &T,
    ) -> serde_json::Result<Self> {
        Ok(WriteOp::Put {
            collection,
            key: key.into(),
            body: serde_json::to_value(row)?,
        })
    }

    /// Build a [`WriteOp::Create`] from a serializable row.
    pub fn create<T: Serialize>(
        collection: Collection,
        key: impl Into<String>,
        row: &T,
    ) -> serde_json::Result<Self> {
        Ok(WriteOp::Create {
            collection,
            key: key.into(),
            body: serde_json::to_value(row)?,
        })
    }

    /// Build a [`WriteOp::Delete`].
    pub fn delete(collection: Collection, key: impl Into<String>) -> Self {
        WriteOp::Delete {
            collection,
            key: key.into(),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Put { collection, .. }
            | WriteOp::Create { collection, .. }
            | WriteOp::Delete { collection, .. } => *collection,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Create { key, .. } | WriteOp::Delete { key, .. } => {
                key
            }
        }
    }
}

/// Result of a query: the rows of every requested collection.
///
/// A requested collection with no rows is present and empty, which is how
/// subscribers tell "empty collection" apart from "not part of this query".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryData {
    rows: BTreeMap<Collection, Vec<Document>>,
}

impl QueryData {
    /// Start an empty result covering `collections`.
    pub fn covering(collections: &[Collection]) -> Self {
        Self {
            rows: collections.iter().map(|c| (*c, Vec::new())).collect(),
        }
    }

    /// Append a row, registering its collection if needed.
    pub fn push(&mut self, document: Document) {
        self.rows
            .entry(document.collection)
            .or_default()
            .push(document);
    }

    /// Whether `collection` was part of the query.
    pub fn contains(&self, collection: Collection) -> bool {
        self.rows.contains_key(&collection)
    }

    /// Rows of `collection`, empty when absent.
    pub fn rows(&self, collection: Collection) -> &[Document] {
        self.rows
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `collection` has no rows.
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.rows(collection).is_empty()
    }

    /// Decode the rows of `collection`, skipping rows whose payload does not
    /// match the expected shape.
    pub fn decode<T: DeserializeOwned>(&self, collection: Collection) -> Vec<(String, T)> {
        self.rows(collection)
            .iter()
            .filter_map(|doc| match serde_json::from_value::<T>(doc.body.clone()) {
                Ok(row) => Some((doc.key.clone(), row)),
                Err(err) => {
                    debug!(%collection, key = %doc.key, error = %err, "ignoring malformed row");
                    None
                }
            })
            .collect()
    }
}

/// Live query results; each item is the full result of the query at that point.
pub type QueryStream = BoxStream<'static, StorageResult<QueryData>>;

/// Capability surface of the shared real-time document store.
pub trait DocumentStore: Send + Sync {
    /// Apply a batch of keyed writes.
    fn transact(&self, ops: Vec<WriteOp>) -> BoxFuture<'static, StorageResult<()>>;
    /// One-shot read of the given collections.
    fn query(&self, collections: Vec<Collection>) -> BoxFuture<'static, StorageResult<QueryData>>;
    /// Long-lived subscription: yields the current result first, then a fresh
    /// result whenever one of the collections changes. Errors are yielded
    /// in-band and the stream keeps going.
    fn subscribe(&self, collections: Vec<Collection>) -> QueryStream;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
