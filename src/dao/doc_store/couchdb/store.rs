use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::dao::{
    doc_store::{DocumentStore, QueryData, QueryStream, WriteOp},
    models::Collection,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, BulkDocsResult, ChangesResponse, END_SUFFIX,
        KeysRequest, collection_prefix, deletion_body, doc_id, into_couch_body, into_document,
        seq_token, split_doc_id,
    },
};

const ALL_DOCS: &str = "_all_docs";
const BULK_DOCS: &str = "_bulk_docs";
const CHANGES: &str = "_changes";
/// Server-side longpoll timeout, in milliseconds.
const LONGPOLL_TIMEOUT_MS: u64 = 30_000;
/// Pause before re-opening the changes feed after a failure.
const FEED_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchDocumentStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // Another device may have created it in the meantime.
                let status = create.status();
                if status.is_success() || status == StatusCode::PRECONDITION_FAILED {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus { database, status })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> CouchResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method, path).query(query);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    /// PUT a document that must not exist yet.
    async fn create_document(&self, op: &WriteOp) -> CouchResult<()> {
        let WriteOp::Create {
            collection,
            key,
            body,
        } = op
        else {
            return Ok(());
        };
        let id = doc_id(*collection, key);
        let response = self
            .request(Method::PUT, &id)
            .json(&into_couch_body(*collection, key, body.clone(), None))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::DocumentExists {
                collection: *collection,
                key: key.clone(),
            }),
            status if status.is_success() => Ok(()),
            status => Err(CouchDaoError::RequestStatus { path: id, status }),
        }
    }

    /// Current revision of every listed document that exists.
    async fn current_revisions(&self, ids: &[String]) -> CouchResult<BTreeMap<String, String>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let payload: AllDocsResponse = self
            .send_json(Method::POST, ALL_DOCS, &[], Some(&KeysRequest { keys: ids }))
            .await?;
        Ok(payload
            .rows
            .into_iter()
            .filter(|row| row.error.is_none())
            .filter_map(|row| {
                let value = row.value?;
                if value.deleted.unwrap_or(false) {
                    return None;
                }
                Some((row.id.or(row.key)?, value.rev))
            })
            .collect())
    }

    async fn write(&self, ops: Vec<WriteOp>) -> CouchResult<()> {
        // Creates go first and alone so a conflict aborts before anything
        // else lands.
        for op in ops.iter().filter(|op| matches!(op, WriteOp::Create { .. })) {
            self.create_document(op).await?;
        }

        let rest: Vec<WriteOp> = ops
            .into_iter()
            .filter(|op| !matches!(op, WriteOp::Create { .. }))
            .collect();
        if rest.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = rest
            .iter()
            .map(|op| doc_id(op.collection(), op.key()))
            .collect();
        let revisions = self.current_revisions(&ids).await?;

        let mut docs = Vec::with_capacity(rest.len());
        for (op, id) in rest.into_iter().zip(ids.iter()) {
            let rev = revisions.get(id).map(String::as_str);
            match op {
                WriteOp::Put {
                    collection,
                    key,
                    body,
                } => docs.push(into_couch_body(collection, &key, body, rev)),
                WriteOp::Delete { collection, key } => {
                    if let Some(rev) = rev {
                        docs.push(deletion_body(collection, &key, rev));
                    }
                }
                WriteOp::Create { .. } => {}
            }
        }
        if docs.is_empty() {
            return Ok(());
        }

        let results: Vec<BulkDocsResult> = self
            .send_json(Method::POST, BULK_DOCS, &[], Some(&BulkDocsRequest { docs }))
            .await?;
        for result in results {
            if let Some(error) = result.error {
                warn!(
                    doc_id = %result.id,
                    error = %error,
                    reason = result.reason.as_deref().unwrap_or(""),
                    "CouchDB rejected document write"
                );
            }
        }
        Ok(())
    }

    async fn read(&self, collections: &[Collection]) -> CouchResult<QueryData> {
        let mut data = QueryData::covering(collections);
        for collection in collections {
            let prefix = collection_prefix(*collection);
            let query = [
                ("include_docs", "true".to_string()),
                ("startkey", format!("\"{}\"", prefix)),
                ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
            ];
            let payload: AllDocsResponse = self
                .send_json::<(), _>(Method::GET, ALL_DOCS, &query, None)
                .await?;
            for row in payload.rows {
                if let Some(document) = row.doc.and_then(into_document) {
                    data.push(document);
                }
            }
        }
        Ok(data)
    }

    async fn changes_since(&self, since: &str, longpoll: bool) -> CouchResult<ChangesResponse> {
        let mut query = vec![("since", since.to_string())];
        if longpoll {
            query.push(("feed", "longpoll".to_string()));
            query.push(("timeout", LONGPOLL_TIMEOUT_MS.to_string()));
        }
        self.send_json::<(), _>(Method::GET, CHANGES, &query, None)
            .await
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: url,
                status: response.status(),
            })
        }
    }
}

impl DocumentStore for CouchDocumentStore {
    fn transact(&self, ops: Vec<WriteOp>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write(ops).await.map_err(Into::into) })
    }

    fn query(&self, collections: Vec<Collection>) -> BoxFuture<'static, StorageResult<QueryData>> {
        let store = self.clone();
        Box::pin(async move { store.read(&collections).await.map_err(Into::into) })
    }

    fn subscribe(&self, collections: Vec<Collection>) -> QueryStream {
        let store = self.clone();
        Box::pin(async_stream::stream! {
            let mut since: Option<String> = None;
            loop {
                match since.clone() {
                    None => {
                        // Pin the sequence before the first read so nothing
                        // written in between is missed.
                        match store.changes_since("now", false).await {
                            Ok(changes) => {
                                since = Some(seq_token(&changes.last_seq));
                                yield store.read(&collections).await.map_err(Into::into);
                            }
                            Err(err) => {
                                yield Err(err.into());
                                tokio::time::sleep(FEED_RETRY_DELAY).await;
                            }
                        }
                    }
                    Some(current) => match store.changes_since(&current, true).await {
                        Ok(changes) => {
                            since = Some(seq_token(&changes.last_seq));
                            let relevant = changes.results.iter().any(|row| {
                                split_doc_id(&row.id).is_some_and(|(collection, _)| {
                                    collections.contains(&collection)
                                })
                            });
                            if relevant {
                                yield store.read(&collections).await.map_err(Into::into);
                            } else {
                                debug!(seq = %current, "CouchDB changes feed idle");
                            }
                        }
                        Err(err) => {
                            yield Err(err.into());
                            tokio::time::sleep(FEED_RETRY_DELAY).await;
                        }
                    },
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
