use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dao::{doc_store::Document, models::Collection};

/// Separator between the collection name and the row key inside a document id.
pub const KEY_SEPARATOR: &str = "::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<RevValue>,
    #[serde(default)]
    pub doc: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevValue {
    pub rev: String,
    #[serde(default)]
    pub deleted: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct KeysRequest<'a> {
    pub keys: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest {
    pub docs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDocsResult {
    pub id: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
}

/// Document id of a row: `{collection}::{key}`.
pub fn doc_id(collection: Collection, key: &str) -> String {
    format!("{}{}{}", collection.name(), KEY_SEPARATOR, key)
}

/// Id prefix shared by every row of `collection`.
pub fn collection_prefix(collection: Collection) -> String {
    format!("{}{}", collection.name(), KEY_SEPARATOR)
}

/// Split a document id back into its collection and row key.
pub fn split_doc_id(doc_id: &str) -> Option<(Collection, &str)> {
    let (name, key) = doc_id.split_once(KEY_SEPARATOR)?;
    Some((Collection::from_name(name)?, key))
}

/// Sequence tokens are strings on CouchDB 2+ and integers on 1.x.
pub fn seq_token(value: &Value) -> String {
    match value {
        Value::String(token) => token.clone(),
        other => other.to_string(),
    }
}

/// Attach CouchDB bookkeeping fields to a row body.
pub fn into_couch_body(collection: Collection, key: &str, body: Value, rev: Option<&str>) -> Value {
    let mut object = match body {
        Value::Object(object) => object,
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("value".into(), other);
            wrapped
        }
    };
    object.insert("_id".into(), Value::String(doc_id(collection, key)));
    if let Some(rev) = rev {
        object.insert("_rev".into(), Value::String(rev.to_owned()));
    }
    Value::Object(object)
}

/// Tombstone body deleting the revision `rev`.
pub fn deletion_body(collection: Collection, key: &str, rev: &str) -> Value {
    let mut object = Map::new();
    object.insert("_id".into(), Value::String(doc_id(collection, key)));
    object.insert("_rev".into(), Value::String(rev.to_owned()));
    object.insert("_deleted".into(), Value::Bool(true));
    Value::Object(object)
}

/// Strip CouchDB bookkeeping from a fetched document and turn it into a row.
pub fn into_document(doc: Value) -> Option<Document> {
    let Value::Object(mut object) = doc else {
        return None;
    };
    let id = match object.remove("_id") {
        Some(Value::String(id)) => id,
        _ => return None,
    };
    object.remove("_rev");
    let (collection, key) = split_doc_id(&id)?;
    Some(Document {
        collection,
        key: key.to_owned(),
        body: Value::Object(object),
    })
}
