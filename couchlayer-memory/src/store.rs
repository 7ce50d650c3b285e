//! In-memory store client.
//!
//! Documents live in an ordered map keyed by id, behind an async-aware read-write lock. Every
//! write produces a new revision (`<generation>-<random>`) and writes are checked against the
//! stored revision exactly like the remote store does, so optimistic-concurrency behavior can be
//! exercised without a server.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::{Map, Value};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};
use tracing::trace;
use uuid::Uuid;

use couchlayer_core::{
    client::{StoreClient, StoreClientBuilder, StoreResult},
    error::{DbResult, StoreError},
    query::{FetchOptions, Query, SortDirection},
    response::{BulkResult, DbInfo, DbResponse, FindResponse, Row, RowsResponse},
};

use crate::{
    error::MemoryStoreError,
    evaluator::{DocumentEvaluator, collate, lookup},
};

/// A view function: receives a document and returns the `(key, value)` pairs it emits.
pub type ViewFn = Arc<dyn Fn(&Value) -> Vec<(Value, Value)> + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredDocument {
    generation: u64,
    rev: String,
    body: Map<String, Value>,
    deleted: bool,
}

impl StoredDocument {
    fn materialize(&self, id: &str) -> Value {
        let mut doc = Map::with_capacity(self.body.len() + 2);
        doc.insert("_id".into(), Value::from(id));
        doc.insert("_rev".into(), Value::from(self.rev.as_str()));
        doc.extend(
            self.body
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Value::Object(doc)
    }
}

fn next_revision(generation: u64) -> String {
    format!("{generation}-{}", Uuid::new_v4().simple())
}

#[derive(Debug, Default)]
struct Database {
    docs: BTreeMap<String, StoredDocument>,
    update_seq: u64,
}

impl Database {
    fn live(&self) -> impl Iterator<Item = (&String, &StoredDocument)> {
        self.docs
            .iter()
            .filter(|(_, doc)| !doc.deleted)
    }

    fn get(&self, id: &str) -> Result<Value, MemoryStoreError> {
        match self.docs.get(id) {
            Some(doc) if doc.deleted => Err(MemoryStoreError::Deleted(id.to_string())),
            Some(doc) => Ok(doc.materialize(id)),
            None => Err(MemoryStoreError::Missing(id.to_string())),
        }
    }

    /// Writes `doc`, assigning an id when it has none and `assign_id` is set.
    fn write(&mut self, doc: Value, assign_id: bool) -> Result<DbResponse, MemoryStoreError> {
        let Value::Object(mut body) = doc else {
            return Err(MemoryStoreError::BadRequest("Document must be a JSON object".into()));
        };

        let id = match body.remove("_id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            None if assign_id => Uuid::new_v4().simple().to_string(),
            _ => return Err(MemoryStoreError::BadRequest("Document id must be a non-empty string".into())),
        };
        let rev = match body.remove("_rev") {
            Some(Value::String(rev)) if !rev.is_empty() => Some(rev),
            None => None,
            _ => return Err(MemoryStoreError::BadRequest("Invalid revision".into())),
        };
        let deleted = body
            .remove("_deleted")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let generation = match (self.docs.get(&id), rev.as_deref()) {
            (Some(current), Some(rev)) if current.rev == rev => current.generation,
            (Some(current), None) if current.deleted => current.generation,
            (None, None) => 0,
            _ => return Err(MemoryStoreError::Conflict),
        };
        if deleted && self.docs.get(&id).is_none_or(|d| d.deleted) {
            return Err(MemoryStoreError::Missing(id));
        }

        let generation = generation + 1;
        let rev = next_revision(generation);
        self.docs.insert(
            id.clone(),
            StoredDocument {
                generation,
                rev: rev.clone(),
                body: if deleted { Map::new() } else { body },
                deleted,
            },
        );
        self.update_seq += 1;

        Ok(DbResponse { ok: true, id, rev })
    }

    fn remove(&mut self, id: &str, rev: &str) -> Result<DbResponse, MemoryStoreError> {
        let mut tombstone = Map::new();
        tombstone.insert("_id".into(), Value::from(id));
        tombstone.insert("_rev".into(), Value::from(rev));
        tombstone.insert("_deleted".into(), Value::Bool(true));

        match self.docs.get(id).map(|doc| doc.deleted) {
            Some(false) => self.write(Value::Object(tombstone), false),
            Some(true) => Err(MemoryStoreError::Deleted(id.to_string())),
            None => Err(MemoryStoreError::Missing(id.to_string())),
        }
    }

    fn info(&self, name: &str) -> DbInfo {
        let deleted = self
            .docs
            .values()
            .filter(|doc| doc.deleted)
            .count() as u64;

        DbInfo {
            db_name: name.to_string(),
            doc_count: self.docs.len() as u64 - deleted,
            doc_del_count: deleted,
            update_seq: Value::from(self.update_seq),
        }
    }
}

/// Applies key selection, range, direction, skip and limit to rows already sorted by key.
fn select_rows(mut rows: Vec<Row>, options: Option<&FetchOptions>) -> (Vec<Row>, u64) {
    let Some(options) = options else {
        return (rows, 0);
    };

    if let Some(keys) = &options.keys {
        let selected = keys
            .iter()
            .flat_map(|key| {
                let matching: Vec<Row> = rows
                    .iter()
                    .filter(|row| collate(&row.key, key) == Ordering::Equal)
                    .cloned()
                    .collect();
                if matching.is_empty() {
                    vec![Row { key: key.clone(), error: Some("not_found".into()), ..Row::default() }]
                } else {
                    matching
                }
            })
            .collect::<Vec<_>>();
        return page(selected, options);
    }

    if options.descending {
        rows.reverse();
    }
    let ascending = !options.descending;

    rows.retain(|row| {
        let key = &row.key;
        if let Some(wanted) = &options.key {
            return collate(key, wanted) == Ordering::Equal;
        }
        let after_start = options.startkey.as_ref().is_none_or(|start| {
            let order = collate(key, start);
            if ascending { order != Ordering::Less } else { order != Ordering::Greater }
        });
        let before_end = options.endkey.as_ref().is_none_or(|end| {
            let order = collate(key, end);
            if ascending { order != Ordering::Greater } else { order != Ordering::Less }
        });
        after_start && before_end
    });

    page(rows, options)
}

fn page(rows: Vec<Row>, options: &FetchOptions) -> (Vec<Row>, u64) {
    let skip = options.skip.unwrap_or(0);
    let rows = rows
        .into_iter()
        .skip(skip)
        .take(options.limit.unwrap_or(usize::MAX))
        .collect();

    (rows, skip as u64)
}

fn project(doc: Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return doc;
    }

    let mut projected = Map::new();
    for field in fields {
        let Some(value) = lookup(&doc, field) else {
            continue;
        };

        let mut segments = field.split('.').peekable();
        let mut target = &mut projected;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                target.insert(segment.to_string(), value.clone());
                break;
            }
            let next = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match next {
                Value::Object(map) => target = map,
                _ => break,
            }
        }
    }

    Value::Object(projected)
}

/// Thread-safe in-memory [`StoreClient`].
///
/// Clones share the same underlying data.
#[derive(Clone)]
pub struct InMemoryStore {
    name: Arc<str>,
    database: Arc<RwLock<Database>>,
    views: Arc<HashMap<String, ViewFn>>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("name", &self.name)
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub const DEFAULT_NAME: &'static str = "memory";

    /// Creates an empty store without views.
    pub fn new() -> Self {
        Self::builder().finish()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn view_rows(&self, view: &str, include_docs: bool) -> StoreResult<Vec<Row>> {
        let map = self
            .views
            .get(view)
            .ok_or_else(|| MemoryStoreError::MissingView(view.to_string()))?;

        let database = self.database.read().await;
        let mut rows = Vec::new();
        for (id, stored) in database.live() {
            let doc = stored.materialize(id);
            for (key, value) in map(&doc) {
                rows.push(Row {
                    id: Some(id.clone()),
                    key,
                    value,
                    doc: include_docs.then(|| doc.clone()),
                    error: None,
                });
            }
        }

        rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Value> {
        trace!(target: "couchlayer::memory", id, "get");

        Ok(self.database.read().await.get(id)?)
    }

    async fn put(&self, doc: Value) -> StoreResult<DbResponse> {
        trace!(target: "couchlayer::memory", "put");

        Ok(self
            .database
            .write()
            .await
            .write(doc, false)?)
    }

    async fn post(&self, doc: Value) -> StoreResult<DbResponse> {
        trace!(target: "couchlayer::memory", "post");

        Ok(self
            .database
            .write()
            .await
            .write(doc, true)?)
    }

    async fn remove(&self, id: &str, rev: &str) -> StoreResult<DbResponse> {
        trace!(target: "couchlayer::memory", id, rev, "remove");

        Ok(self
            .database
            .write()
            .await
            .remove(id, rev)?)
    }

    async fn find(&self, query: &Query) -> StoreResult<FindResponse> {
        trace!(target: "couchlayer::memory", "find");

        let documents = {
            let database = self.database.read().await;
            database
                .live()
                .map(|(id, doc)| doc.materialize(id))
                .collect::<Vec<_>>()
        };

        let mut docs = DocumentEvaluator::filter_documents(documents, &query.selector.to_map())?;

        if !query.sort.is_empty() {
            docs.sort_by(|a, b| {
                query
                    .sort
                    .iter()
                    .map(|sort| {
                        let left = lookup(a, &sort.field).unwrap_or(&Value::Null);
                        let right = lookup(b, &sort.field).unwrap_or(&Value::Null);
                        match sort.direction {
                            SortDirection::Asc => collate(left, right),
                            SortDirection::Desc => collate(right, left),
                        }
                    })
                    .find(|order| *order != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let docs = docs
            .into_iter()
            .take(query.limit().unwrap_or(usize::MAX))
            .map(|doc| project(doc, &query.fields))
            .collect();

        Ok(FindResponse { docs, ..FindResponse::default() })
    }

    async fn all_docs(&self, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        trace!(target: "couchlayer::memory", "all_docs");

        let include_docs = options.is_some_and(|o| o.include_docs);
        let database = self.database.read().await;
        let total_rows = database.live().count() as u64;

        let rows = match options.and_then(|o| o.keys.as_ref()) {
            // Explicit keys also report deleted documents.
            Some(_) => database
                .docs
                .iter()
                .map(|(id, doc)| {
                    let mut value = Map::new();
                    value.insert("rev".into(), Value::from(doc.rev.as_str()));
                    if doc.deleted {
                        value.insert("deleted".into(), Value::Bool(true));
                    }
                    Row {
                        id: Some(id.clone()),
                        key: Value::from(id.as_str()),
                        value: Value::Object(value),
                        doc: (include_docs && !doc.deleted).then(|| doc.materialize(id)),
                        error: None,
                    }
                })
                .collect(),
            None => database
                .live()
                .map(|(id, doc)| Row {
                    id: Some(id.clone()),
                    key: Value::from(id.as_str()),
                    value: serde_json::json!({ "rev": doc.rev }),
                    doc: include_docs.then(|| doc.materialize(id)),
                    error: None,
                })
                .collect(),
        };

        let (rows, offset) = select_rows(rows, options);
        Ok(RowsResponse { total_rows, offset, rows })
    }

    async fn query(&self, view: &str, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        trace!(target: "couchlayer::memory", view, "query");

        let rows = self
            .view_rows(view, options.is_some_and(|o| o.include_docs))
            .await?;
        let total_rows = rows.len() as u64;

        let (rows, offset) = select_rows(rows, options);
        Ok(RowsResponse { total_rows, offset, rows })
    }

    async fn bulk_docs(&self, docs: Vec<Value>) -> StoreResult<Vec<BulkResult>> {
        trace!(target: "couchlayer::memory", count = docs.len(), "bulk_docs");

        let mut database = self.database.write().await;
        Ok(docs
            .into_iter()
            .map(|doc| {
                let id = doc
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                match database.write(doc, true) {
                    Ok(response) => BulkResult {
                        ok: Some(true),
                        id: response.id,
                        rev: Some(response.rev),
                        ..BulkResult::default()
                    },
                    Err(err) => {
                        let err = StoreError::from(err);
                        BulkResult {
                            id,
                            error: Some(err.error),
                            reason: Some(err.reason),
                            ..BulkResult::default()
                        }
                    }
                }
            })
            .collect())
    }

    async fn info(&self) -> StoreResult<DbInfo> {
        Ok(self.database.read().await.info(&self.name))
    }
}

/// Builder for [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    name: Option<String>,
    views: HashMap<String, ViewFn>,
}

impl InMemoryStoreBuilder {
    /// Sets the database name reported by `info`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers a view under `design/view`.
    pub fn view<F>(mut self, name: impl Into<String>, map: F) -> Self
    where
        F: Fn(&Value) -> Vec<(Value, Value)> + Send + Sync + 'static,
    {
        self.views.insert(name.into(), Arc::new(map));
        self
    }

    /// Builds the store without going through the async builder trait.
    pub fn finish(self) -> InMemoryStore {
        InMemoryStore {
            name: Arc::from(
                self.name
                    .unwrap_or_else(|| InMemoryStore::DEFAULT_NAME.to_string()),
            ),
            database: Arc::new(RwLock::new(Database::default())),
            views: Arc::new(self.views),
        }
    }
}

#[async_trait]
impl StoreClientBuilder for InMemoryStoreBuilder {
    type Client = InMemoryStore;

    async fn build(self) -> DbResult<Self::Client> {
        Ok(self.finish())
    }
}
