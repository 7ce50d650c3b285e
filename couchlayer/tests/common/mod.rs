#![allow(dead_code)]

use async_trait::async_trait;
use couchlayer::{
    client::{StoreClient, StoreResult},
    memory::InMemoryStore,
    prelude::*,
    query::{FetchOptions, Query},
    response::{BulkResult, DbInfo, DbResponse, FindResponse, RowsResponse},
    search::SearchResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EntityFields)]
pub struct User {
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(rename = "emailAddress")]
    pub email: String,
    pub age: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Entity for User {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn validate(&self) -> DbResult<()> {
        if self.email.is_empty() {
            return Err(DbError::invalid_argument("A user needs an email address"));
        }
        Ok(())
    }
}

/// A new user whose id will be assigned by the store.
pub fn user(email: &str, age: u32) -> User {
    User {
        meta: EntityMeta::new("user").unwrap(),
        email: email.to_string(),
        age,
        tags: Vec::new(),
    }
}

/// A new user whose id is `user:<name>`.
pub fn named_user(name: &str, age: u32) -> User {
    User {
        meta: EntityMeta::with_identifiers("user", [name]).unwrap(),
        email: format!("{name}@example.com"),
        age,
        tags: Vec::new(),
    }
}

/// Wraps an [`InMemoryStore`], counting every store call and failing queued calls.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    inner: InMemoryStore,
    calls: AtomicUsize,
    failures: Mutex<VecDeque<StoreError>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrap(inner: InMemoryStore) -> Self {
        Self { inner, ..Self::default() }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Makes the next `times` calls fail with `err`.
    pub fn fail_next(&self, err: StoreError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        failures.extend(std::iter::repeat_n(err, times));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StoreClient for ScriptedClient {
    async fn get(&self, id: &str) -> StoreResult<Value> {
        self.enter()?;
        self.inner.get(id).await
    }

    async fn put(&self, doc: Value) -> StoreResult<DbResponse> {
        self.enter()?;
        self.inner.put(doc).await
    }

    async fn post(&self, doc: Value) -> StoreResult<DbResponse> {
        self.enter()?;
        self.inner.post(doc).await
    }

    async fn remove(&self, id: &str, rev: &str) -> StoreResult<DbResponse> {
        self.enter()?;
        self.inner.remove(id, rev).await
    }

    async fn find(&self, query: &Query) -> StoreResult<FindResponse> {
        self.enter()?;
        self.inner.find(query).await
    }

    async fn all_docs(&self, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        self.enter()?;
        self.inner.all_docs(options).await
    }

    async fn query(&self, view: &str, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        self.enter()?;
        self.inner.query(view, options).await
    }

    async fn bulk_docs(&self, docs: Vec<Value>) -> StoreResult<Vec<BulkResult>> {
        self.enter()?;
        self.inner.bulk_docs(docs).await
    }

    async fn info(&self) -> StoreResult<DbInfo> {
        self.enter()?;
        self.inner.info().await
    }
}

/// Search client answering every request with a fixed response.
#[derive(Debug)]
pub struct CannedSearch {
    response: SearchResponse,
    urls: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<StoreError>>,
}

impl CannedSearch {
    pub fn new(response: SearchResponse) -> Self {
        Self { response, urls: Mutex::default(), failures: Mutex::default() }
    }

    pub fn fail_next(&self, err: StoreError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchClient for CannedSearch {
    async fn search(&self, url: &str) -> StoreResult<SearchResponse> {
        self.urls.lock().unwrap().push(url.to_string());
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(self.response.clone()),
        }
    }
}
