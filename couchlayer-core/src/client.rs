//! Store client abstraction.
//!
//! The [`StoreClient`] trait is the capability set the repository needs from a document store:
//! single-document reads and writes, selector queries, key-range reads, view queries, bulk
//! writes and database info. Implementations exist for an in-memory store (`couchlayer-memory`)
//! and for CouchDB over HTTP (`couchlayer-http`).
//!
//! Clients report failures as [`StoreError`] values. The repository decides what is retried and
//! how failures are surfaced; a client should never retry on its own.
//!
//! # Thread Safety
//!
//! Clients are shared between concurrent repository calls and must be `Send + Sync`. A client
//! handle is borrowed by the repository and never closed by it.

use async_trait::async_trait;
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::{DbResult, StoreError},
    query::{FetchOptions, Query},
    response::{BulkResult, DbInfo, DbResponse, FindResponse, RowsResponse},
};

/// Result of a raw store call.
pub type StoreResult<T> = Result<T, StoreError>;

/// Normalizes a database name the way the server expects it: lower-cased, with `/` removed.
pub fn normalize_database_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '/')
        .flat_map(char::to_lowercase)
        .collect()
}

#[async_trait]
pub trait StoreClient: Send + Sync + Debug {
    /// Fetches the latest revision of a document.
    ///
    /// Missing and deleted documents are reported with [`StoreError::not_found`].
    async fn get(&self, id: &str) -> StoreResult<Value>;

    /// Writes a document under its `_id`.
    ///
    /// Without `_rev` the document must not exist yet; with `_rev` it must match the stored
    /// revision. Either mismatch is a [`StoreError::conflict`].
    async fn put(&self, doc: Value) -> StoreResult<DbResponse>;

    /// Creates a document with a store-assigned id.
    async fn post(&self, doc: Value) -> StoreResult<DbResponse>;

    /// Removes the document `id` at revision `rev`.
    async fn remove(&self, id: &str, rev: &str) -> StoreResult<DbResponse>;

    /// Runs a selector query.
    async fn find(&self, query: &Query) -> StoreResult<FindResponse>;

    /// Reads the primary index, optionally restricted by key range or explicit keys.
    async fn all_docs(&self, options: Option<&FetchOptions>) -> StoreResult<RowsResponse>;

    /// Reads a view, addressed as `design/view`.
    async fn query(&self, view: &str, options: Option<&FetchOptions>) -> StoreResult<RowsResponse>;

    /// Writes a batch of documents. Each document succeeds or fails on its own.
    async fn bulk_docs(&self, docs: Vec<Value>) -> StoreResult<Vec<BulkResult>>;

    /// Returns database metadata.
    async fn info(&self) -> StoreResult<DbInfo>;
}

#[async_trait]
impl<C> StoreClient for &C
where
    C: StoreClient + ?Sized,
{
    async fn get(&self, id: &str) -> StoreResult<Value> {
        (**self).get(id).await
    }

    async fn put(&self, doc: Value) -> StoreResult<DbResponse> {
        (**self).put(doc).await
    }

    async fn post(&self, doc: Value) -> StoreResult<DbResponse> {
        (**self).post(doc).await
    }

    async fn remove(&self, id: &str, rev: &str) -> StoreResult<DbResponse> {
        (**self).remove(id, rev).await
    }

    async fn find(&self, query: &Query) -> StoreResult<FindResponse> {
        (**self).find(query).await
    }

    async fn all_docs(&self, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        (**self).all_docs(options).await
    }

    async fn query(&self, view: &str, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        (**self).query(view, options).await
    }

    async fn bulk_docs(&self, docs: Vec<Value>) -> StoreResult<Vec<BulkResult>> {
        (**self).bulk_docs(docs).await
    }

    async fn info(&self) -> StoreResult<DbInfo> {
        (**self).info().await
    }
}

#[async_trait]
impl<C> StoreClient for Arc<C>
where
    C: StoreClient + ?Sized,
{
    async fn get(&self, id: &str) -> StoreResult<Value> {
        (**self).get(id).await
    }

    async fn put(&self, doc: Value) -> StoreResult<DbResponse> {
        (**self).put(doc).await
    }

    async fn post(&self, doc: Value) -> StoreResult<DbResponse> {
        (**self).post(doc).await
    }

    async fn remove(&self, id: &str, rev: &str) -> StoreResult<DbResponse> {
        (**self).remove(id, rev).await
    }

    async fn find(&self, query: &Query) -> StoreResult<FindResponse> {
        (**self).find(query).await
    }

    async fn all_docs(&self, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        (**self).all_docs(options).await
    }

    async fn query(&self, view: &str, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        (**self).query(view, options).await
    }

    async fn bulk_docs(&self, docs: Vec<Value>) -> StoreResult<Vec<BulkResult>> {
        (**self).bulk_docs(docs).await
    }

    async fn info(&self) -> StoreResult<DbInfo> {
        (**self).info().await
    }
}

/// Factory for store clients.
#[async_trait]
pub trait StoreClientBuilder {
    type Client: StoreClient;

    async fn build(self) -> DbResult<Self::Client>;
}
