//! The document repository.
//!
//! [`Repository`] turns a [`StoreClient`] into typed CRUD, query and bulk operations:
//!
//! - identity and revision bookkeeping on save, with optimistic concurrency,
//! - caller-supplied [`EntityMapper`]s applied to every returned document,
//! - bounded retry of transient failures on read-style calls (see [`crate::retry`]),
//! - structured [`DbError`]s that keep the store error as their cause.
//!
//! Argument and validation errors are raised before any store call is made.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::prelude::*;
//!
//! let repository = Repository::new(&client);
//!
//! let mut user = User::new("alice@example.com")?;
//! let saved: User = repository.save(&mut user, true, &serde_mapper()).await?;
//!
//! let query = Query::builder()
//!     .selector(Selector::create_with_property("type", "user")?)
//!     .limit(10)
//!     .build();
//! let users: Vec<User> = repository.find(&query, &serde_mapper(), None).await?;
//! ```

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::{
    client::StoreClient,
    collection::EntitySet,
    entity::{Entity, EntityExt},
    error::{DbError, DbResult, ErrorKind, StoreError},
    mapper::{EntityMapper, map_entities},
    query::{FetchOptions, Query},
    response::{BulkResult, DbInfo, DbResponse},
    retry::{RetryPolicy, retry},
    search::{SearchClient, SearchOptions, SearchResponse},
};

/// Repository-wide settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Retry policy for read-style operations that are not given an explicit attempt budget.
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct Repository<C: StoreClient> {
    client: C,
    config: RepositoryConfig,
    search: Option<Arc<dyn SearchClient>>,
}

impl<C: StoreClient> Repository<C> {
    pub fn new(client: C) -> Self {
        Self::with_config(client, RepositoryConfig::default())
    }

    pub fn with_config(client: C, config: RepositoryConfig) -> Self {
        Self { client, config, search: None }
    }

    /// Attaches the client used by [`lucene_query`](Self::lucene_query).
    pub fn with_search_client(mut self, search: Arc<dyn SearchClient>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Binds `mapper` for a block of calls.
    pub fn entities<M: EntityMapper>(&self, mapper: M) -> EntitySet<'_, C, M> {
        EntitySet::new(self, mapper)
    }

    /// Builds a structured error. An empty `reason` falls back to the kind.
    pub fn create_error(kind: ErrorKind, reason: impl Into<String>) -> DbError {
        DbError::new(kind, reason)
    }

    fn policy(&self, retry_attempts: Option<usize>) -> RetryPolicy {
        match retry_attempts {
            Some(attempts) => RetryPolicy { attempts, ..self.config.retry },
            None => self.config.retry,
        }
    }

    /// Creates or updates `entity`.
    ///
    /// An entity with a type, no id and `generate_id` set is created with a store-assigned id.
    /// Anything else is an update: the stored revision is fetched, stamped on the entity and the
    /// entity is written over it. On success the entity's id and revision reflect the store.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an entity without an id that is not created here.
    /// - `EntityTransient` for an update of an entity that was never persisted.
    /// - `SaveFailed` when the store rejects either write.
    /// - Whatever [`Entity::validate`] returns.
    pub async fn save<E, M>(&self, entity: &mut E, generate_id: bool, mapper: &M) -> DbResult<M::Output>
    where
        E: Entity,
        M: EntityMapper,
    {
        entity.validate()?;

        if entity.has_type() && entity.id().is_empty() && generate_id {
            return self.insert(entity, mapper).await;
        }

        if entity.id().is_empty() {
            return Err(DbError::invalid_argument("Cannot save an entity without an id"));
        }
        if entity.is_transient() {
            return Err(DbError::new(
                ErrorKind::EntityTransient,
                format!("Entity {} has not been persisted", entity.id()),
            ));
        }

        debug!(target: "couchlayer::repository", id = entity.id(), "updating entity");

        let stored = self
            .client
            .get(entity.id())
            .await
            .map_err(|err| save_failed(entity.id(), err))?;
        let revision = stored
            .get("_rev")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        entity.meta_mut().revision = revision;
        self.write(entity, mapper).await
    }

    /// Writes `entity` at its current revision without re-fetching it.
    ///
    /// A concurrent update since the entity was read makes this fail with `SaveFailed`.
    pub async fn quick_save<E, M>(&self, entity: &mut E, mapper: &M) -> DbResult<M::Output>
    where
        E: Entity,
        M: EntityMapper,
    {
        entity.validate()?;

        if entity.is_transient() {
            return Err(DbError::new(
                ErrorKind::EntityTransient,
                "Cannot quick-save an entity that has not been persisted",
            ));
        }

        debug!(target: "couchlayer::repository", id = entity.id(), "quick-saving entity");
        self.write(entity, mapper).await
    }

    /// Creates a new entity under the id it already carries.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if the entity has no id or already has a revision, and with
    /// `SaveFailed` if a document with that id exists.
    pub async fn create<E, M>(&self, entity: &mut E, mapper: &M) -> DbResult<M::Output>
    where
        E: Entity,
        M: EntityMapper,
    {
        entity.validate()?;

        if entity.id().is_empty() {
            return Err(DbError::invalid_argument("Cannot create an entity without an id"));
        }
        if !entity.revision().is_empty() {
            return Err(DbError::invalid_argument(format!(
                "Entity {} has already been persisted",
                entity.id()
            )));
        }

        debug!(target: "couchlayer::repository", id = entity.id(), "creating entity");
        self.write(entity, mapper).await
    }

    async fn insert<E, M>(&self, entity: &mut E, mapper: &M) -> DbResult<M::Output>
    where
        E: Entity,
        M: EntityMapper,
    {
        debug!(target: "couchlayer::repository", entity_type = entity.entity_type(), "inserting entity");

        entity.touch();
        let response = self
            .client
            .post(entity.to_json()?)
            .await
            .map_err(|err| save_failed(entity.entity_type(), err))?;

        self.apply(entity, response, mapper)
    }

    async fn write<E, M>(&self, entity: &mut E, mapper: &M) -> DbResult<M::Output>
    where
        E: Entity,
        M: EntityMapper,
    {
        entity.touch();
        let response = self
            .client
            .put(entity.to_json()?)
            .await
            .map_err(|err| save_failed(entity.id(), err))?;

        self.apply(entity, response, mapper)
    }

    fn apply<E, M>(&self, entity: &mut E, response: DbResponse, mapper: &M) -> DbResult<M::Output>
    where
        E: Entity,
        M: EntityMapper,
    {
        if !response.ok || response.rev.is_empty() {
            return Err(DbError::new(ErrorKind::SaveFailed, "The store did not acknowledge the write"));
        }

        let meta = entity.meta_mut();
        if !response.id.is_empty() {
            meta.id = response.id;
        }
        meta.revision = response.rev;

        mapper.map_to_entity(entity.to_json()?)
    }

    /// Removes the document `id` at its current revision.
    ///
    /// Returns the store's acknowledgement flag.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        if id.is_empty() {
            return Err(DbError::invalid_argument("Cannot delete a document without an id"));
        }

        debug!(target: "couchlayer::repository", id, "deleting document");

        let stored = self
            .client
            .get(id)
            .await
            .map_err(|err| delete_failed(id, err))?;
        let revision = stored
            .get("_rev")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DbError::new(ErrorKind::DeleteFailed, format!("Document {id} has no revision"))
            })?;

        let response = self
            .client
            .remove(id, revision)
            .await
            .map_err(|err| delete_failed(id, err))?;

        Ok(response.ok)
    }

    /// Fetches and maps a single document.
    pub async fn get<M: EntityMapper>(&self, id: &str, mapper: &M) -> DbResult<M::Output> {
        if id.is_empty() {
            return Err(DbError::invalid_argument("Cannot get a document without an id"));
        }

        debug!(target: "couchlayer::repository", id, "fetching document");

        let doc = retry(&self.policy(None), "get document", ErrorKind::FetchFailed, || {
            self.client.get(id)
        })
        .await?;

        mapper.map_to_entity(doc)
    }

    /// Runs a selector query and maps every returned document.
    pub async fn find<M: EntityMapper>(
        &self,
        query: &Query,
        mapper: &M,
        retry_attempts: Option<usize>,
    ) -> DbResult<Vec<M::Output>> {
        debug!(target: "couchlayer::repository", limit = ?query.limit(), "finding documents");

        let response = retry(&self.policy(retry_attempts), "find documents", ErrorKind::QueryFailed, || {
            self.client.find(query)
        })
        .await?;

        map_entities(mapper, response.docs)
    }

    /// Reads the primary index.
    ///
    /// Returns the embedded documents when `include_docs` is set, the raw rows otherwise.
    pub async fn fetch_all(
        &self,
        options: Option<&FetchOptions>,
        retry_attempts: Option<usize>,
    ) -> DbResult<Vec<Value>> {
        debug!(target: "couchlayer::repository", "fetching all documents");

        let response = retry(&self.policy(retry_attempts), "fetch documents", ErrorKind::FetchFailed, || {
            self.client.all_docs(options)
        })
        .await?;

        let include_docs = options.is_some_and(|o| o.include_docs);
        Ok(if include_docs {
            response.into_docs()
        } else {
            response
                .rows
                .iter()
                .map(|row| row.to_value())
                .collect()
        })
    }

    /// Reads the primary index with documents and maps them. Rows without a document are skipped.
    pub async fn fetch_all_by_type<M: EntityMapper>(
        &self,
        options: Option<&FetchOptions>,
        mapper: &M,
        retry_attempts: Option<usize>,
    ) -> DbResult<Vec<M::Output>> {
        let options = with_docs(options);
        let docs = self
            .fetch_all(Some(&options), retry_attempts)
            .await?;

        map_entities(mapper, docs)
    }

    /// Reads a view, addressed as `design/view`, and returns its raw rows.
    pub async fn query(
        &self,
        view: &str,
        options: Option<&FetchOptions>,
        retry_attempts: Option<usize>,
    ) -> DbResult<Vec<Value>> {
        if view.is_empty() {
            return Err(DbError::invalid_argument("A view name is required"));
        }

        debug!(target: "couchlayer::repository", view, "querying view");

        let response = retry(&self.policy(retry_attempts), "query view", ErrorKind::QueryFailed, || {
            self.client.query(view, options)
        })
        .await?;

        Ok(response
            .rows
            .iter()
            .map(|row| row.to_value())
            .collect())
    }

    /// Reads a view with documents and maps them. Rows without a document are skipped.
    pub async fn query_by_type<M: EntityMapper>(
        &self,
        view: &str,
        options: Option<&FetchOptions>,
        mapper: &M,
        retry_attempts: Option<usize>,
    ) -> DbResult<Vec<M::Output>> {
        if view.is_empty() {
            return Err(DbError::invalid_argument("A view name is required"));
        }

        debug!(target: "couchlayer::repository", view, "querying view by type");

        let options = with_docs(options);
        let response = retry(&self.policy(retry_attempts), "query view", ErrorKind::QueryFailed, || {
            self.client.query(view, Some(&options))
        })
        .await?;

        map_entities(mapper, response.into_docs())
    }

    /// Runs a full-text search and maps every hit's document.
    ///
    /// # Errors
    ///
    /// Fails with `QueryFailed` when no search client is attached or the search fails.
    pub async fn lucene_query<M: EntityMapper>(
        &self,
        options: &SearchOptions,
        mapper: &M,
        retry_attempts: Option<usize>,
    ) -> DbResult<SearchResponse<M::Output>> {
        let search = self
            .search
            .as_ref()
            .ok_or_else(|| DbError::new(ErrorKind::QueryFailed, "No search client configured"))?;

        let url = options.url();
        debug!(target: "couchlayer::repository", url = %url, "running full-text query");

        let response = retry(&self.policy(retry_attempts), "run full-text query", ErrorKind::QueryFailed, || {
            search.search(&url)
        })
        .await?;

        response.convert(mapper)
    }

    /// Writes a batch of raw documents and returns the per-document results as reported.
    pub async fn bulk_docs(&self, docs: Vec<Value>) -> DbResult<Vec<BulkResult>> {
        if docs.is_empty() {
            return Err(DbError::invalid_argument("No documents to write"));
        }

        debug!(target: "couchlayer::repository", count = docs.len(), "writing documents in bulk");

        self.client
            .bulk_docs(docs)
            .await
            .map_err(|err| {
                DbError::new(ErrorKind::BulkWriteFailed, format!("Unable to write documents: {err}"))
                    .with_cause(err)
            })
    }

    /// Returns database metadata.
    pub async fn info(&self) -> DbResult<DbInfo> {
        retry(&self.policy(None), "read database info", ErrorKind::FetchFailed, || {
            self.client.info()
        })
        .await
    }
}

fn with_docs(options: Option<&FetchOptions>) -> FetchOptions {
    FetchOptions { include_docs: true, ..options.cloned().unwrap_or_default() }
}

fn save_failed(target: &str, err: StoreError) -> DbError {
    DbError::new(ErrorKind::SaveFailed, format!("Unable to save {target}: {err}")).with_cause(err)
}

fn delete_failed(id: &str, err: StoreError) -> DbError {
    DbError::new(ErrorKind::DeleteFailed, format!("Unable to delete {id}: {err}")).with_cause(err)
}
