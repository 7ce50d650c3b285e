//! Mapper-bound views over a repository.
//!
//! An [`EntitySet`] pairs a [`Repository`] with one [`EntityMapper`], so a block of work can read
//! and write without repeating the mapper at every call site.
//!
//! ```ignore
//! let users = repository.entities(serde_mapper::<User>());
//!
//! let mut alice = users.get("user:alice").await?;
//! alice.email = "alice@example.org".into();
//! users.save(&mut alice).await?;
//! ```

use serde_json::Value;

use crate::{
    client::StoreClient,
    entity::Entity,
    error::DbResult,
    mapper::EntityMapper,
    query::{FetchOptions, Query},
    repository::Repository,
    search::{SearchOptions, SearchResponse},
};

/// A repository with a bound mapper.
#[derive(Debug)]
pub struct EntitySet<'a, C: StoreClient, M: EntityMapper> {
    repository: &'a Repository<C>,
    mapper: M,
}

impl<'a, C: StoreClient, M: EntityMapper> EntitySet<'a, C, M> {
    pub(crate) fn new(repository: &'a Repository<C>, mapper: M) -> Self {
        Self { repository, mapper }
    }

    pub fn repository(&self) -> &'a Repository<C> {
        self.repository
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub async fn get(&self, id: &str) -> DbResult<M::Output> {
        self.repository
            .get(id, &self.mapper)
            .await
    }

    pub async fn find(&self, query: &Query) -> DbResult<Vec<M::Output>> {
        self.repository
            .find(query, &self.mapper, None)
            .await
    }

    pub async fn fetch_all(&self, options: Option<&FetchOptions>) -> DbResult<Vec<M::Output>> {
        self.repository
            .fetch_all_by_type(options, &self.mapper, None)
            .await
    }

    pub async fn query(&self, view: &str, options: Option<&FetchOptions>) -> DbResult<Vec<M::Output>> {
        self.repository
            .query_by_type(view, options, &self.mapper, None)
            .await
    }

    pub async fn search(&self, options: &SearchOptions) -> DbResult<SearchResponse<M::Output>> {
        self.repository
            .lucene_query(options, &self.mapper, None)
            .await
    }

    /// Creates (with a store-assigned id) or updates `entity`.
    pub async fn save<E: Entity>(&self, entity: &mut E) -> DbResult<M::Output> {
        self.repository
            .save(entity, true, &self.mapper)
            .await
    }

    pub async fn quick_save<E: Entity>(&self, entity: &mut E) -> DbResult<M::Output> {
        self.repository
            .quick_save(entity, &self.mapper)
            .await
    }

    pub async fn create<E: Entity>(&self, entity: &mut E) -> DbResult<M::Output> {
        self.repository
            .create(entity, &self.mapper)
            .await
    }

    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        self.repository.delete(id).await
    }

    /// Maps an already fetched raw document.
    pub fn map(&self, source: Value) -> DbResult<M::Output> {
        self.mapper.map_to_entity(source)
    }
}
