//! Convenient re-exports of commonly used types from couchlayer.
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! ```

pub use couchlayer_core::{
    client::{StoreClient, StoreClientBuilder},
    collection::EntitySet,
    entity::{Entity, EntityExt, EntityMeta},
    error::{DbError, DbResult, ErrorKind, StoreError},
    mapper::{EntityMapper, PassThrough, SerdeMapper, map_with, serde_mapper},
    query::{FetchOptions, Query, QueryBuilder, Sort, SortDirection},
    repository::{Repository, RepositoryConfig},
    retry::{Backoff, RetryPolicy},
    search::{SearchClient, SearchOptions, SearchResponse},
    selector::{FieldRef, LogicalOperator, OperatorValue, Selector},
};

pub use couchlayer_macros::EntityFields;
