//! Main couchlayer crate providing a repository over revision-versioned document stores.
//!
//! This crate is the primary entry point for users of couchlayer. It re-exports the core types
//! from the sub-crates and gives access to the available store clients.
//!
//! # Features
//!
//! - **Entity bookkeeping** - Ids, revisions, types and timestamps managed for you
//! - **Optimistic concurrency** - Updates are written against the stored revision
//! - **Selector builder** - Fluent, checked construction of query predicates
//! - **Per-call mapping** - Every read maps raw documents through a caller-supplied mapper
//! - **Retry** - Rate-limited and failed server calls are retried a bounded number of times
//! - **Multiple clients** - In-memory for development and tests, CouchDB over HTTP
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, EntityFields)]
//! pub struct User {
//!     #[serde(flatten)]
//!     pub meta: EntityMeta,
//!     pub email: String,
//!     pub age: u32,
//! }
//!
//! impl Entity for User {
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DbResult<()> {
//!     let repository = Repository::new(InMemoryStore::new());
//!     let users = repository.entities(serde_mapper::<User>());
//!
//!     // Create with a store-assigned id
//!     let mut alice = User {
//!         meta: EntityMeta::new("user")?,
//!         email: "alice@example.com".to_string(),
//!         age: 31,
//!     };
//!     users.save(&mut alice).await?;
//!
//!     // Update at the stored revision
//!     alice.age = 32;
//!     users.save(&mut alice).await?;
//!
//!     // Query with a selector
//!     let mut selector = Selector::create();
//!     selector
//!         .with_property(User::AGE)
//!         .with_value(OperatorValue::gt(30))?;
//!
//!     let query = Query::builder()
//!         .selector(selector)
//!         .sort(User::EMAIL, SortDirection::Asc)
//!         .limit(10)
//!         .build();
//!     let found = users.find(&query).await?;
//!
//!     println!("Found users: {:?}", found);
//!     Ok(())
//! }
//! ```
//!
//! # Remote stores
//!
//! With the `http` feature enabled, [`http::CouchDbClient`] talks to a CouchDB server:
//!
//! ```ignore
//! use couchlayer::{prelude::*, http::{CouchDbClient, CouchDbConfig, DEFAULT_TIMEOUT_MS, HttpSearchClient}};
//! use std::sync::Arc;
//!
//! let client = CouchDbClient::builder(CouchDbConfig::new("localhost:5984", "app"))
//!     .build()
//!     .await?;
//! let repository = Repository::new(client)
//!     .with_search_client(Arc::new(HttpSearchClient::with_timeout_ms(DEFAULT_TIMEOUT_MS)?));
//! ```
//!
//! # Clients
//!
//! - [`memory`] - In-memory store for development and testing
//! - `http` - CouchDB over HTTP (requires the `http` feature)

#[allow(unused_extern_crates)]
extern crate self as couchlayer;

pub mod prelude;

pub use couchlayer_core::{
    client, collection, entity, error, mapper, query, repository, response, retry, search, selector,
};

pub use couchlayer_macros::EntityFields;

/// In-memory store client.
pub mod memory {
    pub use couchlayer_memory::{InMemoryStore, InMemoryStoreBuilder, MemoryStoreError, ViewFn, collate};
}

/// CouchDB store client over HTTP.
///
/// This module is only available when the `http` feature is enabled.
#[cfg(feature = "http")]
pub mod http {
    pub use couchlayer_http::{
        CouchDbClient, CouchDbClientBuilder, CouchDbConfig, DEFAULT_TIMEOUT_MS, HttpSearchClient,
    };
}
