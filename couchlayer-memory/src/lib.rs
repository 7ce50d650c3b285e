//! In-memory store client for couchlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreClient` trait.
//! It behaves like a revision-checked document database and is ideal for development and
//! testing.
//!
//! # Features
//!
//! - **Revision tracking** - Every write yields a new revision; stale writes conflict
//! - **Selector queries** - Operators, logical groups, nested fields, sort, limit and projection
//! - **Key-range reads** - `_all_docs` style ranges, explicit keys, paging and descending order
//! - **Views** - Map functions registered on the builder
//! - **Bulk writes** - Per-document results, including deletions
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::{memory::InMemoryStore, repository::Repository};
//!
//! let store = InMemoryStore::builder()
//!     .name("app")
//!     .view("users/by_email", |doc| match doc.get("email") {
//!         Some(email) => vec![(email.clone(), serde_json::Value::Null)],
//!         None => vec![],
//!     })
//!     .finish();
//!
//! let repository = Repository::new(&store);
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_memory;

pub mod error;
pub mod evaluator;
pub mod store;

pub use error::MemoryStoreError;
pub use evaluator::collate;
pub use store::{InMemoryStore, InMemoryStoreBuilder, ViewFn};
