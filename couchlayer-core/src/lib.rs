//! A client-side persistence layer over revision-versioned JSON document stores.
//!
//! This crate is the core of the couchlayer project and provides:
//!
//! - **Entity model** ([`entity`]) - Identity, revision and timestamp bookkeeping for documents
//! - **Selector builder** ([`selector`]) - Fluent construction of query predicates
//! - **Queries** ([`query`]) - Selector queries and key-range fetch options
//! - **Entity mapping** ([`mapper`]) - Per-call conversion of raw documents into caller types
//! - **Store client abstraction** ([`client`]) - The trait store transports implement
//! - **Repository** ([`repository`]) - Typed CRUD, query and bulk operations with retry
//! - **Full-text search** ([`search`]) - Search URL construction and scored results
//! - **Error handling** ([`error`]) - Structured `{error, reason}` errors and result types
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::entity::{Entity, EntityMeta};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(flatten)]
//!     pub meta: EntityMeta,
//!     pub email: String,
//! }
//!
//! impl Entity for User {
//!     fn meta(&self) -> &EntityMeta {
//!         &self.meta
//!     }
//!
//!     fn meta_mut(&mut self) -> &mut EntityMeta {
//!         &mut self.meta
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_core;

pub mod client;
pub mod collection;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod query;
pub mod repository;
pub mod response;
pub mod retry;
pub mod search;
pub mod selector;
