//! CouchDB client for couchlayer.
//!
//! This crate provides a [`StoreClient`](couchlayer_core::client::StoreClient) that talks to a
//! CouchDB server over HTTP, and a [`SearchClient`](couchlayer_core::search::SearchClient) for
//! full-text index endpoints.
//!
//! To use it, enable the `http` feature:
//!
//! ```toml
//! [dependencies]
//! couchlayer = { version = "x.y.z", features = ["http"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::{client::StoreClientBuilder, http::{CouchDbClient, CouchDbConfig}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CouchDbConfig::new("http://localhost:5984", "app")
//!         .with_credentials("admin", "secret");
//!     let client = CouchDbClient::builder(config).build().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Failed responses are decoded from CouchDB's `{"error", "reason"}` bodies and keep the HTTP
//! status, so 429 and 500 answers are retried by the repository.

#[allow(unused_extern_crates)]
extern crate self as couchlayer_http;

pub mod client;
pub mod config;
pub mod search;

pub use client::{CouchDbClient, CouchDbClientBuilder};
pub use config::{CouchDbConfig, DEFAULT_TIMEOUT_MS};
pub use search::HttpSearchClient;
