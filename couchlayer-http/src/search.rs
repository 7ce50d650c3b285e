use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

use couchlayer_core::{
    client::StoreResult,
    error::{DbError, DbResult, StoreError},
    search::{SearchClient, SearchResponse},
};

use crate::client::execute;

/// [`SearchClient`] that issues GET requests against a full-text index endpoint.
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    http: HttpClient,
    credentials: Option<(String, String)>,
}

impl HttpSearchClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http, credentials: None }
    }

    /// Creates a client with its own connection pool and a request timeout of `timeout_ms`.
    pub fn with_timeout_ms(timeout_ms: u64) -> DbResult<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| DbError::invalid_argument(format!("Unable to create HTTP client: {e}")))?;

        Ok(Self::new(http))
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, url: &str) -> StoreResult<SearchResponse<Value>> {
        let url = Url::parse(url).map_err(|e| StoreError::bad_request(format!("Invalid search URL {url}: {e}")))?;
        trace!(target: "couchlayer::http", %url, "search");

        execute(self.http.get(url), self.credentials.as_ref()).await
    }
}
