//! CouchDB store client over HTTP.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::trace;

use couchlayer_core::{
    client::{StoreClient, StoreClientBuilder, StoreResult},
    error::{DbError, DbResult, StoreError},
    query::{FetchOptions, Query},
    response::{BulkResult, DbInfo, DbResponse, FindResponse, RowsResponse},
};

use crate::config::CouchDbConfig;

/// Builds a [`StoreError`] from a non-success response.
///
/// CouchDB answers failures with `{"error": ..., "reason": ...}`; any other body is kept as the
/// reason under the status' canonical name.
pub fn status_error(status: StatusCode, body: &str) -> StoreError {
    match serde_json::from_str::<StoreError>(body) {
        Ok(err) => err.with_status(status.as_u16()),
        Err(_) => {
            let error = status
                .canonical_reason()
                .unwrap_or("unknown_error")
                .to_lowercase()
                .replace(' ', "_");
            StoreError::new(error, body.trim()).with_status(status.as_u16())
        }
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    match err.status() {
        Some(status) => StoreError::transport(err.to_string()).with_status(status.as_u16()),
        None => StoreError::transport(err.to_string()),
    }
}

/// Splits `design/view` into its two parts.
pub fn split_view(view: &str) -> StoreResult<(&str, &str)> {
    match view.split_once('/') {
        Some((design, name)) if !design.is_empty() && !name.is_empty() => Ok((design, name)),
        _ => Err(StoreError::bad_request(format!(
            "View {view} must be addressed as design/view"
        ))),
    }
}

/// Sends a prepared request and decodes a successful JSON response.
pub(crate) async fn execute<T: DeserializeOwned>(
    request: RequestBuilder,
    credentials: Option<&(String, String)>,
) -> StoreResult<T> {
    let request = match credentials {
        Some((user, password)) => request.basic_auth(user, Some(password)),
        None => request,
    };

    let response = request
        .send()
        .await
        .map_err(transport_error)?;

    match response.status() {
        status if status.is_success() => response
            .json::<T>()
            .await
            .map_err(|e| StoreError::transport(format!("Invalid response body: {e}"))),
        status => {
            let body = response
                .text()
                .await
                .unwrap_or_default();
            Err(status_error(status, &body))
        }
    }
}

/// [`StoreClient`] backed by a CouchDB database.
#[derive(Debug, Clone)]
pub struct CouchDbClient {
    http: HttpClient,
    database_url: Url,
    credentials: Option<(String, String)>,
}

impl CouchDbClient {
    pub fn new(http: HttpClient, database_url: Url, credentials: Option<(String, String)>) -> Self {
        Self { http, database_url, credentials }
    }

    pub fn builder(config: CouchDbConfig) -> CouchDbClientBuilder {
        CouchDbClientBuilder::new(config)
    }

    pub fn database_url(&self) -> &Url {
        &self.database_url
    }

    /// The database URL extended by `segments`, each percent-encoded.
    pub fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.database_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::transport(format!("{} cannot be a base URL", self.database_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> StoreResult<T> {
        trace!(target: "couchlayer::http", %method, %url, "request");

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        execute(request, self.credentials.as_ref()).await
    }
}

fn document_id(doc: &Value) -> StoreResult<&str> {
    doc.get("_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::bad_request("Document id must be a non-empty string"))
}

fn options_body(options: Option<&FetchOptions>) -> StoreResult<Value> {
    match options {
        Some(options) => serde_json::to_value(options).map_err(|e| StoreError::bad_request(e.to_string())),
        None => Ok(json!({})),
    }
}

#[async_trait]
impl StoreClient for CouchDbClient {
    async fn get(&self, id: &str) -> StoreResult<Value> {
        self.send(Method::GET, self.url(&[id])?, None)
            .await
    }

    async fn put(&self, doc: Value) -> StoreResult<DbResponse> {
        let url = self.url(&[document_id(&doc)?])?;
        self.send(Method::PUT, url, Some(&doc))
            .await
    }

    async fn post(&self, doc: Value) -> StoreResult<DbResponse> {
        self.send(Method::POST, self.url(&[])?, Some(&doc))
            .await
    }

    async fn remove(&self, id: &str, rev: &str) -> StoreResult<DbResponse> {
        let mut url = self.url(&[id])?;
        url.query_pairs_mut()
            .append_pair("rev", rev);

        self.send(Method::DELETE, url, None)
            .await
    }

    async fn find(&self, query: &Query) -> StoreResult<FindResponse> {
        let body = serde_json::to_value(query).map_err(|e| StoreError::bad_request(e.to_string()))?;
        self.send(Method::POST, self.url(&["_find"])?, Some(&body))
            .await
    }

    async fn all_docs(&self, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        let body = options_body(options)?;
        self.send(Method::POST, self.url(&["_all_docs"])?, Some(&body))
            .await
    }

    async fn query(&self, view: &str, options: Option<&FetchOptions>) -> StoreResult<RowsResponse> {
        let (design, name) = split_view(view)?;
        let body = options_body(options)?;
        self.send(
            Method::POST,
            self.url(&["_design", design, "_view", name])?,
            Some(&body),
        )
        .await
    }

    async fn bulk_docs(&self, docs: Vec<Value>) -> StoreResult<Vec<BulkResult>> {
        let body = json!({ "docs": docs });
        self.send(Method::POST, self.url(&["_bulk_docs"])?, Some(&body))
            .await
    }

    async fn info(&self) -> StoreResult<DbInfo> {
        self.send(Method::GET, self.url(&[])?, None)
            .await
    }
}

/// Builder for [`CouchDbClient`] instances.
#[derive(Debug, Clone)]
pub struct CouchDbClientBuilder {
    config: CouchDbConfig,
}

impl CouchDbClientBuilder {
    pub fn new(config: CouchDbConfig) -> Self {
        Self { config }
    }

    /// Validates the configuration and creates the client.
    pub fn finish(self) -> DbResult<CouchDbClient> {
        let credentials = self.config.credentials()?;
        let database_url = self.config.database_url()?;
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .build()
            .map_err(|e| DbError::invalid_argument(format!("Unable to create HTTP client: {e}")))?;

        Ok(CouchDbClient::new(http, database_url, credentials))
    }
}

#[async_trait]
impl StoreClientBuilder for CouchDbClientBuilder {
    type Client = CouchDbClient;

    async fn build(self) -> DbResult<Self::Client> {
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CouchDbClient {
        CouchDbClient::builder(CouchDbConfig::new("localhost:5984", "app"))
            .finish()
            .unwrap()
    }

    #[test]
    fn parses_couch_error_bodies() {
        let err = status_error(
            StatusCode::CONFLICT,
            r#"{"error":"conflict","reason":"Document update conflict."}"#,
        );
        assert!(err.is_conflict());
        assert_eq!(err.status, Some(409));
        assert_eq!(err.reason, "Document update conflict.");
    }

    #[test]
    fn non_json_errors_use_the_status() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.error, "too_many_requests");
        assert!(err.is_transient());

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(err.is_transient());
    }

    #[test]
    fn document_urls_are_encoded() {
        let client = client();
        assert_eq!(
            client.url(&["user:a b"]).unwrap().as_str(),
            "http://localhost:5984/app/user:a%20b"
        );
        assert_eq!(
            client.url(&["_design", "users", "_view", "by_age"]).unwrap().as_str(),
            "http://localhost:5984/app/_design/users/_view/by_age"
        );
        assert_eq!(client.url(&[]).unwrap().as_str(), "http://localhost:5984/app");
    }

    #[test]
    fn views_need_both_parts() {
        assert_eq!(split_view("users/by_age").unwrap(), ("users", "by_age"));
        assert!(split_view("by_age").is_err());
        assert!(split_view("/by_age").is_err());
    }

    #[test]
    fn mismatched_credentials_fail_to_build() {
        let config = CouchDbConfig {
            user: Some("admin".into()),
            ..CouchDbConfig::new("localhost", "app")
        };
        assert!(CouchDbClient::builder(config).finish().is_err());
    }
}
