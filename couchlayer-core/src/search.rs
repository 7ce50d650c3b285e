//! Full-text search over an external index endpoint.
//!
//! Search requests are plain GETs against a design-document index:
//!
//! ```text
//! http://host/database/_design/index/path?q=<escaped>&include_docs=true&limit=25&skip=0
//! ```
//!
//! [`SearchOptions`] builds that URL and [`SearchClient`] executes it. The repository maps each
//! returned row through the caller's mapper.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

use crate::{
    client::{StoreResult, normalize_database_name},
    error::{DbError, DbResult},
    mapper::EntityMapper,
};

/// Rows returned when no limit is given.
pub const DEFAULT_SEARCH_LIMIT: usize = 25;

/// Escapes the characters the index endpoint treats specially.
pub fn escape_query(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        match c {
            '/' => escaped.push_str("//"),
            '*' => escaped.push_str("%2A"),
            '?' => escaped.push_str("%3F"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Parameters of one full-text request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    server: String,
    database: String,
    index_path: String,
    query: String,
    include_docs: bool,
    limit: usize,
    skip: usize,
    secure: bool,
    bookmark: Option<String>,
}

impl SearchOptions {
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if any part is empty.
    pub fn new(
        server: impl Into<String>,
        database: impl AsRef<str>,
        index_path: impl Into<String>,
        query: impl Into<String>,
    ) -> DbResult<Self> {
        let server = server.into();
        let database = normalize_database_name(database.as_ref());
        let index_path = index_path.into();
        let query = query.into();

        if server.is_empty() || database.is_empty() || index_path.is_empty() || query.is_empty() {
            return Err(DbError::invalid_argument(
                "Search requires a server, a database, an index path and a query",
            ));
        }

        Ok(Self {
            server,
            database,
            index_path,
            query,
            include_docs: false,
            limit: DEFAULT_SEARCH_LIMIT,
            skip: 0,
            secure: false,
            bookmark: None,
        })
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    /// Values below 1 fall back to [`DEFAULT_SEARCH_LIMIT`].
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = usize::try_from(limit)
            .ok()
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_SEARCH_LIMIT);
        self
    }

    /// Negative values are treated as 0.
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = usize::try_from(skip).unwrap_or(0);
        self
    }

    /// Uses `https` when the server has no explicit scheme.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Resumes a paged search from a previous response's bookmark.
    pub fn bookmark(mut self, bookmark: impl Into<String>) -> Self {
        let bookmark = bookmark.into();
        self.bookmark = (!bookmark.is_empty()).then_some(bookmark);
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_include_docs(&self) -> bool {
        self.include_docs
    }

    pub fn get_limit(&self) -> usize {
        self.limit
    }

    pub fn get_skip(&self) -> usize {
        self.skip
    }

    /// The GET URL for this request.
    pub fn url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        let base = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            let scheme = if self.secure { "https" } else { "http" };
            format!("{scheme}://{server}")
        };

        let mut url = format!(
            "{base}/{}/_design/{}?q={}&include_docs={}&limit={}&skip={}",
            self.database,
            self.index_path.trim_matches('/'),
            escape_query(&self.query),
            self.include_docs,
            self.limit,
            self.skip,
        );
        if let Some(bookmark) = &self.bookmark {
            url.push_str(&format!("&bookmark=\"{bookmark}\""));
        }

        url
    }
}

/// One scored hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow<T = Value> {
    #[serde(default)]
    pub score: Value,
    #[serde(default = "Option::default")]
    pub doc: Option<T>,
    #[serde(default)]
    pub id: String,
}

impl ScoredRow<Value> {
    /// Maps the embedded document, leaving score and id untouched.
    pub fn convert_document<M: EntityMapper>(&self, mapper: &M) -> DbResult<ScoredRow<M::Output>> {
        let doc = self
            .doc
            .clone()
            .map(|doc| mapper.map_to_entity(doc))
            .transpose()?;

        Ok(ScoredRow { score: self.score.clone(), doc, id: self.id.clone() })
    }
}

/// A page of search hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse<T = Value> {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub fetch_duration: u64,
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub search_duration: u64,
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "Vec::new")]
    pub rows: Vec<ScoredRow<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

impl SearchResponse<Value> {
    /// Maps every row's document, keeping row order.
    pub fn convert<M: EntityMapper>(self, mapper: &M) -> DbResult<SearchResponse<M::Output>> {
        let rows = self
            .rows
            .iter()
            .map(|row| row.convert_document(mapper))
            .collect::<DbResult<Vec<_>>>()?;

        Ok(SearchResponse {
            q: self.q,
            fetch_duration: self.fetch_duration,
            total_rows: self.total_rows,
            limit: self.limit,
            search_duration: self.search_duration,
            skip: self.skip,
            rows,
            bookmark: self.bookmark,
        })
    }
}

/// Executes full-text requests.
#[async_trait]
pub trait SearchClient: Send + Sync + Debug {
    async fn search(&self, url: &str) -> StoreResult<SearchResponse<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{PassThrough, serde_mapper};
    use serde_json::json;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_query("a/b*c?"), "a//b%2Ac%3F");
        assert_eq!(escape_query("name:alice"), "name:alice");
    }

    #[test]
    fn builds_url() {
        let options = SearchOptions::new("localhost:5985", "Users/Main", "users/by_name", "name:al*")
            .unwrap()
            .include_docs(true)
            .limit(0)
            .skip(-4);

        assert_eq!(
            options.url(),
            "http://localhost:5985/usersmain/_design/users/by_name?q=name:al%2A&include_docs=true&limit=25&skip=0"
        );
    }

    #[test]
    fn secure_and_bookmark() {
        let options = SearchOptions::new("search.example.com/", "db", "idx/all", "x")
            .unwrap()
            .secure(true)
            .limit(10)
            .skip(20)
            .bookmark("g1AAAA");

        assert_eq!(
            options.url(),
            "https://search.example.com/db/_design/idx/all?q=x&include_docs=false&limit=10&skip=20&bookmark=\"g1AAAA\""
        );

        let explicit = SearchOptions::new("http://other:80", "db", "idx", "x")
            .unwrap()
            .secure(true);
        assert!(explicit.url().starts_with("http://other:80/db/"));
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(SearchOptions::new("", "db", "idx", "q").is_err());
        assert!(SearchOptions::new("host", "db", "idx", "").is_err());
    }

    #[test]
    fn converts_rows() {
        #[derive(Debug, Clone, PartialEq, Deserialize)]
        struct Hit {
            name: String,
        }

        let response: SearchResponse = serde_json::from_value(json!({
            "q": "name:a",
            "fetch_duration": 1,
            "total_rows": 2,
            "limit": 25,
            "search_duration": 2,
            "skip": 0,
            "rows": [
                { "score": 1.5, "id": "a", "doc": { "name": "a" } },
                { "score": 0.5, "id": "b" }
            ]
        }))
        .unwrap();

        let row = response.rows[0].clone();
        let mapped = row.convert_document(&serde_mapper::<Hit>()).unwrap();
        assert_eq!(mapped.doc, Some(Hit { name: "a".into() }));
        assert_eq!(row.doc, Some(json!({ "name": "a" })));

        let converted = response.convert(&PassThrough).unwrap();
        assert_eq!(converted.rows.len(), 2);
        assert_eq!(converted.rows[1].doc, None);
        assert_eq!(converted.total_rows, 2);
    }
}
