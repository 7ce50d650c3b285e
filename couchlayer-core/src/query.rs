//! Query construction and fetch options.
//!
//! A [`Query`] is an immutable snapshot of a [`Selector`] plus an optional field projection, sort
//! order, row limit and index hint. Its serde form is the store's `_find` request body:
//!
//! ```ignore
//! use couchlayer::query::{Query, SortDirection};
//! use couchlayer::selector::Selector;
//!
//! let query = Query::builder()
//!     .selector(Selector::create_with_property("type", "user")?)
//!     .fields(["_id", "email"])
//!     .sort("email", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//!
//! // {"selector":{"type":"user"},"fields":["_id","email"],"sort":[{"email":"asc"}],"limit":10}
//! ```
//!
//! [`FetchOptions`] drive key-range reads over `_all_docs` and views.

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use crate::selector::Selector;

/// Upper bound of the collation order, appended to a key to build a prefix range.
pub const WILD_CARD: char = '\u{fff0}';

/// Appends the high collation sentinel to `value`.
///
/// Used as an `endkey`, `apply_wild_card("user:")` covers every key starting with `user:`.
pub fn apply_wild_card(value: &str) -> String {
    let mut key = String::with_capacity(value.len() + WILD_CARD.len_utf8());
    key.push_str(value);
    key.push(WILD_CARD);
    key
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort clause for one field. Serializes as `{"field": "asc"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl AsRef<str>, direction: SortDirection) -> Self {
        Self { field: field.as_ref().to_string(), direction }
    }

    pub fn asc(field: impl AsRef<str>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl AsRef<str>) -> Self {
        Self::new(field, SortDirection::Desc)
    }

    /// Resolves a field reference to the name used in a sort clause.
    pub fn create_sort_value(field: impl AsRef<str>) -> String {
        field.as_ref().to_string()
    }

    /// Builds an ascending sort over `fields`, keeping their order.
    pub fn create_sort_array<F: AsRef<str>>(fields: impl IntoIterator<Item = F>) -> Vec<Sort> {
        fields
            .into_iter()
            .map(Sort::asc)
            .collect()
    }
}

impl Serialize for Sort {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, self.direction.as_str())?;
        map.end()
    }
}

/// A structured selector query.
///
/// Use [`QueryBuilder`] for construction. A `limit` of `None` means unbounded; the builder never
/// stores a zero limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Query {
    pub selector: Selector,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_index: Option<String>,
}

impl Query {
    pub fn new(selector: Selector) -> Self {
        Query { selector, ..Default::default() }
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// The row cap. `None` means unbounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl From<Selector> for Query {
    fn from(selector: Selector) -> Self {
        Query::new(selector)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.query.selector = selector;
        self
    }

    /// Restricts the returned documents to `fields`.
    pub fn fields<F: AsRef<str>>(mut self, fields: impl IntoIterator<Item = F>) -> Self {
        self.query.fields = fields
            .into_iter()
            .map(|f| f.as_ref().to_string())
            .collect();
        self
    }

    /// Appends a sort clause. Clauses apply in the order they are added.
    pub fn sort(mut self, field: impl AsRef<str>, direction: SortDirection) -> Self {
        self.query
            .sort
            .push(Sort::new(field, direction));
        self
    }

    pub fn sorts(mut self, sorts: impl IntoIterator<Item = Sort>) -> Self {
        self.query.sort.extend(sorts);
        self
    }

    /// Caps the number of returned rows. Values below 1 leave the query unbounded.
    pub fn limit(mut self, limit: i64) -> Self {
        self.query.limit = usize::try_from(limit)
            .ok()
            .filter(|l| *l > 0);
        self
    }

    pub fn use_index(mut self, index: impl Into<String>) -> Self {
        self.query.use_index = Some(index.into());
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Options for key-range reads over `_all_docs` and views.
///
/// Only set options are sent to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchOptions {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_docs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startkey: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endkey: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub descending: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> FetchOptionsBuilder {
        FetchOptionsBuilder::default()
    }

    /// Options covering every key that starts with `prefix`.
    pub fn prefix(prefix: &str) -> Self {
        Self::builder()
            .startkey(prefix)
            .endkey(apply_wild_card(prefix))
            .build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptionsBuilder {
    options: FetchOptions,
}

impl FetchOptionsBuilder {
    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.options.include_docs = include_docs;
        self
    }

    /// Inclusive lower key bound.
    pub fn startkey(mut self, key: impl Into<Value>) -> Self {
        self.options.startkey = Some(key.into());
        self
    }

    /// Inclusive upper key bound.
    pub fn endkey(mut self, key: impl Into<Value>) -> Self {
        self.options.endkey = Some(key.into());
        self
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.options.key = Some(key.into());
        self
    }

    pub fn keys<K: Into<Value>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.options.keys = Some(
            keys.into_iter()
                .map(Into::into)
                .collect(),
        );
        self
    }

    /// Values below 1 leave the read unbounded.
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = usize::try_from(limit)
            .ok()
            .filter(|l| *l > 0);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = (skip > 0).then_some(skip);
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.options.descending = descending;
        self
    }

    pub fn build(self) -> FetchOptions {
        self.options
    }
}
