//! Conversion of raw store documents into caller types.
//!
//! Every repository read takes an [`EntityMapper`] for the duration of that call. There is no
//! global registry; the mapper handed in decides what a raw JSON document becomes.

use serde::de::DeserializeOwned;
use serde_json::{Value, from_value};
use std::marker::PhantomData;

use crate::error::DbResult;

/// Turns a raw document into a caller-side value.
pub trait EntityMapper: Send + Sync {
    type Output: Send;

    fn map_to_entity(&self, source: Value) -> DbResult<Self::Output>;

    /// Whether this mapper hands the source back untouched.
    fn is_pass_through(&self) -> bool {
        false
    }
}

impl<M: EntityMapper + ?Sized> EntityMapper for &M {
    type Output = M::Output;

    fn map_to_entity(&self, source: Value) -> DbResult<Self::Output> {
        (**self).map_to_entity(source)
    }

    fn is_pass_through(&self) -> bool {
        (**self).is_pass_through()
    }
}

/// Returns documents as raw JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl EntityMapper for PassThrough {
    type Output = Value;

    fn map_to_entity(&self, source: Value) -> DbResult<Value> {
        Ok(source)
    }

    fn is_pass_through(&self) -> bool {
        true
    }
}

/// Deserializes documents into `T`.
#[derive(Debug)]
pub struct SerdeMapper<T>(PhantomData<fn() -> T>);

impl<T> SerdeMapper<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeMapper<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SerdeMapper<T> {}

impl<T: DeserializeOwned + Send> EntityMapper for SerdeMapper<T> {
    type Output = T;

    fn map_to_entity(&self, source: Value) -> DbResult<T> {
        Ok(from_value(source)?)
    }
}

/// Shorthand for a [`SerdeMapper`] targeting `T`.
pub fn serde_mapper<T: DeserializeOwned + Send>() -> SerdeMapper<T> {
    SerdeMapper::new()
}

/// Adapts a closure into a mapper.
#[derive(Debug, Clone, Copy)]
pub struct MapFn<F>(F);

impl<F, T> EntityMapper for MapFn<F>
where
    F: Fn(Value) -> DbResult<T> + Send + Sync,
    T: Send,
{
    type Output = T;

    fn map_to_entity(&self, source: Value) -> DbResult<T> {
        (self.0)(source)
    }
}

/// Wraps `f` as a mapper.
pub fn map_with<F, T>(f: F) -> MapFn<F>
where
    F: Fn(Value) -> DbResult<T> + Send + Sync,
    T: Send,
{
    MapFn(f)
}

/// Maps a single document.
pub fn map_entity<M: EntityMapper>(mapper: &M, source: Value) -> DbResult<M::Output> {
    mapper.map_to_entity(source)
}

/// Maps every document, keeping their order.
pub fn map_entities<M: EntityMapper>(mapper: &M, sources: Vec<Value>) -> DbResult<Vec<M::Output>> {
    sources
        .into_iter()
        .map(|source| mapper.map_to_entity(source))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, ErrorKind};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Tag {
        name: String,
    }

    #[test]
    fn pass_through_keeps_source() {
        let source = json!({ "_id": "a", "nested": { "x": [1, 2] } });
        assert!(PassThrough.is_pass_through());
        assert_eq!(map_entity(&PassThrough, source.clone()).unwrap(), source);
    }

    #[test]
    fn entities_keep_order() {
        let sources = vec![json!({ "name": "b" }), json!({ "name": "a" }), json!({ "name": "c" })];
        let tags = map_entities(&serde_mapper::<Tag>(), sources).unwrap();

        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
        assert!(map_entities(&PassThrough, Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn closure_mapper() {
        let upper = map_with(|source: Value| {
            source["name"]
                .as_str()
                .map(str::to_uppercase)
                .ok_or_else(|| DbError::invalid_argument("missing name"))
        });

        assert_eq!(map_entity(&upper, json!({ "name": "x" })).unwrap(), "X");
        assert_eq!(
            map_entity(&upper, json!({})).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn serde_failures_are_serialization_errors() {
        let err = map_entity(&serde_mapper::<Tag>(), json!({ "name": 1 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
