//! Entity identity and optimistic-concurrency model.
//!
//! Every persisted unit carries an [`EntityMeta`]: the document id, the revision token assigned by
//! the store, a type discriminator and a last-modified timestamp. Concrete entity types embed the
//! meta (usually with `#[serde(flatten)]`) and implement [`Entity`] to expose it.
//!
//! # Transience
//!
//! An entity is *transient* when it lacks either an id or a revision. Only persisted
//! (non-transient) entities can be updated through the revision-checked save path.
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
//!     fn meta(&self) -> &EntityMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
//! }
//!
//! let user = User {
//!     meta: EntityMeta::with_identifiers("user", ["Alice@Example.com"])?,
//!     email: "alice@example.com".into(),
//! };
//! assert_eq!(user.id(), "user:alice@example.com");
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::{DbError, DbResult};

/// Separator placed between id fragments.
pub const ID_SEPARATOR: &str = ":";

/// Builds a deterministic id from identifier fragments.
///
/// Empty fragments are skipped; the rest are joined with `:` and lower-cased.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument) when no
/// non-empty fragment is supplied.
pub fn generate_id<I, S>(fragments: I) -> DbResult<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let fragments = fragments
        .into_iter()
        .filter(|f| !f.as_ref().is_empty())
        .map(|f| f.as_ref().to_lowercase())
        .collect::<Vec<_>>();

    if fragments.is_empty() {
        return Err(DbError::invalid_argument("Unable to create id: no identifiers supplied"));
    }

    Ok(fragments.join(ID_SEPARATOR))
}

/// Identity and bookkeeping fields shared by every entity.
///
/// Serializes to the store's reserved field names (`_id`, `_rev`) plus `type` and `timestamp`.
/// Empty ids and revisions are omitted so a new document can be posted for a store-assigned id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(rename = "timestamp", default)]
    pub last_modified: i64,
}

impl EntityMeta {
    /// Creates the meta for a new entity whose id will be assigned by the store.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if `entity_type` is empty.
    pub fn new(entity_type: impl Into<String>) -> DbResult<Self> {
        let entity_type = entity_type.into();
        if entity_type.is_empty() {
            return Err(DbError::invalid_argument("Cannot create an entity without a type"));
        }

        let mut meta = Self { entity_type, ..Self::default() };
        meta.touch();

        Ok(meta)
    }

    /// Creates the meta for a new entity with an id derived from its type and `identifiers`.
    ///
    /// The id is `type:identifier:...`, lower-cased.
    pub fn with_identifiers<I, S>(entity_type: impl Into<String>, identifiers: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut meta = Self::new(entity_type)?;
        meta.id = generate_id(
            std::iter::once(meta.entity_type.clone())
                .chain(identifiers.into_iter().map(|s| s.as_ref().to_string())),
        )?;

        Ok(meta)
    }

    /// Creates the meta for a new entity with a caller-built id that is used verbatim.
    pub fn with_id(entity_type: impl Into<String>, id: impl Into<String>) -> DbResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DbError::invalid_argument("A pre-built id cannot be empty"));
        }

        let mut meta = Self::new(entity_type)?;
        meta.id = id;

        Ok(meta)
    }

    /// True iff the entity lacks an id or a revision.
    pub fn is_transient(&self) -> bool {
        self.id.is_empty() || self.revision.is_empty()
    }

    pub fn is_persisted(&self) -> bool {
        !self.is_transient()
    }

    pub fn has_type(&self) -> bool {
        !self.entity_type.is_empty()
    }

    /// Stamps `last_modified` with the current time in milliseconds.
    ///
    /// The value never goes backwards for a given entity, even when two updates land within the
    /// same millisecond or the clock steps back.
    pub fn touch(&mut self) {
        let now = Utc::now().timestamp_millis();
        self.last_modified = now.max(self.last_modified.saturating_add(1));
    }
}

/// Core trait that every persisted type implements.
///
/// Implementors embed an [`EntityMeta`] and hand out references to it. The optional
/// [`validate`](Entity::validate) hook runs right before every write; returning an error aborts the
/// write before any I/O happens.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Checks the entity before it is written.
    fn validate(&self) -> DbResult<()> {
        Ok(())
    }
}

/// Convenience accessors and conversions for every [`Entity`].
pub trait EntityExt: Entity {
    fn id(&self) -> &str;

    fn revision(&self) -> &str;

    fn entity_type(&self) -> &str;

    fn last_modified(&self) -> i64;

    fn has_type(&self) -> bool;

    fn is_transient(&self) -> bool;

    fn is_persisted(&self) -> bool;

    /// Marks the entity as updated now.
    fn touch(&mut self);

    /// Converts this entity to the JSON document that is sent to the store.
    fn to_json(&self) -> DbResult<Value>;

    /// Builds an entity from a raw document.
    fn from_json(value: Value) -> DbResult<Self>;
}

impl<E: Entity> EntityExt for E {
    fn id(&self) -> &str {
        &self.meta().id
    }

    fn revision(&self) -> &str {
        &self.meta().revision
    }

    fn entity_type(&self) -> &str {
        &self.meta().entity_type
    }

    fn last_modified(&self) -> i64 {
        self.meta().last_modified
    }

    fn has_type(&self) -> bool {
        self.meta().has_type()
    }

    fn is_transient(&self) -> bool {
        self.meta().is_transient()
    }

    fn is_persisted(&self) -> bool {
        self.meta().is_persisted()
    }

    fn touch(&mut self) {
        self.meta_mut().touch()
    }

    fn to_json(&self) -> DbResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DbResult<Self> {
        Ok(from_value(value)?)
    }
}
