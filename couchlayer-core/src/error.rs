//! Error types and result types for repository operations.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is what a [`StoreClient`](crate::client::StoreClient) reports. It mirrors the
//!   `{error, reason}` body a CouchDB server returns, plus the HTTP status when there is one.
//! - [`DbError`] is what the repository hands back to callers. It always carries an [`ErrorKind`]
//!   and a reason, and keeps the underlying [`StoreError`] as its source when the failure came
//!   from the store.
//!
//! Use [`DbResult<T>`] as the return type for fallible operations.

use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

/// The category of a [`DbError`].
///
/// Callers branch on the kind instead of inspecting concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad caller input. No I/O was attempted.
    InvalidArgument,
    /// A selector property was assigned a literal while holding an operator object, or the reverse.
    IncompatibleAssignment,
    /// A write was attempted on an entity that has not been persisted yet.
    EntityTransient,
    /// A selector property that was expected to exist is absent.
    NotFound,
    /// Creating or updating a document failed.
    SaveFailed,
    /// Removing a document failed.
    DeleteFailed,
    /// Fetching one or more documents failed.
    FetchFailed,
    /// Executing a selector, view or full-text query failed.
    QueryFailed,
    /// A batch write failed as a whole.
    BulkWriteFailed,
    /// Serializing or deserializing a document failed.
    Serialization,
    /// The store returned a non-ok acknowledgement without further detail.
    Unknown,
}

impl ErrorKind {
    /// Returns the stable string form used as the `error` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::IncompatibleAssignment => "incompatible_assignment",
            ErrorKind::EntityTransient => "entity_transient",
            ErrorKind::NotFound => "not_found",
            ErrorKind::SaveFailed => "save_failed",
            ErrorKind::DeleteFailed => "delete_failed",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::QueryFailed => "query_failed",
            ErrorKind::BulkWriteFailed => "bulk_write_failed",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a store client.
///
/// The shape matches the JSON error bodies a CouchDB server sends
/// (`{"error": "conflict", "reason": "Document update conflict."}`), so it can be
/// deserialized directly from a response. `status` is filled in by transports that have one.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{error}: {reason}")]
pub struct StoreError {
    /// HTTP status code, when the failure came from an HTTP response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Short error code, e.g. `not_found`, `conflict`, `too_many_requests`.
    pub error: String,
    /// Human readable explanation.
    #[serde(default)]
    pub reason: String,
}

impl StoreError {
    pub const NOT_FOUND: &'static str = "not_found";
    pub const CONFLICT: &'static str = "conflict";
    pub const TOO_MANY_REQUESTS: &'static str = "too_many_requests";
    pub const BAD_REQUEST: &'static str = "bad_request";
    pub const INTERNAL: &'static str = "internal_server_error";
    pub const TRANSPORT: &'static str = "transport";

    /// Creates a store error without a status code.
    pub fn new(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { status: None, error: error.into(), reason: reason.into() }
    }

    /// Attaches an HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(Self::NOT_FOUND, reason).with_status(404)
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(Self::CONFLICT, reason).with_status(409)
    }

    pub fn too_many_requests(reason: impl Into<String>) -> Self {
        Self::new(Self::TOO_MANY_REQUESTS, reason).with_status(429)
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(Self::BAD_REQUEST, reason).with_status(400)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, reason).with_status(500)
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::new(Self::TRANSPORT, reason)
    }

    /// Whether the request may succeed if re-issued unchanged.
    ///
    /// Rate limiting (`too_many_requests` or 429) and server errors (500) are transient.
    pub fn is_transient(&self) -> bool {
        self.error == Self::TOO_MANY_REQUESTS || matches!(self.status, Some(429) | Some(500))
    }

    pub fn is_not_found(&self) -> bool {
        self.error == Self::NOT_FOUND || self.status == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.error == Self::CONFLICT || self.status == Some(409)
    }
}

/// Error returned by every repository operation.
///
/// A `DbError` is a structured `{error, reason}` value: [`error`](DbError::error) is the
/// string form of the [`ErrorKind`], and [`reason`](DbError::reason) explains what happened.
/// When the failure originated in the store, the [`StoreError`] is kept as the source.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {reason}")]
pub struct DbError {
    kind: ErrorKind,
    reason: String,
    #[source]
    cause: Option<StoreError>,
}

impl DbError {
    /// Builds an error of the given kind. An empty reason falls back to the kind itself.
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.is_empty() { kind.as_str().to_string() } else { reason };

        Self { kind, reason, cause: None }
    }

    /// Keeps `cause` as the source of this error.
    pub fn with_cause(mut self, cause: StoreError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, reason)
    }

    pub fn incompatible_assignment(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompatibleAssignment, reason)
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, reason)
    }

    pub fn unknown() -> Self {
        Self::new(ErrorKind::Unknown, "Unknown error occurred")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The `error` field of the `{error, reason}` pair.
    pub fn error(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The store error this failure wraps, if any.
    pub fn cause(&self) -> Option<&StoreError> {
        self.cause.as_ref()
    }
}

impl Serialize for DbError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DbError", 2)?;
        state.serialize_field("error", self.error())?;
        state.serialize_field("reason", &self.reason)?;
        state.end()
    }
}

/// A specialized `Result` type for repository operations.
pub type DbResult<T> = Result<T, DbError>;

impl From<SerdeJsonError> for DbError {
    fn from(err: SerdeJsonError) -> Self {
        DbError::new(ErrorKind::Serialization, err.to_string())
    }
}
