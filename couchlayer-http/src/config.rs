//! Connection settings for a CouchDB server.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use couchlayer_core::{
    client::normalize_database_name,
    error::{DbError, DbResult},
};

/// Request timeout applied when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Where and how to reach a database.
///
/// Deserializable so it can be loaded from any configuration source:
///
/// ```toml
/// [couchdb]
/// server = "http://localhost:5984"
/// database = "app"
/// user = "admin"
/// password = "secret"
/// timeout_ms = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouchDbConfig {
    /// Server address. `http://` is assumed when no scheme is given.
    pub server: String,
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl CouchDbConfig {
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            user: None,
            password: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The database name as the server expects it.
    pub fn database_name(&self) -> String {
        normalize_database_name(&self.database)
    }

    /// The user and password, when both are set.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` when only one of them is set.
    pub fn credentials(&self) -> DbResult<Option<(String, String)>> {
        let user = self.user.as_deref().filter(|u| !u.is_empty());
        let password = self.password.as_deref().filter(|p| !p.is_empty());

        match (user, password) {
            (Some(user), Some(password)) => Ok(Some((user.to_string(), password.to_string()))),
            (None, None) => Ok(None),
            _ => Err(DbError::invalid_argument("Both user and password must be supplied, or neither")),
        }
    }

    /// The URL of the database itself.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for an empty server or database, or an unparsable address.
    pub fn database_url(&self) -> DbResult<Url> {
        let database = self.database_name();
        if self.server.is_empty() || database.is_empty() {
            return Err(DbError::invalid_argument("A server and a database name are required"));
        }

        let server = if self.server.contains("://") {
            self.server.clone()
        } else {
            format!("http://{}", self.server)
        };

        let mut url = Url::parse(&server)
            .map_err(|e| DbError::invalid_argument(format!("Invalid server address {server}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| DbError::invalid_argument(format!("Invalid server address {server}")))?
            .pop_if_empty()
            .push(&database);

        Ok(url)
    }
}
