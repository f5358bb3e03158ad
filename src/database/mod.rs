//! Realtime Database access.
//!
//! The console only needs a small keyed-store surface: read a whole
//! collection, mint a key, write a node, merge fields into a node, and delete
//! a node. [`KeyedStore`] captures that surface; [`FirebaseDatabase`]
//! implements it over the REST API and [`MemoryStore`] implements it
//! in-process.
//!
//! # Consistency
//!
//! Reads are one-shot. Nothing here listens for remote changes, so data read
//! earlier may be stale by the time it is used.

pub mod memory;
pub mod push_id;
pub mod reference;

#[cfg(test)]
mod tests;

pub use self::memory::MemoryStore;
pub use self::reference::{DatabasePath, DatabaseReference};

use self::push_id::PushIdGenerator;
use crate::core::parse_error_response;
use async_trait::async_trait;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use url::Url;

/// Errors that can occur during database operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the database, e.g. permission denied.
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    /// A collection read found a scalar where children were expected.
    #[error("Unexpected value at '{0}': expected a collection")]
    UnexpectedShape(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A hierarchical key/value store addressed by slash-delimited paths.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Reads all children of `path`, in the store's enumeration order.
    /// Returns `None` when nothing is stored there.
    async fn fetch_all(&self, path: &DatabasePath) -> Result<Option<Map<String, Value>>, StoreError>;

    /// Mints a new unique child key for `path` without writing anything.
    fn generate_key(&self, path: &DatabasePath) -> Result<String, StoreError>;

    /// Replaces the node at `path` with `value`.
    async fn write_full(&self, path: &DatabasePath, value: &Value) -> Result<(), StoreError>;

    /// Merges `fields` into the node at `path`. A `null` field deletes that child.
    async fn write_partial(&self, path: &DatabasePath, fields: &Map<String, Value>) -> Result<(), StoreError>;

    /// Removes the node at `path`. Removing a missing node succeeds.
    async fn delete_at(&self, path: &DatabasePath) -> Result<(), StoreError>;

    /// A reference to `path` in this store.
    fn reference(&self, path: DatabasePath) -> DatabaseReference<'_, Self>
    where
        Self: Sized,
    {
        DatabaseReference::new(self, path)
    }
}

#[async_trait]
impl<T: KeyedStore + ?Sized> KeyedStore for Arc<T> {
    async fn fetch_all(&self, path: &DatabasePath) -> Result<Option<Map<String, Value>>, StoreError> {
        (**self).fetch_all(path).await
    }

    fn generate_key(&self, path: &DatabasePath) -> Result<String, StoreError> {
        (**self).generate_key(path)
    }

    async fn write_full(&self, path: &DatabasePath, value: &Value) -> Result<(), StoreError> {
        (**self).write_full(path, value).await
    }

    async fn write_partial(&self, path: &DatabasePath, fields: &Map<String, Value>) -> Result<(), StoreError> {
        (**self).write_partial(path, fields).await
    }

    async fn delete_at(&self, path: &DatabasePath) -> Result<(), StoreError> {
        (**self).delete_at(path).await
    }
}

/// Turns a node read from the store into its children.
///
/// Arrays come back when every child key is a small integer; their indices
/// become keys and holes are skipped.
pub(crate) fn into_children(path: &DatabasePath, value: Value) -> Result<Option<Map<String, Value>>, StoreError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .enumerate()
                .filter(|(_, item)| !item.is_null())
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
        )),
        _ => Err(StoreError::UnexpectedShape(path.to_string())),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Client for the Realtime Database REST API.
pub struct FirebaseDatabase {
    client: ClientWithMiddleware,
    base_url: Url,
    keys: Mutex<PushIdGenerator>,
}

impl FirebaseDatabase {
    /// Creates a client for the database at `database_url`
    /// (e.g. `https://my-project-default-rtdb.firebaseio.com`).
    ///
    /// Authentication is whatever middleware `client` carries; see
    /// `crate::core::middleware`.
    pub fn new(client: ClientWithMiddleware, database_url: &str) -> Result<Self, StoreError> {
        let base_url = Url::parse(database_url.trim_end_matches('/'))
            .map_err(|e| StoreError::InvalidPath(format!("bad database URL '{}': {}", database_url, e)))?;
        Ok(Self {
            client,
            base_url,
            keys: Mutex::new(PushIdGenerator::new()),
        })
    }

    /// Gets a reference to the location at `path` (e.g. "products/p1").
    pub fn reference_at(&self, path: &str) -> Result<DatabaseReference<'_, Self>, StoreError> {
        Ok(self.reference(DatabasePath::parse(path)?))
    }

    fn node_url(&self, path: &DatabasePath) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidPath(format!("'{}' cannot be a base URL", self.base_url)))?;
            segments.pop_if_empty();
            match path.segments().split_last() {
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{}.json", last));
                }
                None => {
                    segments.push(".json");
                }
            }
        }
        Ok(url)
    }

    /// URL for writes; `print=silent` skips echoing the written data back.
    fn write_url(&self, path: &DatabasePath) -> Result<Url, StoreError> {
        let mut url = self.node_url(path)?;
        url.query_pairs_mut().append_pair("print", "silent");
        Ok(url)
    }

    async fn check(response: reqwest::Response, default_msg: &str) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = parse_error_response(response, default_msg).await;
        Err(StoreError::ApiError { status, message })
    }
}

#[async_trait]
impl KeyedStore for FirebaseDatabase {
    async fn fetch_all(&self, path: &DatabasePath) -> Result<Option<Map<String, Value>>, StoreError> {
        let url = self.node_url(path)?;
        tracing::debug!(%path, "GET");

        let response = self.client.get(url).send().await?;
        let response = Self::check(response, "Read failed").await?;

        let value: Value = response.json().await?;
        into_children(path, value)
    }

    fn generate_key(&self, _path: &DatabasePath) -> Result<String, StoreError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| StoreError::Unavailable("push key generator poisoned".into()))?;
        Ok(keys.generate(now_millis()))
    }

    async fn write_full(&self, path: &DatabasePath, value: &Value) -> Result<(), StoreError> {
        let url = self.write_url(path)?;
        tracing::debug!(%path, "PUT");

        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(value)?)
            .send()
            .await?;
        Self::check(response, "Write failed").await?;
        Ok(())
    }

    async fn write_partial(&self, path: &DatabasePath, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let url = self.write_url(path)?;
        tracing::debug!(%path, fields = fields.len(), "PATCH");

        let response = self
            .client
            .patch(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(fields)?)
            .send()
            .await?;
        Self::check(response, "Update failed").await?;
        Ok(())
    }

    async fn delete_at(&self, path: &DatabasePath) -> Result<(), StoreError> {
        let url = self.write_url(path)?;
        tracing::debug!(%path, "DELETE");

        let response = self.client.delete(url).send().await?;
        Self::check(response, "Delete failed").await?;
        Ok(())
    }
}
