//! Store contract and typed client
//!
//! Backends implement [`Store`] over raw JSON values grouped in collections.
//! Callers go through [`StoreClient`], which maps [`Record`] types onto
//! collections and handles encoding.

use crate::error::StoreResult;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Raw persistence contract
///
/// Every write is a full-record upsert. There are no multi-record
/// transactions; a single `put` is atomic from the caller's point of view.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load a record by id
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>>;

    /// Insert or replace a record, indexing it under `secondary` when given
    async fn put(
        &self,
        collection: &str,
        id: &str,
        secondary: Option<&str>,
        value: Value,
    ) -> StoreResult<()>;

    /// Load every record indexed under `secondary`, ordered by id
    async fn find_by(&self, collection: &str, secondary: &str) -> StoreResult<Vec<Value>>;

    /// Load every record of a collection, ordered by id
    async fn all(&self, collection: &str) -> StoreResult<Vec<Value>>;

    /// Remove a record; returns whether it existed
    async fn remove(&self, collection: &str, id: &str) -> StoreResult<bool>;

    /// Remove every record indexed under `secondary`; returns how many were removed
    async fn remove_by(&self, collection: &str, secondary: &str) -> StoreResult<usize>;
}

/// A type persisted through [`StoreClient`]
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Collection holding records of this type
    const COLLECTION: &'static str;

    /// Primary id
    fn id(&self) -> String;

    /// Secondary index key, if the record is looked up by one
    fn secondary_key(&self) -> Option<String> {
        None
    }
}

/// Typed, cloneable handle over a shared [`Store`]
#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<dyn Store>,
}

impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient").finish_non_exhaustive()
    }
}

impl StoreClient {
    /// Wrap a backend
    #[inline]
    #[must_use]
    pub fn new(store: impl Store + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wrap an already shared backend
    #[inline]
    #[must_use]
    pub fn from_arc(store: Arc<dyn Store>) -> Self {
        Self { inner: store }
    }

    /// Load a record by id
    ///
    /// # Errors
    /// Returns error if the backend fails or the stored value does not decode.
    pub async fn find_by_id<R: Record>(&self, id: &str) -> StoreResult<Option<R>> {
        match self.inner.get(R::COLLECTION, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a record
    ///
    /// # Errors
    /// Returns error if encoding or the backend write fails.
    pub async fn store<R: Record>(&self, record: &R) -> StoreResult<()> {
        let value = serde_json::to_value(record)?;
        let secondary = record.secondary_key();
        self.inner
            .put(R::COLLECTION, &record.id(), secondary.as_deref(), value)
            .await
    }

    /// Load records indexed under a secondary key
    ///
    /// # Errors
    /// Returns error if the backend fails or a stored value does not decode.
    pub async fn find_by<R: Record>(&self, secondary: &str) -> StoreResult<Vec<R>> {
        decode_all(self.inner.find_by(R::COLLECTION, secondary).await?)
    }

    /// Load every record of a type
    ///
    /// # Errors
    /// Returns error if the backend fails or a stored value does not decode.
    pub async fn all<R: Record>(&self) -> StoreResult<Vec<R>> {
        decode_all(self.inner.all(R::COLLECTION).await?)
    }

    /// Delete a record by id
    ///
    /// # Errors
    /// Returns error if the backend fails.
    pub async fn delete<R: Record>(&self, id: &str) -> StoreResult<bool> {
        self.inner.remove(R::COLLECTION, id).await
    }

    /// Delete records indexed under a secondary key
    ///
    /// # Errors
    /// Returns error if the backend fails.
    pub async fn delete_by<R: Record>(&self, secondary: &str) -> StoreResult<usize> {
        self.inner.remove_by(R::COLLECTION, secondary).await
    }
}

fn decode_all<R: Record>(values: Vec<Value>) -> StoreResult<Vec<R>> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(Into::into))
        .collect()
}
