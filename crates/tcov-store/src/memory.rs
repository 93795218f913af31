//! In-memory store backend

use crate::error::StoreResult;
use crate::store::Store;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Entry {
    secondary: Option<String>,
    value: Value,
}

/// Store keeping every collection in a concurrent map
///
/// Collections are independent shards; writes to different collections
/// never contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, BTreeMap<String, Entry>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }

    /// Whether a collection holds no records
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).map(|e| e.value.clone())))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        secondary: Option<&str>,
        value: Value,
    ) -> StoreResult<()> {
        self.collections.entry(collection.to_string()).or_default().insert(
            id.to_string(),
            Entry {
                secondary: secondary.map(str::to_string),
                value,
            },
        );
        Ok(())
    }

    async fn find_by(&self, collection: &str, secondary: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|e| e.secondary.as_deref() == Some(secondary))
                    .map(|e| e.value.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .collections
            .get(collection)
            .map(|c| c.values().map(|e| e.value.clone()).collect())
            .unwrap_or_default())
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<bool> {
        Ok(self
            .collections
            .get_mut(collection)
            .is_some_and(|mut c| c.remove(id).is_some()))
    }

    async fn remove_by(&self, collection: &str, secondary: &str) -> StoreResult<usize> {
        let Some(mut c) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = c.len();
        c.retain(|_, e| e.secondary.as_deref() != Some(secondary));
        Ok(before - c.len())
    }
}
