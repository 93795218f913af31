//! JSON-directory store backend
//!
//! One directory per collection, one file per record. File names are the
//! hex-encoded record id so arbitrary ids (build versions, class names) are
//! safe on every filesystem. Writes go to a temporary file that is renamed
//! over the target, so readers never observe a half-written record.

use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary: Option<String>,
    value: Value,
}

/// Store persisting records as JSON files under a root directory
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Open (and create if missing) a store rooted at `root`
    ///
    /// # Errors
    /// Returns error if the root directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "Opened JSON directory store");
        Ok(Self { root })
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(hex::encode(collection))
    }

    fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.{EXTENSION}", hex::encode(id)))
    }

    async fn read_entry(&self, collection: &str, path: &Path) -> StoreResult<Option<FileEntry>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            StoreError::corrupted(collection, path.display().to_string(), e.to_string())
        })
    }

    /// Every entry of a collection with its file path, ordered by id
    async fn scan(&self, collection: &str) -> StoreResult<Vec<(PathBuf, FileEntry)>> {
        let dir = self.collection_dir(collection);
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                paths.push(path);
            }
        }
        // hex preserves byte order, so sorting file names sorts ids
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(entry) = self.read_entry(collection, &path).await? {
                entries.push((path, entry));
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl Store for JsonDirStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        let path = self.record_path(collection, id);
        Ok(self.read_entry(collection, &path).await?.map(|e| e.value))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        secondary: Option<&str>,
        value: Value,
    ) -> StoreResult<()> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir).await?;

        let entry = FileEntry {
            secondary: secondary.map(str::to_string),
            value,
        };
        let bytes = serde_json::to_vec(&entry)?;

        let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, &bytes).await?;
        if let Err(e) = fs::rename(&tmp, self.record_path(collection, id)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn find_by(&self, collection: &str, secondary: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .scan(collection)
            .await?
            .into_iter()
            .filter(|(_, e)| e.secondary.as_deref() == Some(secondary))
            .map(|(_, e)| e.value)
            .collect())
    }

    async fn all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .scan(collection)
            .await?
            .into_iter()
            .map(|(_, e)| e.value)
            .collect())
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<bool> {
        match fs::remove_file(self.record_path(collection, id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_by(&self, collection: &str, secondary: &str) -> StoreResult<usize> {
        let mut removed = 0;
        for (path, entry) in self.scan(collection).await? {
            if entry.secondary.as_deref() == Some(secondary) {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }
}
