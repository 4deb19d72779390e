// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Directory-backed bucket (`file:///path`).
//!
//! Writes go to a hidden sibling file first and are renamed into place, so a
//! reader never sees a partially written object and a failed write leaves
//! the previous object untouched.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::{BlobReader, BlobStore, Result, StoreError, validate_key};

/// Bucket rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    locator: String,
    root: PathBuf,
}

impl FileBlobStore {
    /// Open a `file://` locator. The directory must already exist.
    pub async fn open(locator: &str, url: &Url) -> Result<Self> {
        let root = url
            .to_file_path()
            .map_err(|_| StoreError::InvalidLocator(locator.to_string()))?;
        Self::with_root(locator, root).await
    }

    /// Open a bucket directly from a directory path.
    pub async fn with_root(locator: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let metadata = tokio::fs::metadata(&root).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::InvalidLocator(format!("{locator}: directory does not exist"))
            } else {
                StoreError::Io(e)
            }
        })?;
        if !metadata.is_dir() {
            return Err(StoreError::InvalidLocator(format!(
                "{locator}: not a directory"
            )));
        }

        Ok(Self {
            locator: locator.to_string(),
            root,
        })
    }

    /// Root directory of the bucket.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn reader(&self, key: &str) -> Result<BlobReader> {
        let path = self.object_path(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            warn!(path = %path.display(), error = %e, "Failed to move object into place");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = data.len(), "Object written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> FileBlobStore {
        FileBlobStore::with_root("file:///test", dir.path())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.write("npm/left-pad/results.json", b"{}").await.unwrap();

        assert_eq!(store.read("npm/left-pad/results.json").await.unwrap(), b"{}");
        assert!(dir.path().join("npm/left-pad/results.json").exists());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.write("a/obj", b"first").await.unwrap();
        store.write("a/obj", b"second").await.unwrap();

        assert_eq!(store.read("a/obj").await.unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("a"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let result = store.reader("nope").await;
        assert!(matches!(result, Err(StoreError::NotFound(k)) if k == "nope"));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let result = store.write("../outside", b"x").await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_missing_root() {
        let result = FileBlobStore::with_root("file:///nope", "/nonexistent/pkgsift/root").await;
        assert!(matches!(result, Err(StoreError::InvalidLocator(_))));
    }
}
