// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blob stores for packages and results.
//!
//! Stores are addressed by locator strings:
//!
//! | Scheme | Backend |
//! |--------|---------|
//! | `file:///dir` | [`FileBlobStore`], a local directory |
//! | `s3://bucket/prefix` | [`ObjectBlobStore`] over Amazon S3 |
//! | `gs://bucket/prefix` | [`ObjectBlobStore`] over Google Cloud Storage |
//!
//! [`MemoryBlobStore`] serves tests and embedding. Opened stores are shared
//! read-only across jobs.

mod file;
mod memory;
mod object;

pub use file::FileBlobStore;
pub use memory::{MemoryBlobStore, MemoryBucketOpener};
pub use object::ObjectBlobStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::info;
use url::Url;

/// Errors from blob store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The locator scheme has no backend.
    #[error("Unsupported store scheme: {0}")]
    UnsupportedScheme(String),

    /// The locator could not be interpreted.
    #[error("Invalid store locator: {0}")]
    InvalidLocator(String),

    /// The key is empty or escapes the bucket.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No object exists under the key.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cloud object store request failed.
    #[error("Object store error: {0}")]
    Object(#[from] object_store::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Streaming reader over one object.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// A bucket of objects addressed by `/`-separated keys.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Locator this store was opened from.
    fn locator(&self) -> &str;

    /// Open an object for streaming reads.
    async fn reader(&self, key: &str) -> Result<BlobReader>;

    /// Write an object. Either the whole object is replaced or nothing changes.
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read a whole object into memory.
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let mut reader = self.reader(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

/// Check that a key is relative and never leaves the bucket.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Opens stores from locators.
#[async_trait]
pub trait BucketOpener: Send + Sync {
    /// Open (or reuse) the store behind `locator`.
    async fn open(&self, locator: &str) -> Result<Arc<dyn BlobStore>>;
}

/// Opens stores by URL scheme and keeps them for the life of the process.
#[derive(Default)]
pub struct UrlBucketOpener {
    opened: Mutex<HashMap<String, Arc<dyn BlobStore>>>,
}

impl UrlBucketOpener {
    /// Create an opener with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BucketOpener for UrlBucketOpener {
    async fn open(&self, locator: &str) -> Result<Arc<dyn BlobStore>> {
        let mut opened = self.opened.lock().await;
        if let Some(store) = opened.get(locator) {
            return Ok(store.clone());
        }

        let url = Url::parse(locator)
            .map_err(|e| StoreError::InvalidLocator(format!("{locator}: {e}")))?;
        let store: Arc<dyn BlobStore> = match url.scheme() {
            "file" => Arc::new(FileBlobStore::open(locator, &url).await?),
            "s3" | "gs" => Arc::new(ObjectBlobStore::open(locator, &url)?),
            other => return Err(StoreError::UnsupportedScheme(other.to_string())),
        };

        info!(locator = %locator, "Opened bucket");
        opened.insert(locator.to_string(), store.clone());
        Ok(store)
    }
}
