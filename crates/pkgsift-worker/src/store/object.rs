// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud object-store buckets (`s3://bucket/prefix`, `gs://bucket/prefix`).
//!
//! Credentials and region come from the environment the way the cloud SDKs
//! read them (`AWS_*` for S3, `GOOGLE_*` for GCS). An object is written with a
//! single PUT, so a failed upload never leaves a partial object behind.

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use super::{BlobReader, BlobStore, Result, StoreError, validate_key};

/// Bucket backed by an [`ObjectStore`], with every key placed under a prefix.
#[derive(Debug, Clone)]
pub struct ObjectBlobStore {
    locator: String,
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectBlobStore {
    /// Wrap an existing object store. Keys are stored under `prefix`.
    pub fn new(locator: &str, store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            locator: locator.to_string(),
            store,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Open an `s3://` or `gs://` locator.
    pub fn open(locator: &str, url: &Url) -> Result<Self> {
        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| StoreError::InvalidLocator(format!("{locator}: missing bucket")))?;

        let store: Arc<dyn ObjectStore> = match url.scheme() {
            "s3" => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?,
            ),
            "gs" => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()?,
            ),
            other => return Err(StoreError::UnsupportedScheme(other.to_string())),
        };

        Ok(Self::new(locator, store, url.path()))
    }

    fn object_path(&self, key: &str) -> Result<Path> {
        validate_key(key)?;
        let full = if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        };
        Path::parse(&full).map_err(|_| StoreError::InvalidKey(key.to_string()))
    }
}

fn not_found_as(key: &str) -> impl FnOnce(object_store::Error) -> StoreError + '_ {
    move |e| match e {
        object_store::Error::NotFound { .. } => StoreError::NotFound(key.to_string()),
        other => StoreError::Object(other),
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn reader(&self, key: &str) -> Result<BlobReader> {
        let path = self.object_path(key)?;
        let object = self.store.get(&path).await.map_err(not_found_as(key))?;
        let stream = object.into_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        self.store.put(&path, PutPayload::from(data.to_vec())).await?;
        debug!(locator = %self.locator, path = %path, bytes = data.len(), "Object written");
        Ok(())
    }
}
