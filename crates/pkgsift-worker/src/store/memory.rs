// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory buckets for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use super::{BlobReader, BlobStore, BucketOpener, Result, StoreError, validate_key};

/// Bucket held in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    locator: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryBlobStore {
    /// Create an empty bucket.
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            ..Self::default()
        }
    }

    /// Create a bucket whose writes always fail.
    pub fn failing(locator: impl Into<String>) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(locator)
        }
    }

    /// Insert an object directly.
    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), data.into());
    }

    /// Copy of an object, if present.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn reader(&self, key: &str) -> Result<BlobReader> {
        validate_key(key)?;
        let data = self
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key)?;
        if self.fail_writes {
            return Err(StoreError::Io(std::io::Error::other("write rejected")));
        }
        self.insert(key, data);
        Ok(())
    }
}

/// Opener that hands out in-memory buckets, creating them on first use.
#[derive(Debug, Default)]
pub struct MemoryBucketOpener {
    buckets: Mutex<HashMap<String, Arc<MemoryBlobStore>>>,
}

impl MemoryBucketOpener {
    /// Create an opener with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prepared bucket under its locator.
    pub fn with_bucket(self, store: MemoryBlobStore) -> Self {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(store.locator().to_string(), Arc::new(store));
        self
    }

    /// The bucket behind `locator`, if it was ever opened or registered.
    pub fn bucket(&self, locator: &str) -> Option<Arc<MemoryBlobStore>> {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(locator)
            .cloned()
    }
}

#[async_trait]
impl BucketOpener for MemoryBucketOpener {
    async fn open(&self, locator: &str) -> Result<Arc<dyn BlobStore>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let store = buckets
            .entry(locator.to_string())
            .or_insert_with(|| Arc::new(MemoryBlobStore::new(locator)))
            .clone();
        Ok(store as Arc<dyn BlobStore>)
    }
}
