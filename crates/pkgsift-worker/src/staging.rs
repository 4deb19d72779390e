// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Staging of uploaded package artifacts.
//!
//! A job may reference an artifact in the packages store instead of a
//! registry release. The artifact is copied to a host temp file which is
//! mounted read-only into the sandbox under `/local/<basename>`. The temp
//! file belongs to the [`StagedPackage`] and is deleted when it is dropped,
//! whichever way the job ends.

use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;
use crate::sandbox::VolumeMapping;
use crate::store::BlobStore;

/// Directory inside the sandbox where staged artifacts are mounted.
pub const LOCAL_PACKAGE_DIR: &str = "/local";

/// A package artifact copied to the host and ready to mount.
#[derive(Debug)]
pub struct StagedPackage {
    file: NamedTempFile,
    sandbox_path: String,
}

impl StagedPackage {
    /// Location of the temp file on the host.
    pub fn host_path(&self) -> &Path {
        self.file.path()
    }

    /// Location of the artifact inside the sandbox.
    pub fn sandbox_path(&self) -> &str {
        &self.sandbox_path
    }

    /// Volume mapping exposing the artifact to the sandbox.
    pub fn volume(&self) -> VolumeMapping {
        VolumeMapping {
            host_path: self.host_path().to_path_buf(),
            sandbox_path: self.sandbox_path.clone(),
        }
    }
}

/// Sandbox path for an artifact stored under `package_path`.
pub fn sandbox_path_for(package_path: &str) -> String {
    let base = Path::new(package_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "package".to_string());
    format!("{LOCAL_PACKAGE_DIR}/{base}")
}

/// Copy `package_path` from `store` into a fresh temp file.
pub async fn stage(store: &dyn BlobStore, package_path: &str) -> Result<StagedPackage> {
    let mut reader = store.reader(package_path).await?;

    let file = tempfile::Builder::new().prefix("pkgsift-").tempfile()?;
    let mut out = tokio::fs::File::from_std(file.reopen()?);
    let bytes = tokio::io::copy(&mut reader, &mut out).await?;
    out.flush().await?;
    drop(out);

    let staged = StagedPackage {
        file,
        sandbox_path: sandbox_path_for(package_path),
    };

    debug!(
        package_path = %package_path,
        host_path = %staged.host_path().display(),
        sandbox_path = %staged.sandbox_path,
        bytes = bytes,
        "Package staged"
    );

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{MemoryBlobStore, StoreError};

    #[test]
    fn test_sandbox_path() {
        assert_eq!(sandbox_path_for("uploads/left-pad-1.0.0.tgz"), "/local/left-pad-1.0.0.tgz");
        assert_eq!(sandbox_path_for("evil.whl"), "/local/evil.whl");
        assert_eq!(sandbox_path_for(""), "/local/package");
    }

    #[tokio::test]
    async fn test_stage_copies_and_cleans_up() {
        let store = MemoryBlobStore::new("mem://packages");
        store.insert("uploads/pkg.tgz", b"tarball bytes".to_vec());

        let staged = stage(&store, "uploads/pkg.tgz").await.unwrap();
        let host_path = staged.host_path().to_path_buf();

        assert_eq!(std::fs::read(&host_path).unwrap(), b"tarball bytes");
        assert_eq!(staged.sandbox_path(), "/local/pkg.tgz");
        assert_eq!(staged.volume().host_path, host_path);

        drop(staged);
        assert!(!host_path.exists());
    }

    #[tokio::test]
    async fn test_stage_missing_artifact() {
        let store = MemoryBlobStore::new("mem://packages");
        let err = stage(&store, "uploads/missing.tgz").await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound(_))));
    }
}
