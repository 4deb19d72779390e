// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persisted analysis results.
//!
//! One object per package identity at `<ecosystem>/<name>/<version>/results.json`.
//! Segments are percent-escaped so that every identity maps to a distinct
//! path that stays inside the bucket (npm scopes, dots, and slashes included).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::analysis::ResultSet;
use crate::ecosystem::Package;
use crate::error::{Error, Result};
use crate::store::BlobStore;

/// File name of the results object.
pub const RESULTS_FILE: &str = "results.json";

/// Version segment used for local artifacts submitted without a version.
/// `@` is always escaped in real versions, so this cannot collide.
pub const UNVERSIONED: &str = "@unversioned";

/// Stored document for one analyzed package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Package that was analyzed
    pub package: Package,
    /// When the record was written
    pub created_at: DateTime<Utc>,
    /// Phase results in execution order
    pub analysis: ResultSet,
}

fn escape_segment(segment: &str) -> String {
    // Dot segments are unreserved but would still walk the key tree.
    if segment == "." || segment == ".." {
        return segment.replace('.', "%2E");
    }
    urlencoding::encode(segment).into_owned()
}

/// Deterministic object key for a package's results.
pub fn result_path(package: &Package) -> String {
    let version = if package.version.is_empty() {
        UNVERSIONED.to_string()
    } else {
        escape_segment(&package.version)
    };
    format!(
        "{}/{}/{}/{}",
        escape_segment(&package.ecosystem),
        escape_segment(&package.name),
        version,
        RESULTS_FILE
    )
}

/// Reads and writes analysis records in a bucket.
#[derive(Clone)]
pub struct ResultStore {
    bucket: Arc<dyn BlobStore>,
}

impl ResultStore {
    /// Create a result store over `bucket`.
    pub fn new(bucket: Arc<dyn BlobStore>) -> Self {
        Self { bucket }
    }

    /// Serialize and upload the results for `package`. Returns the object key.
    pub async fn save(&self, package: &Package, results: &ResultSet) -> Result<String> {
        let key = result_path(package);
        let record = AnalysisRecord {
            package: package.clone(),
            created_at: Utc::now(),
            analysis: results.clone(),
        };
        let body = serde_json::to_vec_pretty(&record)?;

        self.bucket.write(&key, &body).await.map_err(Error::Upload)?;

        info!(
            bucket = %self.bucket.locator(),
            key = %key,
            phases = results.len(),
            "Results uploaded"
        );
        Ok(key)
    }

    /// Read back the stored record for `package`.
    pub async fn load(&self, package: &Package) -> Result<AnalysisRecord> {
        let body = self.bucket.read(&result_path(package)).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
