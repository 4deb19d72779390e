// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Analysis jobs derived from inbound queue messages.
//!
//! Every message carries string metadata. `name` and `ecosystem` are required;
//! a message lacking either is dropped rather than treated as an error so that
//! malformed producer input cannot poison the retry loop.

use std::collections::HashMap;
use std::fmt;

/// Metadata key for the package name.
pub const NAME_KEY: &str = "name";
/// Metadata key for the ecosystem name.
pub const ECOSYSTEM_KEY: &str = "ecosystem";
/// Metadata key for an explicit package version.
pub const VERSION_KEY: &str = "version";
/// Metadata key for a package artifact path relative to the packages store.
pub const PACKAGE_PATH_KEY: &str = "package_path";
/// Metadata key for a per-job results store override.
pub const RESULTS_BUCKET_OVERRIDE_KEY: &str = "results_bucket_override";

/// Why a message was rejected without processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// `name` is missing or empty.
    EmptyName,
    /// `ecosystem` is missing or empty.
    EmptyEcosystem {
        /// Package name from the message
        name: String,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptyName => f.write_str("name is empty"),
            Rejection::EmptyEcosystem { .. } => f.write_str("ecosystem is empty"),
        }
    }
}

/// One unit of work: a package to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Package name (non-empty)
    pub name: String,
    /// Ecosystem name (non-empty)
    pub ecosystem: String,
    /// Explicit version, if requested
    pub version: Option<String>,
    /// Artifact path inside the packages store
    pub package_path: Option<String>,
    /// Results store locator replacing the default for this job only
    pub results_bucket_override: Option<String>,
}

impl Job {
    /// Build a job from message metadata.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self, Rejection> {
        let get = |key: &str| {
            metadata
                .get(key)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let name = get(NAME_KEY).ok_or(Rejection::EmptyName)?;
        let ecosystem = get(ECOSYSTEM_KEY).ok_or_else(|| Rejection::EmptyEcosystem {
            name: name.clone(),
        })?;

        Ok(Self {
            name,
            ecosystem,
            version: get(VERSION_KEY),
            package_path: get(PACKAGE_PATH_KEY),
            results_bucket_override: get(RESULTS_BUCKET_OVERRIDE_KEY),
        })
    }

    /// Results store locator for this job: the override if present, else the default.
    pub fn results_bucket<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        self.results_bucket_override.as_deref().or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_full_job() {
        let job = Job::from_metadata(&metadata(&[
            ("name", "left-pad"),
            ("ecosystem", "npm"),
            ("version", "1.0.0"),
            ("package_path", "uploads/left-pad-1.0.0.tgz"),
            ("results_bucket_override", "file:///tmp/other"),
        ]))
        .unwrap();

        assert_eq!(job.name, "left-pad");
        assert_eq!(job.ecosystem, "npm");
        assert_eq!(job.version.as_deref(), Some("1.0.0"));
        assert_eq!(job.package_path.as_deref(), Some("uploads/left-pad-1.0.0.tgz"));
        assert_eq!(job.results_bucket(Some("file:///tmp/default")), Some("file:///tmp/other"));
    }

    #[test]
    fn test_missing_name() {
        let err = Job::from_metadata(&metadata(&[("ecosystem", "npm")])).unwrap_err();
        assert_eq!(err, Rejection::EmptyName);
    }

    #[test]
    fn test_empty_name() {
        let err = Job::from_metadata(&metadata(&[("name", ""), ("ecosystem", "npm")])).unwrap_err();
        assert_eq!(err, Rejection::EmptyName);
    }

    #[test]
    fn test_missing_ecosystem() {
        let err = Job::from_metadata(&metadata(&[("name", "left-pad")])).unwrap_err();
        assert_eq!(
            err,
            Rejection::EmptyEcosystem {
                name: "left-pad".to_string()
            }
        );
        assert_eq!(err.to_string(), "ecosystem is empty");
    }

    #[test]
    fn test_empty_optionals_are_none() {
        let job = Job::from_metadata(&metadata(&[
            ("name", "requests"),
            ("ecosystem", "pypi"),
            ("version", ""),
            ("results_bucket_override", ""),
        ]))
        .unwrap();

        assert!(job.version.is_none());
        assert!(job.package_path.is_none());
        assert_eq!(job.results_bucket(Some("file:///r")), Some("file:///r"));
        assert_eq!(job.results_bucket(None), None);
    }
}
