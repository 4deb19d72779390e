// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for pkgsift-worker.

use thiserror::Error;

/// Worker errors.
///
/// Any of these returned from message handling leaves the message
/// unacknowledged so the queue redelivers it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blob store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Subscription operation failed.
    #[error("Queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    /// Ecosystem lookup failed.
    #[error("Ecosystem error: {0}")]
    Ecosystem(#[from] crate::ecosystem::EcosystemError),

    /// Sandbox could not run a phase.
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] crate::sandbox::SandboxError),

    /// A job references a package artifact but no packages store is configured.
    #[error("packages bucket not set")]
    PackagesStoreNotConfigured,

    /// Uploading results failed.
    #[error("failed to upload to blobstore: {0}")]
    Upload(#[source] crate::store::StoreError),

    /// The subscription loop kept failing.
    #[error("retries exceeded after {attempts} consecutive failures: {source}")]
    RetriesExceeded {
        /// Consecutive failures observed
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the worker Error.
pub type Result<T> = std::result::Result<T, Error>;
