// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sandbox trait definitions.
//!
//! Defines the abstract interface for isolated execution environments.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::analysis::PhaseResult;
use crate::ecosystem::{AnalysisCommand, Phase};

/// Errors from sandbox operations.
///
/// These are infrastructure failures: the sandbox could not produce a
/// [`PhaseResult`] at all. A command that ran and failed is not an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SandboxError {
    /// The command line was empty.
    #[error("Empty command for phase {0}")]
    EmptyCommand(String),

    /// The container runtime could not be launched.
    #[error("Failed to spawn sandbox: {0}")]
    Spawn(#[source] std::io::Error),

    /// The container runtime started but could not create the container.
    #[error("Container start failed: {0}")]
    StartFailed(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// A host file made visible inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    /// Path on the host
    pub host_path: PathBuf,
    /// Path inside the sandbox
    pub sandbox_path: String,
}

/// Everything needed to create a sandbox.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    /// Image name without tag
    pub image: String,
    /// Image tag
    pub tag: String,
    /// Read-only volume mappings
    pub volumes: Vec<VolumeMapping>,
    /// Wall-clock limit per phase; exceeding it yields `ErrorTimeout`
    pub timeout: Duration,
}

impl SandboxSpec {
    /// Full image reference, `image:tag`.
    pub fn image_ref(&self) -> String {
        if self.tag.is_empty() {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.tag)
        }
    }
}

/// A live execution environment owned by a single job.
///
/// Callers must invoke [`Sandbox::clean`] once they are done, whatever the
/// outcome of the phases.
#[async_trait]
pub trait Sandbox: Send {
    /// Run one phase's command and wait for its result.
    async fn run(&mut self, phase: &Phase, command: &AnalysisCommand) -> Result<PhaseResult>;

    /// Tear down everything this sandbox created. Never fails; problems are logged.
    async fn clean(&mut self);
}

/// Creates sandboxes.
pub trait SandboxFactory: Send + Sync {
    /// Backend identifier (e.g., "podman", "mock")
    fn sandbox_type(&self) -> &'static str;

    /// Create a sandbox for one job.
    fn create(&self, spec: SandboxSpec) -> Box<dyn Sandbox>;
}
