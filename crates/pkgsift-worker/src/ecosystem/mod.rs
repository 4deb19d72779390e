// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ecosystem providers.
//!
//! An ecosystem knows how to resolve the latest version of a package, which
//! analysis phases to run, and which command runs each phase inside the
//! ecosystem's sandbox image. Providers are looked up by name through
//! [`EcosystemRegistry`].

mod crates_io;
mod npm;
mod pypi;
mod registry;
mod rubygems;

pub use crates_io::CratesIo;
pub use npm::Npm;
pub use pypi::PyPi;
pub use rubygems::RubyGems;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from ecosystem providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EcosystemError {
    /// The registry request failed.
    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry does not know the package.
    #[error("Package not found in registry: {0}")]
    NotFound(String),

    /// The registry answered with something unexpected.
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),
}

/// A named analysis step, e.g. `install` or `import`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phase(String);

impl Phase {
    /// Create a phase from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Phase name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved, executable package reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Ecosystem name
    pub ecosystem: String,
    /// Package name
    pub name: String,
    /// Version; empty for a local artifact submitted without one
    pub version: String,
    /// Path of the staged artifact inside the sandbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// Command line executed inside the sandbox for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisCommand {
    /// Program followed by its arguments
    pub args: Vec<String>,
}

/// Capability set of one package ecosystem.
#[async_trait]
pub trait Ecosystem: Send + Sync {
    /// Ecosystem name as it appears in job metadata.
    fn name(&self) -> &str;

    /// Sandbox image (without tag) the phases run in.
    fn image(&self) -> &str;

    /// Ordered analysis phases.
    fn phases(&self) -> Vec<Phase>;

    /// Look up the latest published version of a package.
    async fn latest_version(&self, name: &str) -> Result<String, EcosystemError>;

    /// Build the command that runs `phase` for `package`.
    fn command(&self, package: &Package, phase: &Phase) -> AnalysisCommand;

    /// Package reference for an explicit version.
    fn package(&self, name: &str, version: &str) -> Package {
        Package {
            ecosystem: self.name().to_string(),
            name: name.to_string(),
            version: version.to_string(),
            local_path: None,
        }
    }

    /// Package reference for an artifact staged at `local_path` in the sandbox.
    fn local(&self, name: &str, version: &str, local_path: &str) -> Package {
        Package {
            local_path: Some(local_path.to_string()),
            ..self.package(name, version)
        }
    }

    /// Package reference for the latest published version.
    async fn latest(&self, name: &str) -> Result<Package, EcosystemError> {
        let version = self.latest_version(name).await?;
        Ok(self.package(name, &version))
    }
}

/// Standard argument layout of the analysis entrypoints shipped in the sandbox images.
///
/// `<entrypoint> --phase <phase> [--local <path>] [--version <version>] <name>`
pub fn analysis_command(entrypoint: &str, package: &Package, phase: &Phase) -> AnalysisCommand {
    let mut args = vec![
        entrypoint.to_string(),
        "--phase".to_string(),
        phase.to_string(),
    ];
    if let Some(path) = &package.local_path {
        args.push("--local".to_string());
        args.push(path.clone());
    }
    if !package.version.is_empty() {
        args.push("--version".to_string());
        args.push(package.version.clone());
    }
    args.push(package.name.clone());
    AnalysisCommand { args }
}

/// Lookup table of supported ecosystems keyed by name.
#[derive(Clone, Default)]
pub struct EcosystemRegistry {
    providers: HashMap<String, Arc<dyn Ecosystem>>,
}

impl EcosystemRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in ecosystem.
    ///
    /// Fails if the shared HTTP client cannot be built (for example when no
    /// TLS backend is available).
    pub fn with_defaults() -> Result<Self, EcosystemError> {
        let client = registry::http_client()?;
        Ok(Self::new()
            .register(Arc::new(Npm::new(client.clone())))
            .register(Arc::new(PyPi::new(client.clone())))
            .register(Arc::new(RubyGems::new(client.clone())))
            .register(Arc::new(CratesIo::new(client))))
    }

    /// Add (or replace) a provider under its own name.
    pub fn register(mut self, provider: Arc<dyn Ecosystem>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Find the provider for an ecosystem; `None` means unsupported.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Ecosystem>> {
        self.providers.get(name).cloned()
    }

    /// Names of all registered ecosystems, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for EcosystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcosystemRegistry")
            .field("ecosystems", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = EcosystemRegistry::with_defaults().unwrap();
        assert_eq!(registry.names(), vec!["crates.io", "npm", "pypi", "rubygems"]);
        assert!(registry.get("npm").is_some());
        assert!(registry.get("maven").is_none());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn test_command_for_version() {
        let package = Package {
            ecosystem: "npm".to_string(),
            name: "left-pad".to_string(),
            version: "1.0.0".to_string(),
            local_path: None,
        };
        let cmd = analysis_command("analyze.js", &package, &Phase::new("install"));
        assert_eq!(
            cmd.args,
            vec!["analyze.js", "--phase", "install", "--version", "1.0.0", "left-pad"]
        );
    }

    #[test]
    fn test_command_for_local_without_version() {
        let package = Package {
            ecosystem: "pypi".to_string(),
            name: "evil".to_string(),
            version: String::new(),
            local_path: Some("/local/evil-0.1.tar.gz".to_string()),
        };
        let cmd = analysis_command("analyze.py", &package, &Phase::new("import"));
        assert_eq!(
            cmd.args,
            vec!["analyze.py", "--phase", "import", "--local", "/local/evil-0.1.tar.gz", "evil"]
        );
    }

    #[test]
    fn test_local_package() {
        let npm = Npm::new(reqwest::Client::new());
        let package = npm.local("left-pad", "", "/local/left-pad.tgz");
        assert_eq!(package.ecosystem, "npm");
        assert_eq!(package.local_path.as_deref(), Some("/local/left-pad.tgz"));
        assert!(package.version.is_empty());
    }
}
