// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! crates.io provider.
//!
//! Crates have no import step, so analysis stops after install.

use async_trait::async_trait;
use serde::Deserialize;

use super::registry::{fetch_json, non_empty};
use super::{AnalysisCommand, Ecosystem, EcosystemError, Package, Phase, analysis_command};

const REGISTRY_URL: &str = "https://crates.io/api/v1/crates";

#[derive(Debug, Deserialize)]
struct CrateDocument {
    #[serde(rename = "crate")]
    krate: CrateInfo,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    max_stable_version: Option<String>,
    max_version: Option<String>,
}

/// crates.io.
#[derive(Debug, Clone)]
pub struct CratesIo {
    client: reqwest::Client,
}

impl CratesIo {
    /// Create a provider querying crates.io.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Ecosystem for CratesIo {
    fn name(&self) -> &str {
        "crates.io"
    }

    fn image(&self) -> &str {
        "gcr.io/ossf-malware-analysis/crates.io"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::new("install")]
    }

    async fn latest_version(&self, name: &str) -> Result<String, EcosystemError> {
        let url = format!("{REGISTRY_URL}/{name}");
        let doc: CrateDocument = fetch_json(&self.client, &url, name).await?;
        non_empty(doc.krate.max_stable_version.or(doc.krate.max_version), name)
    }

    fn command(&self, package: &Package, phase: &Phase) -> AnalysisCommand {
        analysis_command("/usr/local/bin/analyze.sh", package, phase)
    }
}
