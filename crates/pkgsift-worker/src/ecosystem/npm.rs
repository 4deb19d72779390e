// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! npm provider.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::registry::{fetch_json, non_empty};
use super::{AnalysisCommand, Ecosystem, EcosystemError, Package, Phase, analysis_command};

const REGISTRY_URL: &str = "https://registry.npmjs.org";

#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
}

/// Registry document URL; scoped names are one escaped path segment.
fn package_url(name: &str) -> String {
    format!("{REGISTRY_URL}/{}", urlencoding::encode(name))
}

/// The npm registry.
#[derive(Debug, Clone)]
pub struct Npm {
    client: reqwest::Client,
}

impl Npm {
    /// Create a provider querying the public npm registry.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Ecosystem for Npm {
    fn name(&self) -> &str {
        "npm"
    }

    fn image(&self) -> &str {
        "gcr.io/ossf-malware-analysis/node"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::new("install"), Phase::new("import")]
    }

    async fn latest_version(&self, name: &str) -> Result<String, EcosystemError> {
        let url = package_url(name);
        let mut doc: PackageDocument = fetch_json(&self.client, &url, name).await?;
        non_empty(doc.dist_tags.remove("latest"), name)
    }

    fn command(&self, package: &Package, phase: &Phase) -> AnalysisCommand {
        analysis_command("/usr/local/bin/analyze.js", package, phase)
    }
}
