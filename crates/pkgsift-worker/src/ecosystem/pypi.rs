// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PyPI provider.

use async_trait::async_trait;
use serde::Deserialize;

use super::registry::{fetch_json, non_empty};
use super::{AnalysisCommand, Ecosystem, EcosystemError, Package, Phase, analysis_command};

const REGISTRY_URL: &str = "https://pypi.org/pypi";

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    info: ProjectInfo,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    version: Option<String>,
}

/// The Python Package Index.
#[derive(Debug, Clone)]
pub struct PyPi {
    client: reqwest::Client,
}

impl PyPi {
    /// Create a provider querying pypi.org.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Ecosystem for PyPi {
    fn name(&self) -> &str {
        "pypi"
    }

    fn image(&self) -> &str {
        "gcr.io/ossf-malware-analysis/python"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::new("install"), Phase::new("import")]
    }

    async fn latest_version(&self, name: &str) -> Result<String, EcosystemError> {
        let url = format!("{REGISTRY_URL}/{name}/json");
        let doc: ProjectDocument = fetch_json(&self.client, &url, name).await?;
        non_empty(doc.info.version, name)
    }

    fn command(&self, package: &Package, phase: &Phase) -> AnalysisCommand {
        analysis_command("/usr/local/bin/analyze.py", package, phase)
    }
}
