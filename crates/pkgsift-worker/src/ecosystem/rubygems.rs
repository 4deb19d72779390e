// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RubyGems provider.

use async_trait::async_trait;
use serde::Deserialize;

use super::registry::{fetch_json, non_empty};
use super::{AnalysisCommand, Ecosystem, EcosystemError, Package, Phase, analysis_command};

const REGISTRY_URL: &str = "https://rubygems.org/api/v1/versions";

#[derive(Debug, Deserialize)]
struct LatestVersion {
    version: Option<String>,
}

/// rubygems.org.
#[derive(Debug, Clone)]
pub struct RubyGems {
    client: reqwest::Client,
}

impl RubyGems {
    /// Create a provider querying rubygems.org.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Ecosystem for RubyGems {
    fn name(&self) -> &str {
        "rubygems"
    }

    fn image(&self) -> &str {
        "gcr.io/ossf-malware-analysis/ruby"
    }

    fn phases(&self) -> Vec<Phase> {
        vec![Phase::new("install"), Phase::new("import")]
    }

    async fn latest_version(&self, name: &str) -> Result<String, EcosystemError> {
        let url = format!("{REGISTRY_URL}/{name}/latest.json");
        let latest: LatestVersion = fetch_json(&self.client, &url, name).await?;
        // rubygems answers unknown gems with {"version":"unknown"}
        match latest.version.as_deref() {
            Some("unknown") => Err(EcosystemError::NotFound(name.to_string())),
            _ => non_empty(latest.version, name),
        }
    }

    fn command(&self, package: &Package, phase: &Phase) -> AnalysisCommand {
        analysis_command("/usr/local/bin/analyze.rb", package, phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latest() {
        let latest: LatestVersion = serde_json::from_str(r#"{"version":"7.1.2"}"#).unwrap();
        assert_eq!(latest.version.as_deref(), Some("7.1.2"));
    }
}
