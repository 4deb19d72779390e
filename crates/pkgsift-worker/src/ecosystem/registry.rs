// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared HTTP plumbing for registry lookups.

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::EcosystemError;

const USER_AGENT: &str = concat!("pkgsift-worker/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client shared by all built-in providers.
pub(super) fn http_client() -> Result<reqwest::Client, EcosystemError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// GET `url` and decode the JSON body.
///
/// A 404 maps to [`EcosystemError::NotFound`] for `name`.
pub(super) async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    name: &str,
) -> Result<T, EcosystemError> {
    debug!(url = %url, "Querying registry");

    let response = client.get(url).send().await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(EcosystemError::NotFound(name.to_string()));
    }

    Ok(response.error_for_status()?.json::<T>().await?)
}

/// Reject empty version strings coming back from a registry.
pub(super) fn non_empty(version: Option<String>, name: &str) -> Result<String, EcosystemError> {
    version
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EcosystemError::InvalidResponse(format!("no latest version for {name}")))
}
