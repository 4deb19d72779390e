// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for pkgsift-worker.

use std::time::Duration;

/// Default per-phase timeout inside the sandbox (15 minutes).
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(900);

/// Log output format selected by `LOGGER_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines (development).
    Pretty,
    /// JSON lines (production log pipelines).
    Json,
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Subscription locator (e.g. `rabbit://analysis-jobs`)
    pub subscription: String,
    /// Packages store locator, needed only for jobs carrying `package_path`
    pub packages_bucket: Option<String>,
    /// Default results store locator; no upload happens when unset and not overridden
    pub results_bucket: Option<String>,
    /// Tag applied to every sandbox image
    pub image_tag: String,
    /// Wall-clock limit for a single analysis phase
    pub phase_timeout: Duration,
    /// AMQP server for `rabbit://` subscriptions
    pub rabbit_server_url: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let subscription = get("OSSMALWARE_WORKER_SUBSCRIPTION")
            .ok_or(ConfigError::MissingEnvVar("OSSMALWARE_WORKER_SUBSCRIPTION"))?;

        let packages_bucket = get("OSSF_MALWARE_ANALYSIS_PACKAGES");
        let results_bucket = get("OSSF_MALWARE_ANALYSIS_RESULTS");

        let image_tag = get("OSSF_SANDBOX_IMAGE_TAG").unwrap_or_else(|| "latest".to_string());

        let phase_timeout = match get("SANDBOX_PHASE_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidTimeout(raw))?,
            None => DEFAULT_PHASE_TIMEOUT,
        };

        let rabbit_server_url = get("RABBIT_SERVER_URL");

        let log_format = match get("LOGGER_ENV").as_deref() {
            Some("prod") | Some("production") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            subscription,
            packages_bucket,
            results_bucket,
            image_tag,
            phase_timeout,
            rabbit_server_url,
            log_format,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The phase timeout is not a positive number of seconds.
    #[error("Invalid phase timeout: {0}")]
    InvalidTimeout(String),
}
